//! docflow command line
//!
//! Inspect a document's workflow, drive transitions and watch ERP archival
//! from a terminal. Configuration comes from an optional TOML file, the
//! `DOCFLOW_*` environment and finally the command line flags.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use docflow_client::{PollOutcome, PollStart, WorkflowClient};
use docflow_core::{ActionId, ClientConfig, DocumentId, StatusId};
use serde::Serialize;
use std::path::PathBuf;

/// Default log filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "docflow=info";

fn document_arg() -> Arg {
    Arg::new("document")
        .required(true)
        .value_parser(value_parser!(i64))
        .help("Document identifier")
}

fn comment_arg() -> Arg {
    Arg::new("comment")
        .long("comment")
        .short('c')
        .help("Comment attached to the transition")
}

fn wait_arg() -> Arg {
    Arg::new("wait-erp")
        .long("wait-erp")
        .action(ArgAction::SetTrue)
        .help("Wait for ERP archival if the action triggers it")
}

/// Command line definition
#[must_use]
pub fn command() -> Command {
    Command::new("docflow")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect and drive document workflows")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("base-url")
                .long("base-url")
                .global(true)
                .help("API base URL (overrides config and DOCFLOW_API_BASE_URL)"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .global(true)
                .help("Bearer token (overrides config and DOCFLOW_API_TOKEN)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("status")
                .about("Show the workflow status of a document")
                .arg(document_arg()),
        )
        .subcommand(
            Command::new("transitions")
                .about("List statuses the document can be moved to")
                .arg(document_arg()),
        )
        .subcommand(
            Command::new("history")
                .about("Show the approval history of a document")
                .arg(document_arg()),
        )
        .subcommand(
            Command::new("document")
                .about("Show a document and its ERP archival code")
                .arg(document_arg()),
        )
        .subcommand(
            Command::new("act")
                .about("Perform an action of the current step")
                .arg(document_arg())
                .arg(
                    Arg::new("action")
                        .long("action")
                        .short('a')
                        .required(true)
                        .value_parser(value_parser!(i64))
                        .help("Action identifier"),
                )
                .arg(
                    Arg::new("reject")
                        .long("reject")
                        .action(ArgAction::SetTrue)
                        .help("Reject instead of approve"),
                )
                .arg(comment_arg())
                .arg(wait_arg()),
        )
        .subcommand(
            Command::new("move")
                .about("Move a document to a reachable status")
                .arg(document_arg())
                .arg(
                    Arg::new("status")
                        .long("status")
                        .short('s')
                        .required(true)
                        .value_parser(value_parser!(i64))
                        .help("Target status identifier"),
                )
                .arg(comment_arg())
                .arg(wait_arg()),
        )
        .subcommand(
            Command::new("advance")
                .about("Advance to the next circuit step")
                .arg(document_arg())
                .arg(comment_arg())
                .arg(wait_arg()),
        )
        .subcommand(
            Command::new("return")
                .about("Return to the previous circuit step")
                .arg(document_arg())
                .arg(comment_arg()),
        )
        .subcommand(
            Command::new("archive-erp")
                .about("Archive a document in the ERP")
                .arg(document_arg())
                .arg(wait_arg()),
        )
        .subcommand(
            Command::new("erp-lines")
                .about("Create the document's lines in the ERP")
                .arg(document_arg()),
        )
        .subcommand(
            Command::new("watch-erp")
                .about("Poll a document until its ERP archival code appears")
                .arg(document_arg()),
        )
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins over [`DEFAULT_FILTER`].
pub fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    // A subscriber may already be installed (tests)
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Resolve configuration: file, environment, then flags
///
/// # Errors
/// Unreadable file, invalid variables or an unusable result
pub fn resolve_config(matches: &ArgMatches) -> anyhow::Result<ClientConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ClientConfig::from_file(path)?,
        None => ClientConfig::default(),
    }
    .apply_env()?;

    if let Some(url) = matches.get_one::<String>("base-url") {
        config.base_url.clone_from(url);
    }
    if let Some(token) = matches.get_one::<String>("token") {
        config.token = Some(token.clone());
    }
    config.validate()?;
    Ok(config)
}

fn document_id(args: &ArgMatches) -> anyhow::Result<DocumentId> {
    args.get_one::<i64>("document")
        .copied()
        .map(DocumentId)
        .context("missing document identifier")
}

fn comment(args: &ArgMatches) -> Option<String> {
    args.get_one::<String>("comment").cloned()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Wait for a poll and describe how it ended
async fn finish_poll(poll: Option<PollStart>, wait: bool) -> anyhow::Result<()> {
    let Some(poll) = poll else {
        return Ok(());
    };
    let handle = poll.into_handle();
    if !wait {
        println!("ERP archival pending for document {}", handle.document_id());
        return Ok(());
    }
    report_poll(handle.wait().await)
}

fn report_poll(outcome: PollOutcome) -> anyhow::Result<()> {
    match outcome {
        PollOutcome::Archived(archived) => {
            println!(
                "Document {} archived in ERP as {} after {} attempt(s)",
                archived.document_id, archived.erp_document_code, archived.attempts
            );
            Ok(())
        }
        PollOutcome::Exhausted { attempts } => {
            bail!("no ERP archival code after {attempts} attempt(s)")
        }
        PollOutcome::FetchFailed { attempts, error } => {
            bail!("ERP polling stopped after {attempts} attempt(s): {error}")
        }
        PollOutcome::Cancelled { .. } => bail!("ERP polling cancelled"),
    }
}

/// Execute the parsed command line
///
/// # Errors
/// Configuration problems or any failed backend call
pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = resolve_config(matches)?;
    let client = WorkflowClient::from_config(&config)?;

    let Some((name, args)) = matches.subcommand() else {
        bail!("no command given");
    };
    let id = document_id(args)?;
    let doc = client.open(id);
    tracing::debug!(command = name, document_id = %id, "running command");

    match name {
        "status" => print_json(&doc.load().await?),
        "transitions" => print_json(&doc.transitions().await?),
        "history" => print_json(&doc.history().await?),
        "document" => print_json(&doc.document().await?),
        "act" => {
            let action = args
                .get_one::<i64>("action")
                .copied()
                .context("missing action identifier")?;
            let outcome = doc
                .perform_action(ActionId(action), !args.get_flag("reject"), comment(args))
                .await?;
            print_json(&outcome.receipt)?;
            finish_poll(outcome.erp_poll, args.get_flag("wait-erp")).await
        }
        "move" => {
            let status = args
                .get_one::<i64>("status")
                .copied()
                .context("missing status identifier")?;
            let outcome = doc.move_to_status(StatusId(status), comment(args)).await?;
            print_json(&outcome.receipt)?;
            finish_poll(outcome.erp_poll, args.get_flag("wait-erp")).await
        }
        "advance" => {
            let outcome = doc.advance(comment(args)).await?;
            print_json(&outcome.receipt)?;
            finish_poll(outcome.erp_poll, args.get_flag("wait-erp")).await
        }
        "return" => {
            let outcome = doc.return_step(comment(args)).await?;
            print_json(&outcome.receipt)
        }
        "archive-erp" => {
            let outcome = doc.archive_to_erp().await?;
            print_json(&outcome.result)?;
            finish_poll(outcome.erp_poll, args.get_flag("wait-erp")).await
        }
        "erp-lines" => print_json(&doc.create_erp_lines().await?),
        "watch-erp" => {
            let document = doc.document().await?;
            if let Some(code) = document.erp_code() {
                println!("Document {id} already archived in ERP as {code}");
                return Ok(());
            }
            let handle = client.poller().start(id, None).into_handle();
            report_poll(handle.wait().await)
        }
        other => bail!("unknown command '{other}'"),
    }
}
