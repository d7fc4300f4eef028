use docflow_cli::{command, init_tracing, run};

#[tokio::main]
async fn main() {
    let matches = command().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    if let Err(err) = run(&matches).await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
