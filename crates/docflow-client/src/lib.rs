//! docflow client - document workflow orchestration over the REST backend
//!
//! The server owns the workflow state machine; this crate only reads it,
//! asks for transitions and keeps views consistent:
//! - [`WorkflowStatusReader`]: cache-first reads of status, transitions,
//!   history and documents
//! - [`WorkflowActionDispatcher`]: actions, status moves, step changes and
//!   ERP requests, with cache invalidation on success
//! - [`ErpArchivalPoller`]: fixed-interval detection of ERP archival, one
//!   poll per document
//! - [`ViewScope`]: cancellation of a view's in-flight requests
//! - [`WorkflowClient`] / [`DocumentWorkflow`]: everything wired together
//!
//! # Example
//!
//! ```rust,no_run
//! use docflow_client::WorkflowClient;
//! use docflow_core::{ClientConfig, DocumentId, StatusId};
//!
//! # async fn run() -> docflow_core::Result<()> {
//! let config = ClientConfig::load(None)?;
//! let client = WorkflowClient::from_config(&config)?;
//!
//! let doc = client.open(DocumentId(42));
//! let status = doc.load().await?;
//! println!("{:?}", status.current_status_title);
//!
//! let outcome = doc.move_to_status(StatusId(3), None).await?;
//! if let Some(poll) = outcome.erp_poll {
//!     poll.handle().wait().await;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod dispatcher;
pub mod http;
pub mod poller;
pub mod reader;
pub mod scope;
pub mod session;

pub use dispatcher::WorkflowActionDispatcher;
pub use http::HttpBackend;
pub use poller::{
    CompletionCallback, ErpArchivalPoller, ErpArchived, PollHandle, PollOutcome, PollStart,
};
pub use reader::WorkflowStatusReader;
pub use scope::{ScopeGuard, ViewScope};
pub use session::{
    ArchiveOutcome, ArchivedCallback, DispatchOutcome, DocumentWorkflow, WorkflowClient,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving document workflows
    pub use crate::{
        DispatchOutcome, DocumentWorkflow, ErpArchivalPoller, PollOutcome, WorkflowClient,
    };
    pub use docflow_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
