//! docflow core - shared building blocks for the workflow client
//!
//! Provides what every other docflow crate builds on:
//! - Backend data model (workflow status, actions, approval history)
//! - The `WorkflowBackend` contract for the REST API
//! - Error taxonomy with user-facing notifications
//! - Query cache abstraction and its moka implementation
//! - Client configuration
//! - Request lifecycle view model
//!
//! # Example
//!
//! ```rust
//! use docflow_core::{ApiError, ClientConfig};
//!
//! let config = ClientConfig::new().with_base_url("https://dms.example.com/api");
//! assert!(config.validate().is_ok());
//!
//! let toast = ApiError::from_response(409, None).to_notification();
//! assert_eq!(toast.title, "Conflicting change");
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod notification;
pub mod types;

pub use backend::WorkflowBackend;
pub use cache::{
    CacheCallback, CacheEvent, CacheKey, CacheStats, CachedValue, MokaQueryCache, QueryCache,
    SubscriptionId,
};
pub use config::{CacheConfig, ClientConfig, PollConfig};
pub use error::{ApiError, ErrorEnvelope, ErrorKind, Result};
pub use lifecycle::{RequestState, Ticket, WorkflowView};
pub use notification::{Notification, NotificationLevel, Notifier, TracingNotifier};
pub use types::{
    Action, ActionId, ActionReceipt, ActionRequest, ApprovalHistoryEntry, ApprovalId,
    ApprovalResponse, CircuitId, DocumentId, DocumentSnapshot, ErpOperationResult,
    MoveToStatusRequest, StatusId, StatusInfo, StepDirection, StepId, Transition, WorkflowStatus,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with docflow
    pub use crate::{
        ApiError, CacheKey, ClientConfig, DocumentId, Notification, Notifier, QueryCache,
        WorkflowStatus, WorkflowView,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
