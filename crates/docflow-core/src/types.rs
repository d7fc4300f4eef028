//! Workflow types as transmitted by the backend
//!
//! Everything here is read-only from the client's point of view: values are
//! decoded from JSON, displayed, and replaced wholesale on the next fetch.
//! The backend speaks camelCase JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// Raw backend identifier
            #[inline]
            #[must_use]
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self)
            }
        }
    };
}

integer_id!(
    /// Document identifier
    DocumentId
);
integer_id!(
    /// Circuit (approval workflow template) identifier
    CircuitId
);
integer_id!(
    /// Circuit step identifier
    StepId
);
integer_id!(
    /// Workflow status identifier
    StatusId
);
integer_id!(
    /// Workflow action identifier
    ActionId
);
integer_id!(
    /// Approval request identifier
    ApprovalId
);

/// Current workflow position of a document
///
/// Replaced wholesale on every refetch; never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    pub document_id: DocumentId,
    #[serde(default)]
    pub circuit_id: Option<CircuitId>,
    #[serde(default)]
    pub current_step_id: Option<StepId>,
    #[serde(default)]
    pub current_status_id: Option<StatusId>,
    #[serde(default)]
    pub current_step_title: Option<String>,
    #[serde(default)]
    pub current_status_title: Option<String>,
    #[serde(default)]
    pub available_statuses: Vec<StatusInfo>,
    #[serde(default)]
    pub available_actions: Vec<Action>,
    #[serde(default)]
    pub can_advance: bool,
    #[serde(default)]
    pub can_return: bool,
    #[serde(default)]
    pub is_circuit_completed: bool,
}

impl WorkflowStatus {
    /// Look up a reachable status by id
    #[must_use]
    pub fn reachable_status(&self, status_id: StatusId) -> Option<&StatusInfo> {
        self.available_statuses
            .iter()
            .find(|s| s.status_id == status_id)
    }

    /// Look up an available action by id
    #[must_use]
    pub fn action(&self, action_id: ActionId) -> Option<&Action> {
        self.available_actions
            .iter()
            .find(|a| a.action_id == action_id)
    }
}

/// A named workflow state a document can occupy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusInfo {
    pub status_id: StatusId,
    pub title: String,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub is_final: bool,
}

/// An action the current step offers (approve, reject, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub action_id: ActionId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Entry of `available-transitions`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transition {
    pub status_id: StatusId,
    pub title: String,
    #[serde(default)]
    pub is_final: bool,
}

/// One approval request raised while the document moved through its circuit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalHistoryEntry {
    pub approval_id: ApprovalId,
    pub step_title: String,
    pub requester: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    #[serde(default)]
    pub responses: Vec<ApprovalResponse>,
}

/// A single approver's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub responder: String,
    pub is_approved: bool,
    #[serde(default)]
    pub comments: Option<String>,
    pub responded_at: DateTime<Utc>,
}

/// The slice of a document the poller cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    pub id: DocumentId,
    #[serde(default)]
    pub document_key: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub erp_document_code: Option<String>,
}

impl DocumentSnapshot {
    /// ERP archival code, if one is present and non-blank
    #[must_use]
    pub fn erp_code(&self) -> Option<&str> {
        self.erp_document_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Whether the ERP archival job has completed for this document
    #[inline]
    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.erp_code().is_some()
    }
}

/// Body of a successful workflow mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReceipt {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub is_circuit_completed: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ActionReceipt {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
            is_circuit_completed: false,
        }
    }
}

/// Result body of ERP operations (archive, line creation)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErpOperationResult {
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub erp_document_code: Option<String>,
}

impl Default for ErpOperationResult {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
            erp_document_code: None,
        }
    }
}

/// Request to perform an action on the document's current step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub document_id: DocumentId,
    pub action_id: ActionId,
    pub is_approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl ActionRequest {
    /// Create request without comment
    #[inline]
    #[must_use]
    pub fn new(document_id: DocumentId, action_id: ActionId, is_approved: bool) -> Self {
        Self {
            document_id,
            action_id,
            is_approved,
            comments: None,
        }
    }

    /// With comment
    #[inline]
    #[must_use]
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

/// Request to move a document directly to a reachable status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveToStatusRequest {
    pub document_id: DocumentId,
    pub target_status_id: StatusId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
}

impl MoveToStatusRequest {
    /// Create request without comment
    #[inline]
    #[must_use]
    pub fn new(document_id: DocumentId, target_status_id: StatusId) -> Self {
        Self {
            document_id,
            target_status_id,
            comments: None,
        }
    }

    /// With comment
    #[inline]
    #[must_use]
    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

/// Direction of a circuit step change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepDirection {
    /// Move to the next step
    Advance,
    /// Send back to the previous step
    Return,
}

impl StepDirection {
    /// Path segment used by the circuit endpoints
    #[inline]
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Return => "return",
        }
    }
}

impl std::fmt::Display for StepDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
