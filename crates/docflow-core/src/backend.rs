//! Backend contract
//!
//! Everything the client knows about the REST API goes through
//! [`WorkflowBackend`]. The HTTP implementation lives in `docflow-client`;
//! tests swap in scripted or mocked backends.

use crate::error::Result;
use crate::types::{
    ActionReceipt, ActionRequest, ApprovalHistoryEntry, DocumentId, DocumentSnapshot,
    ErpOperationResult, MoveToStatusRequest, StepDirection, Transition, WorkflowStatus,
};
use async_trait::async_trait;

/// REST operations consumed by the workflow client
///
/// Implementations are stateless from the client's perspective: the server is
/// the only authority on workflow state.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    /// `GET /Workflow/document/{id}/workflow-status`
    async fn workflow_status(&self, document_id: DocumentId) -> Result<WorkflowStatus>;

    /// `GET /Workflow/document/{id}/available-transitions`
    async fn available_transitions(&self, document_id: DocumentId) -> Result<Vec<Transition>>;

    /// `GET /Approval/history/{id}`
    async fn approval_history(&self, document_id: DocumentId)
        -> Result<Vec<ApprovalHistoryEntry>>;

    /// `GET /Documents/{id}`
    async fn document(&self, document_id: DocumentId) -> Result<DocumentSnapshot>;

    /// `POST /Workflow/perform-action`
    async fn perform_action(&self, request: &ActionRequest) -> Result<ActionReceipt>;

    /// `POST /Workflow/move-to-status`
    async fn move_to_status(&self, request: &MoveToStatusRequest) -> Result<ActionReceipt>;

    /// `POST /Circuit/document/{id}/{advance|return}`
    async fn change_step(
        &self,
        document_id: DocumentId,
        direction: StepDirection,
        comments: Option<String>,
    ) -> Result<ActionReceipt>;

    /// `POST /Documents/{id}/archive-to-erp`
    async fn archive_to_erp(&self, document_id: DocumentId) -> Result<ErpOperationResult>;

    /// `POST /Lignes/document/{id}/create-in-erp`
    async fn create_erp_lines(&self, document_id: DocumentId) -> Result<ErpOperationResult>;
}
