//! mockall double of [`WorkflowBackend`] for expectation-style unit tests

use async_trait::async_trait;
use docflow_core::{
    ActionReceipt, ActionRequest, ApprovalHistoryEntry, DocumentId, DocumentSnapshot,
    ErpOperationResult, MoveToStatusRequest, Result, StepDirection, Transition, WorkflowBackend,
    WorkflowStatus,
};
use mockall::mock;

mock! {
    pub Backend {}

    #[async_trait]
    impl WorkflowBackend for Backend {
        async fn workflow_status(&self, document_id: DocumentId) -> Result<WorkflowStatus>;
        async fn available_transitions(&self, document_id: DocumentId) -> Result<Vec<Transition>>;
        async fn approval_history(
            &self,
            document_id: DocumentId,
        ) -> Result<Vec<ApprovalHistoryEntry>>;
        async fn document(&self, document_id: DocumentId) -> Result<DocumentSnapshot>;
        async fn perform_action(&self, request: &ActionRequest) -> Result<ActionReceipt>;
        async fn move_to_status(&self, request: &MoveToStatusRequest) -> Result<ActionReceipt>;
        async fn change_step(
            &self,
            document_id: DocumentId,
            direction: StepDirection,
            comments: Option<String>,
        ) -> Result<ActionReceipt>;
        async fn archive_to_erp(&self, document_id: DocumentId) -> Result<ErpOperationResult>;
        async fn create_erp_lines(&self, document_id: DocumentId) -> Result<ErpOperationResult>;
    }
}
