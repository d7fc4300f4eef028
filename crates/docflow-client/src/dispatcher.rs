//! Workflow Action Dispatcher
//!
//! Submits workflow mutations and waits for the server round trip. Nothing
//! is applied locally before the backend confirms:
//! - success: every cache entry of the document is invalidated once and a
//!   success notification is emitted
//! - failure: an error notification is emitted and the cache is left alone

use docflow_core::{
    ActionReceipt, ActionRequest, DocumentId, ErpOperationResult, MoveToStatusRequest,
    Notification, Notifier, QueryCache, Result, StepDirection, WorkflowBackend,
};
use std::future::Future;
use std::sync::Arc;

/// Sends workflow actions to the backend
#[derive(Clone)]
pub struct WorkflowActionDispatcher {
    backend: Arc<dyn WorkflowBackend>,
    cache: Arc<dyn QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for WorkflowActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowActionDispatcher")
            .finish_non_exhaustive()
    }
}

impl WorkflowActionDispatcher {
    /// Create dispatcher over injected collaborators
    #[must_use]
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        cache: Arc<dyn QueryCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            backend,
            cache,
            notifier,
        }
    }

    /// Perform an action (approve, reject, ...) on the current step
    ///
    /// # Errors
    /// Backend failure (validation, conflict, permission denied, ...); a
    /// notification has already been emitted and no state was touched
    pub async fn perform_action(&self, request: ActionRequest) -> Result<ActionReceipt> {
        tracing::info!(
            document_id = %request.document_id,
            action_id = %request.action_id,
            approved = request.is_approved,
            "performing workflow action"
        );
        let receipt = self
            .confirm(request.document_id, self.backend.perform_action(&request))
            .await?;
        self.announce(&receipt, "Action completed");
        Ok(receipt)
    }

    /// Move the document to a reachable status
    ///
    /// # Errors
    /// Backend failure; a notification has already been emitted and no
    /// state was touched
    pub async fn move_to_status(&self, request: MoveToStatusRequest) -> Result<ActionReceipt> {
        tracing::info!(
            document_id = %request.document_id,
            target_status_id = %request.target_status_id,
            "moving document to status"
        );
        let receipt = self
            .confirm(request.document_id, self.backend.move_to_status(&request))
            .await?;
        self.announce(&receipt, "Status updated");
        Ok(receipt)
    }

    /// Advance or return the document's circuit step
    ///
    /// # Errors
    /// Backend failure; a notification has already been emitted and no
    /// state was touched
    pub async fn change_step(
        &self,
        document_id: DocumentId,
        direction: StepDirection,
        comments: Option<String>,
    ) -> Result<ActionReceipt> {
        tracing::info!(%document_id, %direction, "changing circuit step");
        let receipt = self
            .confirm(
                document_id,
                self.backend.change_step(document_id, direction, comments),
            )
            .await?;
        let fallback = match direction {
            StepDirection::Advance => "Moved to next step",
            StepDirection::Return => "Returned to previous step",
        };
        self.announce(&receipt, fallback);
        Ok(receipt)
    }

    /// Ask the backend to archive the document in the ERP
    ///
    /// # Errors
    /// `ErpArchival` or transport failures; a notification has already been
    /// emitted
    pub async fn archive_to_erp(&self, document_id: DocumentId) -> Result<ErpOperationResult> {
        tracing::info!(%document_id, "requesting ERP archival");
        let result = self
            .confirm(document_id, self.backend.archive_to_erp(document_id))
            .await?;
        let message = result
            .message
            .clone()
            .unwrap_or_else(|| "Archival to ERP requested".to_string());
        self.notifier
            .notify(Notification::success("ERP archival", message));
        Ok(result)
    }

    /// Ask the backend to create the document's lines in the ERP
    ///
    /// # Errors
    /// `ErpLineCreation` or transport failures; a notification has already
    /// been emitted
    pub async fn create_erp_lines(&self, document_id: DocumentId) -> Result<ErpOperationResult> {
        tracing::info!(%document_id, "requesting ERP line creation");
        let result = self
            .confirm(document_id, self.backend.create_erp_lines(document_id))
            .await?;
        let message = result
            .message
            .clone()
            .unwrap_or_else(|| "Lines created in ERP".to_string());
        self.notifier
            .notify(Notification::success("ERP lines", message));
        Ok(result)
    }

    /// Await the backend; invalidate on success, notify on failure
    async fn confirm<T, F>(&self, document_id: DocumentId, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match request.await {
            Ok(value) => {
                self.cache.invalidate_document(document_id).await;
                tracing::debug!(%document_id, "document cache invalidated");
                Ok(value)
            }
            Err(err) => {
                tracing::warn!(%document_id, error = %err, "workflow mutation rejected");
                if err.is_user_visible() {
                    self.notifier.notify(err.to_notification());
                }
                Err(err)
            }
        }
    }

    fn announce(&self, receipt: &ActionReceipt, fallback: &str) {
        let message = receipt
            .message
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| fallback.to_string());
        self.notifier
            .notify(Notification::success("Workflow", message));
    }
}
