//! Workflow Status Reader
//!
//! Cache-first reads of a document's workflow state. A miss goes to the
//! backend and the response replaces the cache entry wholesale. Failures are
//! surfaced as a non-blocking notification and returned so the caller can
//! offer a manual retry.

use docflow_core::{
    ApiError, ApprovalHistoryEntry, CacheKey, CachedValue, DocumentId, DocumentSnapshot,
    Notifier, QueryCache, Result, Transition, WorkflowBackend, WorkflowStatus,
};
use std::future::Future;
use std::sync::Arc;

/// Reads workflow status and related document data
#[derive(Clone)]
pub struct WorkflowStatusReader {
    backend: Arc<dyn WorkflowBackend>,
    cache: Arc<dyn QueryCache>,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for WorkflowStatusReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowStatusReader").finish_non_exhaustive()
    }
}

impl WorkflowStatusReader {
    /// Create reader over injected collaborators
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

    /// Current workflow status, from cache when present
    ///
    /// # Errors
    /// Any backend failure (network, not found, unauthorized, ...); a
    /// notification has already been emitted
    pub async fn status(&self, document_id: DocumentId) -> Result<WorkflowStatus> {
        let key = CacheKey::WorkflowStatus(document_id);
        if let Some(CachedValue::WorkflowStatus(status)) = self.cache.read(&key).await {
            tracing::debug!(%document_id, "workflow status served from cache");
            return Ok(status);
        }
        self.refresh(document_id).await
    }

    /// Fetch workflow status from the backend, bypassing the cache
    ///
    /// # Errors
    /// Any backend failure; a notification has already been emitted
    pub async fn refresh(&self, document_id: DocumentId) -> Result<WorkflowStatus> {
        let status = self
            .fetch("workflow status", document_id, self.backend.workflow_status(document_id))
            .await?;
        self.cache
            .write(
                CacheKey::WorkflowStatus(document_id),
                CachedValue::WorkflowStatus(status.clone()),
            )
            .await;
        Ok(status)
    }

    /// Statuses the document may be moved to
    ///
    /// # Errors
    /// Any backend failure; a notification has already been emitted
    pub async fn available_transitions(&self, document_id: DocumentId) -> Result<Vec<Transition>> {
        let key = CacheKey::Transitions(document_id);
        if let Some(CachedValue::Transitions(list)) = self.cache.read(&key).await {
            return Ok(list);
        }
        let list = self
            .fetch(
                "available transitions",
                document_id,
                self.backend.available_transitions(document_id),
            )
            .await?;
        self.cache
            .write(key, CachedValue::Transitions(list.clone()))
            .await;
        Ok(list)
    }

    /// Approval history, oldest first as delivered by the backend
    ///
    /// # Errors
    /// Any backend failure; a notification has already been emitted
    pub async fn approval_history(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<ApprovalHistoryEntry>> {
        let key = CacheKey::ApprovalHistory(document_id);
        if let Some(CachedValue::ApprovalHistory(list)) = self.cache.read(&key).await {
            return Ok(list);
        }
        let list = self
            .fetch(
                "approval history",
                document_id,
                self.backend.approval_history(document_id),
            )
            .await?;
        self.cache
            .write(key, CachedValue::ApprovalHistory(list.clone()))
            .await;
        Ok(list)
    }

    /// Document snapshot (ERP archival code included)
    ///
    /// # Errors
    /// Any backend failure; a notification has already been emitted
    pub async fn document(&self, document_id: DocumentId) -> Result<DocumentSnapshot> {
        let key = CacheKey::Document(document_id);
        if let Some(CachedValue::Document(doc)) = self.cache.read(&key).await {
            return Ok(doc);
        }
        let doc = self
            .fetch("document", document_id, self.backend.document(document_id))
            .await?;
        self.cache.write(key, CachedValue::Document(doc.clone())).await;
        Ok(doc)
    }

    async fn fetch<T, F>(
        &self,
        what: &'static str,
        document_id: DocumentId,
        request: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match request.await {
            Ok(value) => {
                tracing::debug!(%document_id, what, "fetched");
                Ok(value)
            }
            Err(err) => {
                self.report(what, document_id, &err);
                Err(err)
            }
        }
    }

    fn report(&self, what: &str, document_id: DocumentId, err: &ApiError) {
        tracing::warn!(%document_id, what, error = %err, "read failed");
        if err.is_user_visible() {
            self.notifier.notify(err.to_notification());
        }
    }
}
