//! Client session and per-document workflow views
//!
//! [`WorkflowClient`] wires the backend, cache and notifier into the reader,
//! dispatcher and poller. [`DocumentWorkflow`] is what a screen holds while
//! it shows one document:
//!
//! UI event → dispatcher → REST call → cache invalidation → reader refetch →
//! view updated. Qualifying actions then hand the document to the ERP poller.
//!
//! Requests issued through a `DocumentWorkflow` are bound to its scope and
//! aborted when it is closed or dropped. ERP polls are not; they outlive the
//! view and report through the notifier and the completion callback.

use crate::dispatcher::WorkflowActionDispatcher;
use crate::http::HttpBackend;
use crate::poller::{ErpArchivalPoller, ErpArchived, PollHandle, PollStart};
use crate::reader::WorkflowStatusReader;
use crate::scope::{ScopeGuard, ViewScope};
use docflow_core::{
    ActionId, ActionReceipt, ActionRequest, ApiError, ApprovalHistoryEntry, CacheEvent, CacheKey,
    ClientConfig, DocumentId, DocumentSnapshot, ErpOperationResult, MokaQueryCache,
    MoveToStatusRequest, Notifier, PollConfig, QueryCache, Result, StatusId, StepDirection,
    SubscriptionId, Ticket, TracingNotifier, Transition, WorkflowBackend, WorkflowStatus,
    WorkflowView,
};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Callback shared by every ERP poll a view starts
pub type ArchivedCallback = Arc<dyn Fn(&ErpArchived) + Send + Sync>;

/// Entry point: one per backend connection
#[derive(Clone)]
pub struct WorkflowClient {
    cache: Arc<dyn QueryCache>,
    notifier: Arc<dyn Notifier>,
    reader: WorkflowStatusReader,
    dispatcher: WorkflowActionDispatcher,
    poller: ErpArchivalPoller,
}

impl std::fmt::Debug for WorkflowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowClient")
            .field("poller", &self.poller)
            .finish_non_exhaustive()
    }
}

impl WorkflowClient {
    /// Build an HTTP-backed client from configuration
    ///
    /// # Errors
    /// `ApiError::Config` if the configuration is invalid
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let backend = HttpBackend::new(config)?;
        let cache = match config.cache.ttl_secs {
            Some(ttl) => {
                MokaQueryCache::with_ttl(config.cache.max_entries, Duration::from_secs(ttl))
            }
            None => MokaQueryCache::new(config.cache.max_entries),
        };
        tracing::debug!(base_url = backend.base_url(), "workflow client configured");
        Ok(Self::new(
            Arc::new(backend),
            Arc::new(cache),
            Arc::new(TracingNotifier),
            config.poll,
        ))
    }

    /// Build a client over injected collaborators
    #[must_use]
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        cache: Arc<dyn QueryCache>,
        notifier: Arc<dyn Notifier>,
        poll: PollConfig,
    ) -> Self {
        let reader = WorkflowStatusReader::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&notifier),
        );
        let dispatcher = WorkflowActionDispatcher::new(
            Arc::clone(&backend),
            Arc::clone(&cache),
            Arc::clone(&notifier),
        );
        let poller =
            ErpArchivalPoller::new(backend, Arc::clone(&cache), Arc::clone(&notifier), poll);
        Self {
            cache,
            notifier,
            reader,
            dispatcher,
            poller,
        }
    }

    /// Status reader
    #[inline]
    #[must_use]
    pub fn reader(&self) -> &WorkflowStatusReader {
        &self.reader
    }

    /// Action dispatcher
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &WorkflowActionDispatcher {
        &self.dispatcher
    }

    /// ERP archival poller
    #[inline]
    #[must_use]
    pub fn poller(&self) -> &ErpArchivalPoller {
        &self.poller
    }

    /// Shared query cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<dyn QueryCache> {
        &self.cache
    }

    /// Notification sink
    #[inline]
    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Open a view on one document
    #[must_use]
    pub fn open(&self, document_id: DocumentId) -> DocumentWorkflow {
        DocumentWorkflow::new(self, document_id)
    }
}

/// Result of a successful workflow mutation
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    /// Server acknowledgement
    pub receipt: ActionReceipt,
    /// Status refetched after the mutation, if the refetch succeeded
    pub status: Option<WorkflowStatus>,
    /// ERP poll started (or joined) because of this action
    pub erp_poll: Option<PollStart>,
}

/// Result of an ERP archival request
#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub result: ErpOperationResult,
    /// Poll waiting for the archival code, unless it came back immediately
    pub erp_poll: Option<PollStart>,
}

/// One document's workflow as shown by a view
pub struct DocumentWorkflow {
    document_id: DocumentId,
    reader: WorkflowStatusReader,
    dispatcher: WorkflowActionDispatcher,
    poller: ErpArchivalPoller,
    cache: Arc<dyn QueryCache>,
    view: Arc<Mutex<WorkflowView>>,
    stale: Arc<AtomicBool>,
    subscriptions: Vec<SubscriptionId>,
    on_archived: Option<ArchivedCallback>,
    scope: ScopeGuard,
}

impl std::fmt::Debug for DocumentWorkflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentWorkflow")
            .field("document_id", &self.document_id)
            .field("view", &*self.view.lock())
            .field("stale", &self.is_stale())
            .finish_non_exhaustive()
    }
}

impl DocumentWorkflow {
    fn new(client: &WorkflowClient, document_id: DocumentId) -> Self {
        let stale = Arc::new(AtomicBool::new(false));
        let subscriptions = CacheKey::all_for(document_id)
            .into_iter()
            .map(|key| {
                let stale = Arc::clone(&stale);
                client.cache.subscribe(
                    key,
                    Arc::new(move |event: CacheEvent| {
                        if let CacheEvent::Invalidated(_) = event {
                            stale.store(true, Ordering::SeqCst);
                        }
                    }),
                )
            })
            .collect();

        Self {
            document_id,
            reader: client.reader.clone(),
            dispatcher: client.dispatcher.clone(),
            poller: client.poller.clone(),
            cache: Arc::clone(&client.cache),
            view: Arc::new(Mutex::new(WorkflowView::new(document_id))),
            stale,
            subscriptions,
            on_archived: None,
            scope: ScopeGuard::new(),
        }
    }

    /// With a callback run when an ERP poll started by this view succeeds
    #[must_use]
    pub fn with_erp_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ErpArchived) + Send + Sync + 'static,
    {
        self.on_archived = Some(Arc::new(callback));
        self
    }

    /// Document shown
    #[inline]
    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Snapshot of the view model
    #[must_use]
    pub fn view(&self) -> WorkflowView {
        self.view.lock().clone()
    }

    /// Displayed status, if loaded
    #[must_use]
    pub fn status(&self) -> Option<WorkflowStatus> {
        self.view.lock().status().cloned()
    }

    /// Whether a cache entry of this document was invalidated since the last
    /// successful load
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    /// Scope the view's requests run in
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &ViewScope {
        self.scope.scope()
    }

    /// Running ERP poll for this document, if any
    #[must_use]
    pub fn erp_poll(&self) -> Option<PollHandle> {
        self.poller.handle(self.document_id)
    }

    /// Abort in-flight requests; the view accepts no more
    ///
    /// An aborted request returns the view model to `Idle`.
    pub fn close(&self) {
        self.scope.scope().close();
    }

    /// Load the workflow status (cache first)
    ///
    /// # Errors
    /// Backend failure or `Cancelled`; the displayed status is kept
    pub async fn load(&self) -> Result<WorkflowStatus> {
        let ticket = self.begin()?;
        let fetched = self.scoped(self.reader.status(self.document_id)).await;
        self.complete_load(ticket, fetched)
    }

    /// Reload the workflow status from the backend
    ///
    /// # Errors
    /// Backend failure or `Cancelled`; the displayed status is kept
    pub async fn refresh(&self) -> Result<WorkflowStatus> {
        let ticket = self.begin()?;
        let fetched = self.scoped(self.reader.refresh(self.document_id)).await;
        self.complete_load(ticket, fetched)
    }

    /// Statuses the document may be moved to
    ///
    /// # Errors
    /// Backend failure or `Cancelled`
    pub async fn transitions(&self) -> Result<Vec<Transition>> {
        self.scoped(self.reader.available_transitions(self.document_id))
            .await
    }

    /// Approval history
    ///
    /// # Errors
    /// Backend failure or `Cancelled`
    pub async fn history(&self) -> Result<Vec<ApprovalHistoryEntry>> {
        self.scoped(self.reader.approval_history(self.document_id))
            .await
    }

    /// Document snapshot
    ///
    /// # Errors
    /// Backend failure or `Cancelled`
    pub async fn document(&self) -> Result<DocumentSnapshot> {
        self.scoped(self.reader.document(self.document_id)).await
    }

    /// Perform an action of the current step
    ///
    /// # Errors
    /// Backend failure or `Cancelled`; the displayed status is kept
    pub async fn perform_action(
        &self,
        action_id: ActionId,
        is_approved: bool,
        comments: Option<String>,
    ) -> Result<DispatchOutcome> {
        let mut request = ActionRequest::new(self.document_id, action_id, is_approved);
        request.comments = comments;
        self.dispatch(self.dispatcher.perform_action(request), false)
            .await
    }

    /// Move the document to one of its reachable statuses
    ///
    /// # Errors
    /// Backend failure or `Cancelled`; the displayed status is kept
    pub async fn move_to_status(
        &self,
        target_status_id: StatusId,
        comments: Option<String>,
    ) -> Result<DispatchOutcome> {
        let reaches_final = self
            .view
            .lock()
            .status()
            .and_then(|s| s.reachable_status(target_status_id))
            .is_some_and(|s| s.is_final);
        let mut request = MoveToStatusRequest::new(self.document_id, target_status_id);
        request.comments = comments;
        self.dispatch(self.dispatcher.move_to_status(request), reaches_final)
            .await
    }

    /// Advance to the next circuit step
    ///
    /// # Errors
    /// Backend failure or `Cancelled`; the displayed status is kept
    pub async fn advance(&self, comments: Option<String>) -> Result<DispatchOutcome> {
        self.dispatch(
            self.dispatcher
                .change_step(self.document_id, StepDirection::Advance, comments),
            false,
        )
        .await
    }

    /// Return to the previous circuit step
    ///
    /// # Errors
    /// Backend failure or `Cancelled`; the displayed status is kept
    pub async fn return_step(&self, comments: Option<String>) -> Result<DispatchOutcome> {
        self.dispatch(
            self.dispatcher
                .change_step(self.document_id, StepDirection::Return, comments),
            false,
        )
        .await
    }

    /// Request ERP archival and poll for its code
    ///
    /// # Errors
    /// `ErpArchival`, transport failure or `Cancelled`
    pub async fn archive_to_erp(&self) -> Result<ArchiveOutcome> {
        let result = self
            .scoped(self.dispatcher.archive_to_erp(self.document_id))
            .await?;
        let archived_now = result
            .erp_document_code
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty());
        let erp_poll = if archived_now {
            None
        } else {
            Some(self.poller.start(self.document_id, self.completion()))
        };
        Ok(ArchiveOutcome { result, erp_poll })
    }

    /// Create the document's lines in the ERP
    ///
    /// # Errors
    /// `ErpLineCreation`, transport failure or `Cancelled`
    pub async fn create_erp_lines(&self) -> Result<ErpOperationResult> {
        self.scoped(self.dispatcher.create_erp_lines(self.document_id))
            .await
    }

    /// Start a request on the view unless the view is closed
    fn begin(&self) -> Result<Ticket> {
        if self.scope().is_closed() {
            return Err(ApiError::Cancelled);
        }
        Ok(self.view.lock().begin())
    }

    async fn scoped<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.scope.scope().run(request).await
    }

    fn complete_load(
        &self,
        ticket: Ticket,
        fetched: Result<WorkflowStatus>,
    ) -> Result<WorkflowStatus> {
        let mut view = self.view.lock();
        match &fetched {
            Ok(status) => {
                if view.succeed_with(ticket, status.clone()) {
                    self.stale.store(false, Ordering::SeqCst);
                }
            }
            Err(ApiError::Cancelled) => {
                view.cancel(ticket);
            }
            Err(err) => {
                view.fail(ticket, err);
            }
        }
        fetched
    }

    /// Run a mutation, refetch the status and start ERP polling when the
    /// action may have triggered archival
    async fn dispatch<F>(&self, mutation: F, reaches_final: bool) -> Result<DispatchOutcome>
    where
        F: Future<Output = Result<ActionReceipt>>,
    {
        let ticket = self.begin()?;

        let receipt = match self.scoped(mutation).await {
            Ok(receipt) => receipt,
            Err(err) => {
                let mut view = self.view.lock();
                if err == ApiError::Cancelled {
                    view.cancel(ticket);
                } else {
                    view.fail(ticket, &err);
                }
                return Err(err);
            }
        };

        let status = match self.scoped(self.reader.status(self.document_id)).await {
            Ok(status) => {
                if self.view.lock().succeed_with(ticket, status.clone()) {
                    self.stale.store(false, Ordering::SeqCst);
                }
                Some(status)
            }
            Err(err) => {
                tracing::debug!(
                    document_id = %self.document_id,
                    error = %err,
                    "status refetch after mutation failed"
                );
                self.view.lock().succeed(ticket);
                None
            }
        };

        let completed = receipt.is_circuit_completed
            || reaches_final
            || status.as_ref().is_some_and(|s| s.is_circuit_completed);
        let erp_poll = if completed {
            self.start_erp_poll().await
        } else {
            None
        };

        Ok(DispatchOutcome {
            receipt,
            status,
            erp_poll,
        })
    }

    async fn start_erp_poll(&self) -> Option<PollStart> {
        match self.scoped(self.reader.document(self.document_id)).await {
            Ok(document) if document.is_archived() => {
                tracing::debug!(document_id = %self.document_id, "already archived in ERP");
                None
            }
            Ok(_) => Some(self.poller.start(self.document_id, self.completion())),
            Err(err) => {
                tracing::debug!(
                    document_id = %self.document_id,
                    error = %err,
                    "cannot check ERP code, not polling"
                );
                None
            }
        }
    }

    fn completion(&self) -> Option<crate::poller::CompletionCallback> {
        self.on_archived.as_ref().map(|callback| {
            let callback = Arc::clone(callback);
            Box::new(move |archived: &ErpArchived| callback(archived))
                as crate::poller::CompletionCallback
        })
    }
}

impl Drop for DocumentWorkflow {
    fn drop(&mut self) {
        for id in self.subscriptions.drain(..) {
            self.cache.unsubscribe(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::{RequestState, StatusInfo};
    use docflow_test_utils::{MockBackend, RecordingNotifier};

    fn status(id: i64, current: i64, final_target: bool) -> WorkflowStatus {
        WorkflowStatus {
            document_id: DocumentId(id),
            circuit_id: None,
            current_step_id: None,
            current_status_id: Some(StatusId(current)),
            current_step_title: None,
            current_status_title: None,
            available_statuses: vec![StatusInfo {
                status_id: StatusId(9),
                title: "Closed".into(),
                is_required: false,
                is_final: final_target,
            }],
            available_actions: Vec::new(),
            can_advance: true,
            can_return: false,
            is_circuit_completed: false,
        }
    }

    fn client(backend: MockBackend) -> WorkflowClient {
        WorkflowClient::new(
            Arc::new(backend),
            Arc::new(MokaQueryCache::default()),
            Arc::new(RecordingNotifier::new()),
            PollConfig::default(),
        )
    }

    #[tokio::test]
    async fn failed_move_keeps_displayed_status() {
        let mut backend = MockBackend::new();
        backend
            .expect_workflow_status()
            .times(1)
            .returning(|id| Ok(status(id.get(), 7, false)));
        backend
            .expect_move_to_status()
            .times(1)
            .returning(|_| Err(ApiError::from_response(409, None)));

        let client = client(backend);
        let doc = client.open(DocumentId(7));
        let before = doc.load().await.unwrap();

        let err = doc.move_to_status(StatusId(3), None).await.unwrap_err();

        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(doc.status(), Some(before));
        assert!(matches!(
            doc.view().state(),
            RequestState::Error(n) if n.title == "Conflicting change"
        ));
        assert!(!doc.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn move_to_final_status_starts_erp_poll() {
        let mut backend = MockBackend::new();
        backend
            .expect_workflow_status()
            .returning(|id| Ok(status(id.get(), 7, true)));
        backend
            .expect_move_to_status()
            .times(1)
            .returning(|_| Ok(ActionReceipt::default()));
        backend.expect_document().returning(|id| {
            Ok(DocumentSnapshot {
                id,
                document_key: None,
                title: None,
                erp_document_code: None,
            })
        });

        let client = client(backend);
        let doc = client.open(DocumentId(11));
        doc.load().await.unwrap();

        let outcome = doc.move_to_status(StatusId(9), None).await.unwrap();

        assert!(outcome.erp_poll.as_ref().is_some_and(PollStart::is_started));
        assert!(doc.erp_poll().is_some());
        assert_eq!(doc.view().state(), &RequestState::Success);
        client.poller().cancel_all();
    }

    #[tokio::test]
    async fn successful_action_refetches_status() {
        let mut backend = MockBackend::new();
        let mut seq = mockall::Sequence::new();
        backend
            .expect_workflow_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(status(id.get(), 1, false)));
        backend
            .expect_perform_action()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(ActionReceipt::default()));
        backend
            .expect_workflow_status()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|id| Ok(status(id.get(), 2, false)));

        let client = client(backend);
        let doc = client.open(DocumentId(3));
        doc.load().await.unwrap();

        let outcome = doc.perform_action(ActionId(4), true, None).await.unwrap();

        assert!(outcome.erp_poll.is_none());
        assert_eq!(
            doc.status().and_then(|s| s.current_status_id),
            Some(StatusId(2))
        );
        assert!(!doc.is_stale());
    }

    #[tokio::test]
    async fn dropping_view_unsubscribes() {
        let cache = MokaQueryCache::default();
        let client = WorkflowClient::new(
            Arc::new(MockBackend::new()),
            Arc::new(cache.clone()),
            Arc::new(RecordingNotifier::new()),
            PollConfig::default(),
        );

        let doc = client.open(DocumentId(5));
        assert_eq!(cache.stats().subscriber_count, 4);
        cache.invalidate(&CacheKey::Document(DocumentId(5))).await;
        assert!(doc.is_stale());

        drop(doc);
        assert_eq!(cache.stats().subscriber_count, 0);
    }

    #[tokio::test]
    async fn closed_view_rejects_requests() {
        let client = client(MockBackend::new());
        let doc = client.open(DocumentId(5));
        doc.close();

        assert_eq!(doc.load().await, Err(ApiError::Cancelled));
        assert_eq!(doc.view().state(), &RequestState::Idle);
    }
}
