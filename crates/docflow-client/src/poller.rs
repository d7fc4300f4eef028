//! ERP archival poller
//!
//! ERP archival runs out of process on the server. Once a qualifying action
//! succeeds the poller re-fetches the document on a fixed interval until it
//! carries an ERP archival code or the attempt budget runs out.
//!
//! Each poll is a tokio task keyed by document in a registry:
//! - starting a poll for a document that already has one returns the running
//!   poll instead of creating a second timer
//! - a finished poll removes itself from the registry
//! - cancelling clears the timer; no further fetch happens
//!
//! Outcomes:
//! - archival code present: cache invalidated, success notification, completion
//!   callback invoked once
//! - budget exhausted or fetch failure: silent stop, logged only

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use docflow_core::{
    ApiError, DocumentId, Notification, Notifier, PollConfig, QueryCache, WorkflowBackend,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Callback run once when the archival code appears
pub type CompletionCallback = Box<dyn FnOnce(&ErpArchived) + Send>;

/// Archival detected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErpArchived {
    pub document_id: DocumentId,
    pub erp_document_code: String,
    /// Fetches it took, this one included
    pub attempts: u32,
}

/// How a poll ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// Archival code found
    Archived(ErpArchived),
    /// Every attempt came back without a code
    Exhausted { attempts: u32 },
    /// A fetch failed; polling stopped
    FetchFailed { attempts: u32, error: ApiError },
    /// Cancelled through its handle
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    /// Archival result, if the poll succeeded
    #[must_use]
    pub fn archived(&self) -> Option<&ErpArchived> {
        match self {
            Self::Archived(a) => Some(a),
            _ => None,
        }
    }

    /// Number of fetches performed
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Archived(a) => a.attempts,
            Self::Exhausted { attempts }
            | Self::FetchFailed { attempts, .. }
            | Self::Cancelled { attempts } => *attempts,
        }
    }
}

/// Handle on a running (or finished) poll
#[derive(Debug, Clone)]
pub struct PollHandle {
    document_id: DocumentId,
    stop: Arc<Notify>,
    outcome: watch::Receiver<Option<PollOutcome>>,
}

impl PollHandle {
    /// Document being polled
    #[inline]
    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Stop the poll; no fetch is issued after this returns
    pub fn cancel(&self) {
        self.stop.notify_one();
    }

    /// Whether the poll has ended
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Outcome, if the poll has ended
    #[must_use]
    pub fn outcome(&self) -> Option<PollOutcome> {
        self.outcome.borrow().clone()
    }

    /// Wait for the poll to end
    pub async fn wait(&self) -> PollOutcome {
        let mut rx = self.outcome.clone();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone(),
            // Task dropped without reporting (runtime shut down)
            Err(_) => None,
        };
        outcome.unwrap_or(PollOutcome::Cancelled { attempts: 0 })
    }

    fn same_poll(&self, other: &PollHandle) -> bool {
        Arc::ptr_eq(&self.stop, &other.stop)
    }
}

/// Result of [`ErpArchivalPoller::start`]
#[derive(Debug, Clone)]
pub enum PollStart {
    /// A new poll was started
    Started(PollHandle),
    /// A poll for this document was already running; its handle is returned
    AlreadyRunning(PollHandle),
}

impl PollStart {
    /// Handle of the poll, new or existing
    #[must_use]
    pub fn handle(&self) -> &PollHandle {
        match self {
            Self::Started(h) | Self::AlreadyRunning(h) => h,
        }
    }

    /// Consume into the handle
    #[must_use]
    pub fn into_handle(self) -> PollHandle {
        match self {
            Self::Started(h) | Self::AlreadyRunning(h) => h,
        }
    }

    /// Whether this call created the poll
    #[inline]
    #[must_use]
    pub fn is_started(&self) -> bool {
        matches!(self, Self::Started(_))
    }
}

/// Polls documents until their ERP archival code appears
#[derive(Clone)]
pub struct ErpArchivalPoller {
    backend: Arc<dyn WorkflowBackend>,
    cache: Arc<dyn QueryCache>,
    notifier: Arc<dyn Notifier>,
    config: PollConfig,
    active: Arc<DashMap<DocumentId, PollHandle>>,
}

impl std::fmt::Debug for ErpArchivalPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErpArchivalPoller")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .finish_non_exhaustive()
    }
}

impl ErpArchivalPoller {
    /// Create poller
    #[must_use]
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        cache: Arc<dyn QueryCache>,
        notifier: Arc<dyn Notifier>,
        config: PollConfig,
    ) -> Self {
        Self {
            backend,
            cache,
            notifier,
            config,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Poll settings in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Start polling a document
    ///
    /// The first fetch happens one interval after the call. If the document
    /// is already being polled the running poll is returned and
    /// `on_archived` is dropped unused.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(
        &self,
        document_id: DocumentId,
        on_archived: Option<CompletionCallback>,
    ) -> PollStart {
        match self.active.entry(document_id) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_finished() {
                    tracing::debug!(%document_id, "ERP poll already running");
                    return PollStart::AlreadyRunning(entry.get().clone());
                }
                let handle = self.spawn(document_id, on_archived);
                entry.insert(handle.clone());
                PollStart::Started(handle)
            }
            Entry::Vacant(entry) => {
                let handle = self.spawn(document_id, on_archived);
                entry.insert(handle.clone());
                PollStart::Started(handle)
            }
        }
    }

    /// Handle of the running poll for a document
    #[must_use]
    pub fn handle(&self, document_id: DocumentId) -> Option<PollHandle> {
        self.active
            .get(&document_id)
            .map(|h| h.value().clone())
            .filter(|h| !h.is_finished())
    }

    /// Whether a poll is running for a document
    #[must_use]
    pub fn is_polling(&self, document_id: DocumentId) -> bool {
        self.handle(document_id).is_some()
    }

    /// Number of running polls
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|h| !h.value().is_finished()).count()
    }

    /// Cancel the poll of a document; returns whether one was running
    pub fn cancel(&self, document_id: DocumentId) -> bool {
        match self.handle(document_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running poll
    pub fn cancel_all(&self) {
        for entry in self.active.iter() {
            entry.value().cancel();
        }
    }

    fn spawn(
        &self,
        document_id: DocumentId,
        on_archived: Option<CompletionCallback>,
    ) -> PollHandle {
        let stop = Arc::new(Notify::new());
        let (tx, rx) = watch::channel(None);
        let handle = PollHandle {
            document_id,
            stop: Arc::clone(&stop),
            outcome: rx,
        };

        let task = PollTask {
            document_id,
            backend: Arc::clone(&self.backend),
            cache: Arc::clone(&self.cache),
            notifier: Arc::clone(&self.notifier),
            config: self.config,
            registry: Arc::clone(&self.active),
            own: handle.clone(),
            stop,
        };
        tracing::info!(
            %document_id,
            interval_secs = self.config.interval_secs,
            max_attempts = self.config.max_attempts,
            "ERP archival poll started"
        );
        tokio::spawn(task.run(tx, on_archived));
        handle
    }
}

struct PollTask {
    document_id: DocumentId,
    backend: Arc<dyn WorkflowBackend>,
    cache: Arc<dyn QueryCache>,
    notifier: Arc<dyn Notifier>,
    config: PollConfig,
    registry: Arc<DashMap<DocumentId, PollHandle>>,
    own: PollHandle,
    stop: Arc<Notify>,
}

impl PollTask {
    /// The callback stays out of `self`: `poll` borrows the task across
    /// awaits, so everything in it must be `Sync`.
    async fn run(
        self,
        tx: watch::Sender<Option<PollOutcome>>,
        on_archived: Option<CompletionCallback>,
    ) {
        let document_id = self.document_id;
        let outcome = self.poll().await;

        match &outcome {
            PollOutcome::Archived(archived) => {
                tracing::info!(
                    %document_id,
                    erp_document_code = %archived.erp_document_code,
                    attempts = archived.attempts,
                    "document archived in ERP"
                );
                self.cache.invalidate_document(document_id).await;
                self.notifier.notify(Notification::success(
                    "Archived in ERP",
                    format!(
                        "Document {document_id} archived with code {}",
                        archived.erp_document_code
                    ),
                ));
                if let Some(callback) = on_archived {
                    callback(archived);
                }
            }
            PollOutcome::Exhausted { attempts } => {
                tracing::info!(
                    %document_id,
                    attempts,
                    "ERP archival not detected, polling stopped"
                );
            }
            PollOutcome::FetchFailed { attempts, error } => {
                tracing::warn!(
                    %document_id,
                    attempts,
                    error = %error,
                    "ERP poll fetch failed, polling stopped"
                );
            }
            PollOutcome::Cancelled { attempts } => {
                tracing::debug!(%document_id, attempts, "ERP poll cancelled");
            }
        }

        let own = &self.own;
        self.registry
            .remove_if(&document_id, |_, current| current.same_poll(own));
        // Nobody waiting is fine
        let _ = tx.send(Some(outcome));
    }

    async fn poll(&self) -> PollOutcome {
        // interval_at panics on a zero period
        let period = self.config.interval().max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for attempt in 1..=self.config.max_attempts {
            tokio::select! {
                biased;
                () = self.stop.notified() => {
                    return PollOutcome::Cancelled { attempts: attempt - 1 };
                }
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                biased;
                () = self.stop.notified() => {
                    return PollOutcome::Cancelled { attempts: attempt };
                }
                fetched = self.backend.document(self.document_id) => fetched,
            };

            match fetched {
                Ok(document) => {
                    if let Some(code) = document.erp_code() {
                        return PollOutcome::Archived(ErpArchived {
                            document_id: self.document_id,
                            erp_document_code: code.to_string(),
                            attempts: attempt,
                        });
                    }
                    tracing::debug!(
                        document_id = %self.document_id,
                        attempt,
                        "no ERP code yet"
                    );
                }
                Err(error) => {
                    return PollOutcome::FetchFailed {
                        attempts: attempt,
                        error,
                    }
                }
            }
        }

        PollOutcome::Exhausted {
            attempts: self.config.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::{DocumentSnapshot, MokaQueryCache, NotificationLevel};
    use docflow_test_utils::{MockBackend, RecordingNotifier};
    use std::cell::Cell;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn snapshot(id: i64, code: Option<&str>) -> DocumentSnapshot {
        DocumentSnapshot {
            id: DocumentId(id),
            document_key: None,
            title: None,
            erp_document_code: code.map(str::to_string),
        }
    }

    /// Backend whose document gets an ERP code on the given fetch
    fn archiving_on(fetch: u32, calls: Arc<AtomicU32>) -> MockBackend {
        let mut backend = MockBackend::new();
        backend.expect_document().returning(move |id| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(snapshot(id.get(), (n >= fetch).then_some("ERP-001")))
        });
        backend
    }

    fn poller(backend: MockBackend, notifier: &Arc<RecordingNotifier>) -> ErpArchivalPoller {
        ErpArchivalPoller::new(
            Arc::new(backend),
            Arc::new(MokaQueryCache::default()),
            Arc::clone(notifier) as Arc<dyn Notifier>,
            PollConfig::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn archival_on_fourth_cycle_fires_callback_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(archiving_on(4, Arc::clone(&calls)), &notifier);

        let fired = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&fired);
        let started = Instant::now();
        let handle = poller
            .start(
                DocumentId(42),
                Some(Box::new(move |a: &ErpArchived| {
                    assert_eq!(a.erp_document_code, "ERP-001");
                    counter.fetch_add(1, Ordering::SeqCst);
                })),
            )
            .into_handle();

        let outcome = handle.wait().await;

        assert_eq!(outcome.attempts(), 4);
        assert_eq!(outcome.archived().map(|a| a.document_id), Some(DocumentId(42)));
        assert_eq!(started.elapsed(), Duration::from_secs(20));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!poller.is_polling(DocumentId(42)));

        // No fifth cycle
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        assert_eq!(notifier.notifications().len(), 1);
        assert_eq!(notifier.count(NotificationLevel::Success), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn budget_exhaustion_stops_silently() {
        let calls = Arc::new(AtomicU32::new(0));
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(archiving_on(u32::MAX, Arc::clone(&calls)), &notifier);

        let started = Instant::now();
        let outcome = poller.start(DocumentId(1), None).into_handle().wait().await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 12 });
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert_eq!(calls.load(Ordering::SeqCst), 12);
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_stops_without_notification() {
        let mut backend = MockBackend::new();
        backend
            .expect_document()
            .times(1)
            .returning(|_| Err(ApiError::Network("connection reset".into())));
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(backend, &notifier);

        let outcome = poller.start(DocumentId(2), None).into_handle().wait().await;

        assert!(matches!(outcome, PollOutcome::FetchFailed { attempts: 1, .. }));
        assert!(notifier.notifications().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_reuses_running_poll() {
        let calls = Arc::new(AtomicU32::new(0));
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(archiving_on(2, Arc::clone(&calls)), &notifier);

        let first = poller.start(DocumentId(42), None);
        let second = poller.start(DocumentId(42), None);

        assert!(first.is_started());
        assert!(!second.is_started());
        assert_eq!(poller.active_count(), 1);

        let outcome = second.handle().wait().await;
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.handle().outcome(), Some(outcome));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_clears_timer() {
        let calls = Arc::new(AtomicU32::new(0));
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(archiving_on(u32::MAX, Arc::clone(&calls)), &notifier);

        let handle = poller.start(DocumentId(5), None).into_handle();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(poller.cancel(DocumentId(5)));

        let outcome = handle.wait().await;
        assert_eq!(outcome, PollOutcome::Cancelled { attempts: 2 });

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!poller.is_polling(DocumentId(5)));
    }

    #[tokio::test(start_paused = true)]
    async fn restart_after_finish_creates_new_poll() {
        let calls = Arc::new(AtomicU32::new(0));
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(archiving_on(1, Arc::clone(&calls)), &notifier);

        poller.start(DocumentId(8), None).handle().wait().await;
        let again = poller.start(DocumentId(8), None);

        assert!(again.is_started());
        again.handle().wait().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn callback_needs_only_send() {
        let calls = Arc::new(AtomicU32::new(0));
        let notifier = Arc::new(RecordingNotifier::new());
        let poller = poller(archiving_on(1, calls), &notifier);

        // Cell is Send but not Sync
        let seen = Cell::new(0);
        let (tx, rx) = tokio::sync::oneshot::channel();
        poller.start(
            DocumentId(13),
            Some(Box::new(move |a: &ErpArchived| {
                seen.set(a.attempts);
                let _ = tx.send(seen.get());
            })),
        );

        assert_eq!(rx.await.unwrap(), 1);
    }
}
