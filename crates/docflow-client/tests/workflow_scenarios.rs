//! End-to-end workflow scenarios against the scripted backend

use docflow_client::{ErpArchivalPoller, PollOutcome, WorkflowClient};
use docflow_core::{
    ActionId, ActionReceipt, ApiError, CacheEvent, CacheKey, DocumentId, MokaQueryCache,
    NotificationLevel, Notifier, PollConfig, QueryCache, RequestState, WorkflowBackend,
};
use docflow_test_utils::fixtures::{self, APPROVED, ARCHIVED, SUBMITTED};
use docflow_test_utils::{Call, Operation, RecordingNotifier, ScriptedBackend};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

struct Harness {
    backend: Arc<ScriptedBackend>,
    cache: MokaQueryCache,
    notifier: Arc<RecordingNotifier>,
    client: WorkflowClient,
}

fn harness(backend: ScriptedBackend) -> Harness {
    let backend = Arc::new(backend);
    let cache = MokaQueryCache::default();
    let notifier = Arc::new(RecordingNotifier::new());
    let client = WorkflowClient::new(
        Arc::clone(&backend) as Arc<dyn WorkflowBackend>,
        Arc::new(cache.clone()),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        PollConfig::default(),
    );
    Harness {
        backend,
        cache,
        notifier,
        client,
    }
}

fn completing_receipt() -> ActionReceipt {
    ActionReceipt {
        success: true,
        message: Some("Circuit completed".to_string()),
        is_circuit_completed: true,
    }
}

#[tokio::test(start_paused = true)]
async fn archival_code_on_fourth_cycle() {
    // One fetch to check the code before polling, then three empty cycles
    let h = harness(
        ScriptedBackend::new()
            .with_status(fixtures::workflow_status(42, APPROVED))
            .with_document_sequence(DocumentId(42), fixtures::archived_after(42, 4, "ERP-001"))
            .with_receipt(completing_receipt()),
    );

    let fired = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&fired);
    let doc = h.client.open(DocumentId(42)).with_erp_callback(move |archived| {
        assert_eq!(archived.erp_document_code, "ERP-001");
        seen.fetch_add(1, Ordering::SeqCst);
    });
    doc.load().await.unwrap();

    let started = Instant::now();
    let outcome = doc.perform_action(ActionId(1), true, None).await.unwrap();
    let poll = outcome.erp_poll.expect("circuit completion starts a poll");
    assert!(poll.is_started());

    let result = poll.handle().wait().await;

    assert_eq!(result.attempts(), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(20));
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert_eq!(h.backend.call_count(Operation::Document), 5);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.backend.call_count(Operation::Document), 5);
    assert!(doc.erp_poll().is_none());
    assert!(doc.is_stale());
    assert_eq!(
        h.notifier.last().map(|n| n.title),
        Some("Archived in ERP".to_string())
    );
}

#[tokio::test(start_paused = true)]
async fn poller_gives_up_after_budget() {
    let backend = Arc::new(ScriptedBackend::new().with_document(fixtures::document(8, None)));
    let notifier = Arc::new(RecordingNotifier::new());
    let poller = ErpArchivalPoller::new(
        Arc::clone(&backend) as Arc<dyn WorkflowBackend>,
        Arc::new(MokaQueryCache::default()),
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        PollConfig::default(),
    );

    let started = Instant::now();
    let outcome = poller.start(DocumentId(8), None).into_handle().wait().await;

    assert_eq!(outcome, PollOutcome::Exhausted { attempts: 12 });
    assert_eq!(started.elapsed(), Duration::from_secs(60));
    assert_eq!(backend.call_count(Operation::Document), 12);
    assert!(notifier.notifications().is_empty());
}

#[tokio::test]
async fn conflict_on_move_keeps_status() {
    let h = harness(ScriptedBackend::new().with_status(fixtures::workflow_status(7, APPROVED)));
    let doc = h.client.open(DocumentId(7));
    let before = doc.load().await.unwrap();

    h.backend
        .fail_next(Operation::MoveToStatus, ApiError::from_response(409, None));
    let err = doc.move_to_status(SUBMITTED, None).await.unwrap_err();

    assert!(matches!(err, ApiError::Conflict(_)));
    assert_eq!(doc.status(), Some(before));
    assert_eq!(h.notifier.count(NotificationLevel::Error), 1);
    assert_eq!(
        h.notifier.last().map(|n| n.title),
        Some("Conflicting change".to_string())
    );
    // Served from cache: the failure did not invalidate anything
    assert_eq!(h.backend.call_count(Operation::WorkflowStatus), 1);
    doc.load().await.unwrap();
    assert_eq!(h.backend.call_count(Operation::WorkflowStatus), 1);
}

#[tokio::test]
async fn mutation_invalidates_each_key_once() {
    let h = harness(ScriptedBackend::new().with_status(fixtures::workflow_status(5, APPROVED)));
    let events = Arc::new(Mutex::new(Vec::new()));
    for key in CacheKey::all_for(DocumentId(5)) {
        let sink = Arc::clone(&events);
        h.cache.subscribe(key, Arc::new(move |e: CacheEvent| sink.lock().push(e)));
    }

    h.client
        .dispatcher()
        .move_to_status(docflow_core::MoveToStatusRequest::new(
            DocumentId(5),
            SUBMITTED,
        ))
        .await
        .unwrap();

    assert_eq!(
        h.backend.calls(),
        vec![Call {
            operation: Operation::MoveToStatus,
            document_id: DocumentId(5),
        }]
    );

    let events = events.lock().clone();
    for key in CacheKey::all_for(DocumentId(5)) {
        let count = events
            .iter()
            .filter(|e| **e == CacheEvent::Invalidated(key))
            .count();
        assert_eq!(count, 1, "{key:?}");
    }
    assert_eq!(
        h.backend
            .status_of(DocumentId(5))
            .and_then(|s| s.current_status_id),
        Some(SUBMITTED)
    );
}

#[tokio::test]
async fn move_refetches_server_status() {
    let h = harness(ScriptedBackend::new().with_status(fixtures::workflow_status(9, APPROVED)));
    let doc = h.client.open(DocumentId(9));
    doc.load().await.unwrap();

    let outcome = doc
        .move_to_status(SUBMITTED, Some("rework".into()))
        .await
        .unwrap();

    assert_eq!(
        outcome.status.and_then(|s| s.current_status_title),
        Some("Submitted".to_string())
    );
    assert_eq!(doc.view().state(), &RequestState::Success);
    assert!(outcome.erp_poll.is_none());
    assert_eq!(h.backend.call_count(Operation::WorkflowStatus), 2);
}

#[tokio::test(start_paused = true)]
async fn repeated_archive_request_shares_one_poll() {
    let h = harness(
        ScriptedBackend::new()
            .with_status(fixtures::workflow_status(12, ARCHIVED))
            .with_document(fixtures::document(12, None)),
    );
    let doc = h.client.open(DocumentId(12));

    let first = doc.archive_to_erp().await.unwrap();
    let second = doc.archive_to_erp().await.unwrap();

    assert!(first.erp_poll.as_ref().is_some_and(|p| p.is_started()));
    assert!(second.erp_poll.as_ref().is_some_and(|p| !p.is_started()));
    assert_eq!(h.client.poller().active_count(), 1);

    tokio::time::sleep(Duration::from_secs(26)).await;
    assert_eq!(h.backend.call_count(Operation::Document), 5);
    h.client.poller().cancel_all();
}

#[tokio::test(start_paused = true)]
async fn closing_view_cancels_in_flight_load() {
    let h = harness(
        ScriptedBackend::new()
            .with_status(fixtures::workflow_status(3, APPROVED))
            .with_delay(Duration::from_secs(10)),
    );
    let doc = Arc::new(h.client.open(DocumentId(3)));

    let pending = tokio::spawn({
        let doc = Arc::clone(&doc);
        async move { doc.load().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(doc.scope().in_flight(), 1);

    doc.close();

    assert_eq!(pending.await.unwrap(), Err(ApiError::Cancelled));
    assert!(doc.status().is_none());
    assert_eq!(doc.view().state(), &RequestState::Idle);
    assert!(h.notifier.notifications().is_empty());
    assert!(h
        .cache
        .read(&CacheKey::WorkflowStatus(DocumentId(3)))
        .await
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn slow_load_does_not_overwrite_newer_refresh() {
    let h = harness(ScriptedBackend::new().with_status(fixtures::workflow_status(21, APPROVED)));
    h.backend
        .delay_next(Operation::WorkflowStatus, Duration::from_secs(10));
    let doc = Arc::new(h.client.open(DocumentId(21)));

    let slow = tokio::spawn({
        let doc = Arc::clone(&doc);
        async move { doc.load().await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Server moves on while the first answer is still on the wire
    h.backend
        .set_status(fixtures::workflow_status(21, SUBMITTED));
    let fresh = doc.refresh().await.unwrap();
    assert_eq!(fresh.current_status_id, Some(SUBMITTED));

    let stale = slow.await.unwrap().unwrap();
    assert_eq!(stale.current_status_id, Some(APPROVED));

    assert_eq!(
        doc.status().and_then(|s| s.current_status_id),
        Some(SUBMITTED)
    );
    assert_eq!(doc.view().state(), &RequestState::Success);
    assert_eq!(h.backend.call_count(Operation::WorkflowStatus), 2);
}

#[tokio::test(start_paused = true)]
async fn slow_failed_move_does_not_mark_newer_load_failed() {
    let h = harness(ScriptedBackend::new().with_status(fixtures::workflow_status(22, APPROVED)));
    let doc = Arc::new(h.client.open(DocumentId(22)));
    doc.load().await.unwrap();

    h.backend
        .delay_next(Operation::MoveToStatus, Duration::from_secs(10));
    h.backend
        .fail_next(Operation::MoveToStatus, ApiError::from_response(409, None));
    let slow = tokio::spawn({
        let doc = Arc::clone(&doc);
        async move { doc.move_to_status(SUBMITTED, None).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(doc.view().is_loading());

    doc.refresh().await.unwrap();
    assert_eq!(doc.view().state(), &RequestState::Success);

    assert!(matches!(slow.await.unwrap(), Err(ApiError::Conflict(_))));
    // The failure is still reported, but the view keeps the newer outcome
    assert_eq!(doc.view().state(), &RequestState::Success);
    assert_eq!(h.notifier.count(NotificationLevel::Error), 1);
    assert_eq!(
        doc.status().and_then(|s| s.current_status_id),
        Some(APPROVED)
    );
}

#[tokio::test(start_paused = true)]
async fn closing_view_during_move_returns_view_to_idle() {
    let h = harness(ScriptedBackend::new().with_status(fixtures::workflow_status(23, APPROVED)));
    let doc = Arc::new(h.client.open(DocumentId(23)));
    doc.load().await.unwrap();

    h.backend
        .delay_next(Operation::MoveToStatus, Duration::from_secs(10));
    let pending = tokio::spawn({
        let doc = Arc::clone(&doc);
        async move { doc.move_to_status(SUBMITTED, None).await }
    });
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(doc.view().is_loading());

    doc.close();

    assert!(matches!(pending.await.unwrap(), Err(ApiError::Cancelled)));
    assert_eq!(doc.view().state(), &RequestState::Idle);
    assert!(h.notifier.notifications().is_empty());
}

#[tokio::test]
async fn read_failure_notifies_and_leaves_view_usable() {
    let h = harness(ScriptedBackend::new().with_status(fixtures::workflow_status(4, APPROVED)));
    h.backend.fail_next(
        Operation::WorkflowStatus,
        ApiError::ServiceUnavailable("maintenance".into()),
    );
    let doc = h.client.open(DocumentId(4));

    let err = doc.load().await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(doc.view().state(), RequestState::Error(n) if n.help.is_some()));

    // Manual retry
    let status = doc.load().await.unwrap();
    assert_eq!(status.current_status_id, Some(APPROVED));
    assert_eq!(doc.view().state(), &RequestState::Success);
}

#[tokio::test]
async fn history_and_transitions_are_cached() {
    let h = harness(
        ScriptedBackend::new()
            .with_status(fixtures::workflow_status(6, APPROVED))
            .with_transitions(DocumentId(6), fixtures::transitions())
            .with_history(DocumentId(6), fixtures::approval_history()),
    );
    let doc = h.client.open(DocumentId(6));

    assert_eq!(doc.transitions().await.unwrap().len(), 4);
    assert_eq!(doc.transitions().await.unwrap().len(), 4);
    let history = doc.history().await.unwrap();
    doc.history().await.unwrap();

    assert_eq!(history[0].responses[0].responder, "c.durand");
    assert_eq!(h.backend.call_count(Operation::Transitions), 1);
    assert_eq!(h.backend.call_count(Operation::ApprovalHistory), 1);
}
