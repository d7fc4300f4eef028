//! Testing utilities for the docflow workspace
//!
//! Shared test doubles and fixtures:
//! - [`ScriptedBackend`]: in-memory [`WorkflowBackend`] with scripted
//!   document states, injected failures, response latency and call recording
//! - [`MockBackend`]: mockall double for expectation-style tests
//! - [`RecordingNotifier`]: collects notifications for assertions
//! - [`fixtures`]: ready-made backend values

#![allow(missing_docs)]

pub mod fixtures;
mod mock;

pub use mock::MockBackend;

use async_trait::async_trait;
use docflow_core::{
    ActionReceipt, ActionRequest, ApiError, ApprovalHistoryEntry, DocumentId, DocumentSnapshot,
    ErpOperationResult, MoveToStatusRequest, Notification, NotificationLevel, Notifier, Result,
    StepDirection, Transition, WorkflowBackend, WorkflowStatus,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// Backend operation, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    WorkflowStatus,
    Transitions,
    ApprovalHistory,
    Document,
    PerformAction,
    MoveToStatus,
    ChangeStep,
    ArchiveToErp,
    CreateErpLines,
}

/// A recorded backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub document_id: DocumentId,
}

#[derive(Debug, Default)]
struct State {
    statuses: HashMap<DocumentId, WorkflowStatus>,
    transitions: HashMap<DocumentId, Vec<Transition>>,
    history: HashMap<DocumentId, Vec<ApprovalHistoryEntry>>,
    /// Successive document states; the last one repeats
    documents: HashMap<DocumentId, VecDeque<DocumentSnapshot>>,
    failures: HashMap<Operation, VecDeque<ApiError>>,
    latencies: HashMap<Operation, VecDeque<Duration>>,
    receipt: ActionReceipt,
    calls: Vec<Call>,
}

impl State {
    fn status(&mut self, document_id: DocumentId) -> Result<&mut WorkflowStatus> {
        self.statuses
            .get_mut(&document_id)
            .ok_or_else(|| missing("workflow status", document_id))
    }

    fn next_document(&mut self, document_id: DocumentId) -> Result<DocumentSnapshot> {
        let sequence = self
            .documents
            .get_mut(&document_id)
            .ok_or_else(|| missing("document", document_id))?;
        let next = if sequence.len() > 1 {
            sequence.pop_front()
        } else {
            sequence.front().cloned()
        };
        next.ok_or_else(|| missing("document", document_id))
    }
}

/// In-memory backend driven by a script
///
/// Answers are computed when a call arrives and delivered after the call's
/// latency, so a slow call returns the state the server had when it was sent.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    state: Mutex<State>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this status for its document
    #[must_use]
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.state
            .get_mut()
            .statuses
            .insert(status.document_id, status);
        self
    }

    #[must_use]
    pub fn with_transitions(
        mut self,
        document_id: DocumentId,
        transitions: Vec<Transition>,
    ) -> Self {
        self.state
            .get_mut()
            .transitions
            .insert(document_id, transitions);
        self
    }

    #[must_use]
    pub fn with_history(
        mut self,
        document_id: DocumentId,
        history: Vec<ApprovalHistoryEntry>,
    ) -> Self {
        self.state.get_mut().history.insert(document_id, history);
        self
    }

    /// Serve a fixed document
    #[must_use]
    pub fn with_document(self, document: DocumentSnapshot) -> Self {
        let id = document.id;
        self.with_document_sequence(id, vec![document])
    }

    /// Serve documents in order, one per fetch; the last one repeats
    #[must_use]
    pub fn with_document_sequence(
        mut self,
        document_id: DocumentId,
        sequence: Vec<DocumentSnapshot>,
    ) -> Self {
        self.state
            .get_mut()
            .documents
            .insert(document_id, sequence.into());
        self
    }

    /// Receipt returned by successful mutations
    #[must_use]
    pub fn with_receipt(mut self, receipt: ActionReceipt) -> Self {
        self.state.get_mut().receipt = receipt;
        self
    }

    /// Answer every call after this long
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail the next call of an operation with this error
    pub fn fail_next(&self, operation: Operation, error: ApiError) {
        self.state
            .lock()
            .failures
            .entry(operation)
            .or_default()
            .push_back(error);
    }

    /// Answer the next call of an operation after `latency` instead of the
    /// default delay
    pub fn delay_next(&self, operation: Operation, latency: Duration) {
        self.state
            .lock()
            .latencies
            .entry(operation)
            .or_default()
            .push_back(latency);
    }

    /// Replace the served status (server-side change)
    pub fn set_status(&self, status: WorkflowStatus) {
        self.state
            .lock()
            .statuses
            .insert(status.document_id, status);
    }

    /// Every call so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Number of calls of an operation
    pub fn call_count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Currently served status of a document
    pub fn status_of(&self, document_id: DocumentId) -> Option<WorkflowStatus> {
        self.state.lock().statuses.get(&document_id).cloned()
    }

    /// Record the call, compute its answer now and deliver it after the
    /// call's latency
    async fn respond<T, F>(
        &self,
        operation: Operation,
        document_id: DocumentId,
        answer: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut State) -> Result<T> + Send,
        T: Send,
    {
        let (result, latency) = {
            let mut state = self.state.lock();
            state.calls.push(Call {
                operation,
                document_id,
            });
            let latency = state
                .latencies
                .get_mut(&operation)
                .and_then(VecDeque::pop_front)
                .or(self.delay);
            let failure = state
                .failures
                .get_mut(&operation)
                .and_then(VecDeque::pop_front);
            let result = match failure {
                Some(error) => {
                    tracing::debug!(?operation, %document_id, %error, "scripted failure");
                    Err(error)
                }
                None => answer(&mut *state),
            };
            (result, latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        result
    }
}

fn missing(what: &str, document_id: DocumentId) -> ApiError {
    ApiError::NotFound(format!("{what} of document {document_id} not found"))
}

#[async_trait]
impl WorkflowBackend for ScriptedBackend {
    async fn workflow_status(&self, document_id: DocumentId) -> Result<WorkflowStatus> {
        self.respond(Operation::WorkflowStatus, document_id, |state| {
            state.status(document_id).cloned()
        })
        .await
    }

    async fn available_transitions(&self, document_id: DocumentId) -> Result<Vec<Transition>> {
        self.respond(Operation::Transitions, document_id, |state| {
            Ok(state
                .transitions
                .get(&document_id)
                .cloned()
                .unwrap_or_default())
        })
        .await
    }

    async fn approval_history(
        &self,
        document_id: DocumentId,
    ) -> Result<Vec<ApprovalHistoryEntry>> {
        self.respond(Operation::ApprovalHistory, document_id, |state| {
            Ok(state.history.get(&document_id).cloned().unwrap_or_default())
        })
        .await
    }

    async fn document(&self, document_id: DocumentId) -> Result<DocumentSnapshot> {
        self.respond(Operation::Document, document_id, |state| {
            state.next_document(document_id)
        })
        .await
    }

    async fn perform_action(&self, request: &ActionRequest) -> Result<ActionReceipt> {
        self.respond(Operation::PerformAction, request.document_id, |state| {
            Ok(state.receipt.clone())
        })
        .await
    }

    async fn move_to_status(&self, request: &MoveToStatusRequest) -> Result<ActionReceipt> {
        let target = request.target_status_id;
        self.respond(Operation::MoveToStatus, request.document_id, |state| {
            let status = state.status(request.document_id)?;
            let title = status
                .reachable_status(target)
                .map(|s| s.title.clone())
                .ok_or_else(|| ApiError::Validation {
                    message: format!("status {target} is not reachable"),
                    details: None,
                })?;
            status.current_status_id = Some(target);
            status.current_status_title = Some(title);
            Ok(state.receipt.clone())
        })
        .await
    }

    async fn change_step(
        &self,
        document_id: DocumentId,
        _direction: StepDirection,
        _comments: Option<String>,
    ) -> Result<ActionReceipt> {
        self.respond(Operation::ChangeStep, document_id, |state| {
            Ok(state.receipt.clone())
        })
        .await
    }

    async fn archive_to_erp(&self, document_id: DocumentId) -> Result<ErpOperationResult> {
        self.respond(Operation::ArchiveToErp, document_id, |_| {
            Ok(ErpOperationResult {
                success: true,
                message: Some("Archival queued".to_string()),
                erp_document_code: None,
            })
        })
        .await
    }

    async fn create_erp_lines(&self, document_id: DocumentId) -> Result<ErpOperationResult> {
        self.respond(Operation::CreateErpLines, document_id, |_| {
            Ok(ErpOperationResult {
                success: true,
                message: Some("Lines created".to_string()),
                erp_document_code: None,
            })
        })
        .await
    }
}

/// Notifier that keeps every notification
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().clone()
    }

    pub fn count(&self, level: NotificationLevel) -> usize {
        self.seen.lock().iter().filter(|n| n.level == level).count()
    }

    pub fn last(&self) -> Option<Notification> {
        self.seen.lock().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().push(notification);
    }
}
