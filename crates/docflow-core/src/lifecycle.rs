//! Request lifecycle of a document view
//!
//! `Idle → Loading → {Success, Error}`, re-entrant per action. Only explicit
//! calls move the state; there is no automatic advancement. Beginning a new
//! request clears the previous outcome. A request abandoned before it
//! completes returns the view to `Idle`.
//!
//! The view also holds the displayed [`WorkflowStatus`]. It is replaced
//! wholesale by a successful load and never touched by a failure.
//!
//! Each `begin` hands out a [`Ticket`]. Completing with a ticket that is no
//! longer the latest is ignored, so a slow response cannot overwrite the
//! outcome of a request started after it.

use crate::error::ApiError;
use crate::notification::Notification;
use crate::types::{DocumentId, WorkflowStatus};

/// Per-call request state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RequestState {
    /// Nothing in flight, no outcome yet
    #[default]
    Idle,
    /// A request is in flight
    Loading,
    /// The last request succeeded
    Success,
    /// The last request failed; the notification shown to the user
    Error(Notification),
}

/// Proof that a request was started; used to complete it
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

/// Client-side view model of one document's workflow
#[derive(Debug, Clone)]
pub struct WorkflowView {
    document_id: DocumentId,
    status: Option<WorkflowStatus>,
    state: RequestState,
    generation: u64,
}

impl WorkflowView {
    /// Create an idle view with nothing displayed
    #[must_use]
    pub fn new(document_id: DocumentId) -> Self {
        Self {
            document_id,
            status: None,
            state: RequestState::Idle,
            generation: 0,
        }
    }

    /// Document this view shows
    #[inline]
    #[must_use]
    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    /// Displayed status, if loaded
    #[inline]
    #[must_use]
    pub fn status(&self) -> Option<&WorkflowStatus> {
        self.status.as_ref()
    }

    /// Current request state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    /// Whether a request is in flight
    #[inline]
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state == RequestState::Loading
    }

    /// Start a request: enter `Loading` and clear the previous outcome
    pub fn begin(&mut self) -> Ticket {
        self.generation += 1;
        self.state = RequestState::Loading;
        Ticket(self.generation)
    }

    fn is_current(&self, ticket: Ticket) -> bool {
        ticket.0 == self.generation
    }

    /// Complete successfully without new data
    ///
    /// Returns `false` if the ticket was superseded.
    pub fn succeed(&mut self, ticket: Ticket) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(document_id = %self.document_id, "stale success ignored");
            return false;
        }
        self.state = RequestState::Success;
        true
    }

    /// Complete successfully with a freshly fetched status
    ///
    /// Returns `false` if the ticket was superseded.
    pub fn succeed_with(&mut self, ticket: Ticket, status: WorkflowStatus) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(document_id = %self.document_id, "stale status ignored");
            return false;
        }
        self.status = Some(status);
        self.state = RequestState::Success;
        true
    }

    /// Complete with a failure; the displayed status is kept as is
    ///
    /// Returns `false` if the ticket was superseded.
    pub fn fail(&mut self, ticket: Ticket, error: &ApiError) -> bool {
        if !self.is_current(ticket) {
            tracing::debug!(document_id = %self.document_id, "stale failure ignored");
            return false;
        }
        self.state = RequestState::Error(error.to_notification());
        true
    }

    /// Abandon a request without an outcome; the displayed status is kept
    ///
    /// Returns `false` if the ticket was superseded.
    pub fn cancel(&mut self, ticket: Ticket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.state = RequestState::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusId;

    fn status(current: i64) -> WorkflowStatus {
        WorkflowStatus {
            document_id: DocumentId(7),
            circuit_id: None,
            current_step_id: None,
            current_status_id: Some(StatusId(current)),
            current_step_title: None,
            current_status_title: None,
            available_statuses: Vec::new(),
            available_actions: Vec::new(),
            can_advance: true,
            can_return: false,
            is_circuit_completed: false,
        }
    }

    #[test]
    fn begin_clears_previous_error() {
        let mut view = WorkflowView::new(DocumentId(7));
        assert_eq!(view.state(), &RequestState::Idle);

        let t = view.begin();
        assert!(view.fail(t, &ApiError::Conflict("busy".into())));
        assert!(matches!(view.state(), RequestState::Error(_)));

        view.begin();
        assert!(view.is_loading());
    }

    #[test]
    fn failure_keeps_displayed_status() {
        let mut view = WorkflowView::new(DocumentId(7));
        let t = view.begin();
        view.succeed_with(t, status(2));

        let t = view.begin();
        view.fail(t, &ApiError::Conflict("HTTP 409".into()));

        assert_eq!(view.status(), Some(&status(2)));
        match view.state() {
            RequestState::Error(n) => assert_eq!(n.title, "Conflicting change"),
            other => panic!("expected error state, got {other:?}"),
        }
    }

    #[test]
    fn superseded_ticket_is_ignored() {
        let mut view = WorkflowView::new(DocumentId(7));
        let first = view.begin();
        let second = view.begin();

        assert!(view.succeed_with(second, status(3)));
        assert!(!view.succeed_with(first, status(1)));
        assert!(!view.fail(first, &ApiError::Network("late".into())));

        assert_eq!(view.status(), Some(&status(3)));
        assert_eq!(view.state(), &RequestState::Success);
    }

    #[test]
    fn cancelled_request_leaves_loading() {
        let mut view = WorkflowView::new(DocumentId(7));
        let t = view.begin();
        view.succeed_with(t, status(4));

        let t = view.begin();
        assert!(view.cancel(t));

        assert!(!view.is_loading());
        assert_eq!(view.state(), &RequestState::Idle);
        assert_eq!(view.status().and_then(|s| s.current_status_id), Some(StatusId(4)));
    }

    #[test]
    fn cancelling_superseded_ticket_keeps_newer_request() {
        let mut view = WorkflowView::new(DocumentId(7));
        let first = view.begin();
        let _second = view.begin();

        assert!(!view.cancel(first));
        assert!(view.is_loading());
    }
}
