//! Request scope tied to a view's lifetime
//!
//! Every request issued on behalf of a view runs through its [`ViewScope`].
//! Closing the scope (or dropping it) aborts whatever is still in flight; the
//! aborted calls resolve to [`ApiError::Cancelled`] and never reach the view.

use docflow_core::{ApiError, Result};
use futures::future::{AbortHandle, Abortable};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ScopeState {
    closed: bool,
    next_id: u64,
    in_flight: HashMap<u64, AbortHandle>,
}

/// Cancellation scope for the requests of one view
#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    state: Arc<Mutex<ScopeState>>,
}

/// Deregisters a finished request
struct Registration {
    state: Arc<Mutex<ScopeState>>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.state.lock().in_flight.remove(&self.id);
    }
}

impl ViewScope {
    /// Create an open scope
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a request inside this scope
    ///
    /// # Errors
    /// The request's own error, or `ApiError::Cancelled` if the scope was
    /// closed before or while it ran
    pub async fn run<T, F>(&self, request: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let (abort, registration) = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ApiError::Cancelled);
            }
            let (handle, abort) = AbortHandle::new_pair();
            let id = state.next_id;
            state.next_id += 1;
            state.in_flight.insert(id, handle);
            (
                abort,
                Registration {
                    state: Arc::clone(&self.state),
                    id,
                },
            )
        };

        let result = Abortable::new(request, abort).await;
        drop(registration);
        result.unwrap_or(Err(ApiError::Cancelled))
    }

    /// Abort everything in flight and refuse new requests
    pub fn close(&self) {
        let handles: Vec<AbortHandle> = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.in_flight.drain().map(|(_, h)| h).collect()
        };
        if !handles.is_empty() {
            tracing::debug!(count = handles.len(), "aborting in-flight requests");
        }
        for handle in handles {
            handle.abort();
        }
    }

    /// Whether the scope has been closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of requests currently running
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }
}

/// Owns a scope and closes it when dropped
#[derive(Debug, Default)]
pub struct ScopeGuard(ViewScope);

impl ScopeGuard {
    /// Guard a fresh scope
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The guarded scope
    #[inline]
    #[must_use]
    pub fn scope(&self) -> &ViewScope {
        &self.0
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn completed_request_passes_through() {
        let scope = ViewScope::new();
        let value = scope.run(async { Ok::<_, ApiError>(7) }).await.unwrap();
        assert_eq!(value, 7);
        assert_eq!(scope.in_flight(), 0);
    }

    #[tokio::test]
    async fn errors_are_not_rewritten() {
        let scope = ViewScope::new();
        let err = scope
            .run(async { Err::<(), _>(ApiError::NotFound("doc".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, ApiError::NotFound("doc".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn close_aborts_in_flight_requests() {
        let scope = ViewScope::new();
        let running = tokio::spawn({
            let scope = scope.clone();
            async move {
                scope
                    .run(async {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        Ok::<_, ApiError>("late")
                    })
                    .await
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(scope.in_flight(), 1);
        scope.close();

        assert_eq!(running.await.unwrap(), Err(ApiError::Cancelled));
        assert_eq!(scope.in_flight(), 0);
    }

    #[test]
    fn close_wakes_pending_request() {
        let scope = ViewScope::new();
        let mut task =
            tokio_test::task::spawn(scope.run(futures::future::pending::<Result<()>>()));

        tokio_test::assert_pending!(task.poll());
        scope.close();

        assert!(task.is_woken());
        assert_eq!(tokio_test::assert_ready!(task.poll()), Err(ApiError::Cancelled));
    }

    #[tokio::test]
    async fn closed_scope_rejects_new_requests() {
        let scope = ViewScope::new();
        scope.close();
        assert!(scope.is_closed());
        let result = scope.run(async { Ok::<_, ApiError>(1) }).await;
        assert_eq!(result, Err(ApiError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_guard_closes_scope() {
        let guard = ScopeGuard::new();
        let scope = guard.scope().clone();
        drop(guard);
        assert!(scope.is_closed());
    }
}
