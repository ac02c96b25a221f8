//! Single-shot, multi-reader completion gates
//!
//! A [`CompletionGate`] publishes readiness from one task to any number of
//! waiters. The first resolution wins; later attempts are ignored. Waiters
//! suspend on a watch channel, so nothing polls.

use super::scope::CancelCause;
use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Terminal state of a gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome<T> {
    Success(T),
    Cancelled(CancelCause),
    Failed(Error),
}

/// Outcome without its payload, for reports and branching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    Cancelled,
    Failed,
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeKind::Success => write!(f, "success"),
            OutcomeKind::Cancelled => write!(f, "cancelled"),
            OutcomeKind::Failed => write!(f, "failed"),
        }
    }
}

impl<T> GateOutcome<T> {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            GateOutcome::Success(_) => OutcomeKind::Success,
            GateOutcome::Cancelled(_) => OutcomeKind::Cancelled,
            GateOutcome::Failed(_) => OutcomeKind::Failed,
        }
    }

    /// Map a publisher's result onto a gate outcome. A `Cancelled` error
    /// becomes a cancelled outcome; every other error is a failure.
    pub fn from_result(result: Result<T>) -> Self {
        match result {
            Ok(value) => GateOutcome::Success(value),
            Err(Error::Cancelled(cause)) => GateOutcome::Cancelled(cause),
            Err(e) => GateOutcome::Failed(e),
        }
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            GateOutcome::Success(value) => Ok(value),
            GateOutcome::Cancelled(cause) => Err(Error::Cancelled(cause)),
            GateOutcome::Failed(e) => Err(e),
        }
    }
}

/// Single-shot cell broadcasting one [`GateOutcome`] to every waiter.
///
/// Clones share the same cell. Allocate a fresh gate for every
/// synchronization point; a resolved gate is never reset.
pub struct CompletionGate<T> {
    inner: Arc<GateInner<T>>,
}

struct GateInner<T> {
    name: String,
    state: watch::Sender<Option<GateOutcome<T>>>,
}

impl<T> Clone for CompletionGate<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> CompletionGate<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(GateInner {
                name: name.into(),
                state,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Resolve the gate if it is still unset. Returns whether this call
    /// was the one that resolved it.
    pub fn resolve(&self, outcome: GateOutcome<T>) -> bool {
        let kind = outcome.kind();
        let mut outcome = Some(outcome);
        let resolved = self.inner.state.send_if_modified(|state| {
            if state.is_none() {
                *state = outcome.take();
                true
            } else {
                false
            }
        });
        if resolved {
            debug!(gate = %self.inner.name, outcome = %kind, "Gate resolved");
        }
        resolved
    }

    pub fn succeed(&self, value: T) -> bool {
        self.resolve(GateOutcome::Success(value))
    }

    pub fn cancel(&self, cause: CancelCause) -> bool {
        self.resolve(GateOutcome::Cancelled(cause))
    }

    pub fn fail(&self, error: Error) -> bool {
        self.resolve(GateOutcome::Failed(error))
    }

    /// Resolve from a publisher's result, see [`GateOutcome::from_result`].
    pub fn settle(&self, result: Result<T>) -> bool {
        self.resolve(GateOutcome::from_result(result))
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    /// Current outcome without waiting.
    pub fn peek(&self) -> Option<GateOutcome<T>> {
        self.inner.state.borrow().clone()
    }

    /// Suspend until the gate is resolved and return its outcome.
    pub async fn outcome(&self) -> GateOutcome<T> {
        let mut rx = self.inner.state.subscribe();
        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).clone(),
            Err(_) => None,
        };
        match outcome {
            Some(outcome) => outcome,
            // `self` keeps the sender alive
            None => std::future::pending().await,
        }
    }

    /// Suspend until resolved; success yields the value, cancellation and
    /// failure yield the matching error.
    pub async fn wait(&self) -> Result<T> {
        self.outcome().await.into_result()
    }

    /// Publisher guard that fails the gate with [`Error::Abandoned`] if it
    /// is dropped before anything resolved the gate.
    pub fn guard(&self) -> GateGuard<T> {
        GateGuard { gate: self.clone() }
    }
}

impl<T> fmt::Debug for CompletionGate<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionGate")
            .field("name", &self.inner.name)
            .field("resolved", &self.inner.state.borrow().is_some())
            .finish()
    }
}

/// Resolution obligation held by a gate's publisher.
pub struct GateGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    gate: CompletionGate<T>,
}

impl<T> GateGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn settle(self, result: Result<T>) -> bool {
        self.gate.settle(result)
    }
}

impl<T> Drop for GateGuard<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let name = self.gate.name().to_string();
        if self.gate.fail(Error::Abandoned(name.clone())) {
            warn!(gate = %name, "Gate publisher exited without resolving the gate");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::time::Duration;

    fn cause(reason: &str) -> CancelCause {
        CancelCause {
            scope: "test".to_string(),
            reason: reason.to_string(),
        }
    }

    #[test]
    fn test_first_resolution_wins() {
        let gate = CompletionGate::new("hot-water");
        assert!(gate.succeed(true));
        assert!(!gate.cancel(cause("late")));
        assert!(!gate.fail(Error::invalid_state("late")));
        assert_eq!(gate.peek(), Some(GateOutcome::Success(true)));
    }

    #[tokio::test]
    async fn test_success_then_cancel_readers_observe_success() {
        let gate = CompletionGate::new("hot-water");
        gate.succeed(());
        gate.cancel(cause("too late"));
        assert!(gate.wait().await.is_ok());
        assert_eq!(gate.outcome().await.kind(), OutcomeKind::Success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_all_waiters_observe_same_outcome() {
        let gate: CompletionGate<u32> = CompletionGate::new("prereqs");
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.outcome().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.succeed(7);

        for outcome in join_all(waiters).await {
            assert_eq!(outcome.unwrap(), GateOutcome::Success(7));
        }
    }

    #[tokio::test]
    async fn test_waiter_suspends_until_resolved() {
        let gate: CompletionGate<()> = CompletionGate::new("prereqs");
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.cancel(cause("dropped the cup"));
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled(c)) if c.reason == "dropped the cup"));
    }

    #[tokio::test]
    async fn test_failed_outcome_surfaces_error() {
        let gate: CompletionGate<()> = CompletionGate::new("hot-water");
        gate.fail(Error::invalid_state("kettle must be filled first"));
        let err = gate.wait().await.unwrap_err();
        assert_eq!(err, Error::invalid_state("kettle must be filled first"));
    }

    #[test]
    fn test_settle_maps_cancellation() {
        let gate: CompletionGate<()> = CompletionGate::new("hot-water");
        gate.settle(Err(Error::Cancelled(cause("outage"))));
        assert_eq!(gate.peek().unwrap().kind(), OutcomeKind::Cancelled);
    }

    #[test]
    fn test_dropped_guard_fails_gate() {
        let gate: CompletionGate<()> = CompletionGate::new("hot-water");
        drop(gate.guard());
        assert_eq!(
            gate.peek(),
            Some(GateOutcome::Failed(Error::Abandoned("hot-water".to_string())))
        );
    }

    #[test]
    fn test_settled_guard_keeps_outcome() {
        let gate: CompletionGate<()> = CompletionGate::new("hot-water");
        let guard = gate.guard();
        assert!(guard.settle(Ok(())));
        assert_eq!(gate.peek(), Some(GateOutcome::Success(())));
    }
}
