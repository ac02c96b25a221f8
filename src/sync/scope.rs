//! Hierarchical cooperative cancellation
//!
//! A [`CancelScope`] is a node in a tree of cancellation signals. Cancelling a
//! scope cancels every scope below it and nothing above or beside it. Work
//! observes cancellation at its suspension points (`sleep`, `run`) and at
//! explicit checkpoints in synchronous code.

use crate::error::{Error, Result};
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Why a scope was cancelled. Descendants inherit their ancestor's cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelCause {
    /// Name of the scope `cancel` was called on
    pub scope: String,
    pub reason: String,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope '{}' cancelled ({})", self.scope, self.reason)
    }
}

/// Handle to one node of the cancellation tree. Clones share the node.
#[derive(Clone)]
pub struct CancelScope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    name: String,
    state: watch::Sender<Option<CancelCause>>,
    children: Mutex<Vec<Weak<ScopeInner>>>,
}

impl CancelScope {
    /// Create a scope with no parent.
    pub fn root(name: impl Into<String>) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            inner: Arc::new(ScopeInner {
                name: name.into(),
                state,
                children: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Open a child scope. A child of an already-cancelled scope starts
    /// cancelled with the same cause.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let child = Self::root(name);
        {
            let mut children = self
                .inner
                .children
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            children.retain(|c| c.strong_count() > 0);
            children.push(Arc::downgrade(&child.inner));
        }
        // The registration above and the state write in `cancel_with` are
        // ordered so a concurrent cancel is seen by one side or the other.
        if let Some(cause) = self.cause() {
            child.cancel_with(cause);
        }
        child
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Request cancellation of this scope and all of its descendants.
    /// Only the first request is recorded; later ones are ignored.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.cancel_with(CancelCause {
            scope: self.inner.name.clone(),
            reason: reason.into(),
        });
    }

    fn cancel_with(&self, cause: CancelCause) {
        let first = self.inner.state.send_if_modified(|state| {
            if state.is_none() {
                *state = Some(cause.clone());
                true
            } else {
                false
            }
        });
        if !first {
            return;
        }

        debug!(scope = %self.inner.name, reason = %cause.reason, "Cancellation requested");

        let children: Vec<Arc<ScopeInner>> = self
            .inner
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for inner in children {
            CancelScope { inner }.cancel_with(cause.clone());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.state.borrow().is_some()
    }

    pub fn cause(&self) -> Option<CancelCause> {
        self.inner.state.borrow().clone()
    }

    /// Checkpoint for synchronous work: `Err(Cancelled)` once cancellation
    /// has been requested.
    pub fn checkpoint(&self) -> Result<()> {
        match self.cause() {
            Some(cause) => Err(Error::Cancelled(cause)),
            None => Ok(()),
        }
    }

    /// Resolves once this scope (or any ancestor) is cancelled.
    pub async fn cancelled(&self) -> CancelCause {
        let mut rx = self.inner.state.subscribe();
        let cause = match rx.wait_for(Option::is_some).await {
            Ok(state) => (*state).clone(),
            Err(_) => None,
        };
        match cause {
            Some(cause) => cause,
            // The sender lives as long as `self`, so the channel cannot close.
            None => std::future::pending().await,
        }
    }

    /// Simulated latency that aborts as soon as the scope is cancelled.
    pub async fn sleep(&self, duration: Duration) -> Result<()> {
        self.checkpoint()?;
        tokio::select! {
            biased;
            cause = self.cancelled() => Err(Error::Cancelled(cause)),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Drive `work` until it finishes or the scope is cancelled, whichever
    /// comes first. On cancellation `work` is dropped.
    pub async fn run<T, F>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.checkpoint()?;
        tokio::select! {
            biased;
            cause = self.cancelled() => Err(Error::Cancelled(cause)),
            result = work => result,
        }
    }

    /// Cancel this scope after `delay` unless it is cancelled earlier.
    pub fn cancel_after(&self, delay: Duration, reason: impl Into<String>) -> JoinHandle<()> {
        let scope = self.clone();
        let reason = reason.into();
        tokio::spawn(async move {
            tokio::select! {
                _ = scope.cancelled() => {}
                _ = tokio::time::sleep(delay) => scope.cancel(reason),
            }
        })
    }
}

impl fmt::Debug for CancelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("name", &self.inner.name)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_child_observes_parent_cancellation() {
        let master = CancelScope::root("master");
        let child = master.child("assembly");
        let grandchild = child.child("tea-bag");

        master.cancel("power outage");

        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
        let cause = grandchild.cause().unwrap();
        assert_eq!(cause.scope, "master");
        assert_eq!(cause.reason, "power outage");
    }

    #[test]
    fn test_child_cancellation_does_not_reach_parent_or_sibling() {
        let master = CancelScope::root("master");
        let first = master.child("assembly-1");
        let sibling = master.child("kettle");

        first.cancel("dropped the cup");

        assert!(first.is_cancelled());
        assert!(!master.is_cancelled());
        assert!(!sibling.is_cancelled());
        assert!(master.checkpoint().is_ok());
    }

    #[test]
    fn test_child_of_cancelled_scope_starts_cancelled() {
        let master = CancelScope::root("master");
        master.cancel("shutdown");

        let late = master.child("late");
        assert!(late.is_cancelled());
        assert!(matches!(late.checkpoint(), Err(Error::Cancelled(_))));
    }

    #[test]
    fn test_first_cancel_wins() {
        let scope = CancelScope::root("assembly");
        scope.cancel("first");
        scope.cancel("second");
        assert_eq!(scope.cause().unwrap().reason, "first");
    }

    #[test]
    fn test_fresh_child_after_cancelled_sibling_is_live() {
        let master = CancelScope::root("master");
        let attempt1 = master.child("assembly-1");
        attempt1.cancel("dropped");
        drop(attempt1);

        let attempt2 = master.child("assembly-2");
        assert!(!attempt2.is_cancelled());
    }

    #[tokio::test]
    async fn test_sleep_aborts_promptly_on_cancel() {
        let scope = CancelScope::root("gather");
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel("called away");
        });

        let started = Instant::now();
        let result = scope.sleep(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(Error::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_sleep_completes_without_cancel() {
        let scope = CancelScope::root("gather");
        assert!(scope.sleep(Duration::from_millis(5)).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_returns_immediately_after_cancel() {
        let scope = CancelScope::root("master");
        scope.cancel("done");
        let cause = scope.cancelled().await;
        assert_eq!(cause.reason, "done");
    }

    #[tokio::test]
    async fn test_cancel_after_fires() {
        let scope = CancelScope::root("assembly");
        let handle = scope.cancel_after(Duration::from_millis(10), "timer");
        let cause = scope.cancelled().await;
        assert_eq!(cause.reason, "timer");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_run_drops_work_on_cancel() {
        let scope = CancelScope::root("assembly");
        scope.cancel_after(Duration::from_millis(10), "timer");
        let result: Result<()> = scope
            .run(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
