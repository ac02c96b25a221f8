//! Named task groups bound to one cancellation scope
//!
//! Every task spawned into a [`TaskGroup`] runs on the worker pool. `drain`
//! awaits all of them to a terminal state, which is the precondition for
//! touching state those tasks may write.

use super::scope::{CancelCause, CancelScope};
use crate::error::{Error, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tracing::{debug, warn};

pub struct TaskGroup {
    scope: CancelScope,
    tasks: JoinSet<(String, Result<()>)>,
}

/// Terminal states of every task in a drained group.
#[derive(Debug, Default)]
pub struct DrainReport {
    pub completed: Vec<String>,
    pub cancelled: Vec<(String, CancelCause)>,
    pub failures: Vec<(String, Error)>,
}

impl DrainReport {
    /// File one settled task under its terminal state.
    pub fn record(&mut self, task: String, result: Result<()>) {
        match result {
            Ok(()) => self.completed.push(task),
            Err(Error::Cancelled(cause)) => self.cancelled.push((task, cause)),
            Err(error) => self.failures.push((task, error)),
        }
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn was_cancelled(&self) -> bool {
        !self.cancelled.is_empty()
    }

    /// First failure wins; otherwise a cancellation; otherwise success.
    pub fn into_result(self) -> Result<()> {
        if let Some((_, error)) = self.failures.into_iter().next() {
            return Err(error);
        }
        if let Some((_, cause)) = self.cancelled.into_iter().next() {
            return Err(Error::Cancelled(cause));
        }
        Ok(())
    }
}

impl TaskGroup {
    pub fn new(scope: CancelScope) -> Self {
        Self {
            scope,
            tasks: JoinSet::new(),
        }
    }

    pub fn scope(&self) -> &CancelScope {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a named task. A panic inside the task is reported as
    /// [`Error::TaskPanicked`] rather than lost.
    pub fn spawn<F>(&mut self, name: impl Into<String>, task: F)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        debug!(scope = %self.scope.name(), task = %name, "Spawning task");
        self.tasks.spawn(async move {
            let result = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => Err(Error::TaskPanicked {
                    task: name.clone(),
                    reason: panic_message(panic.as_ref()),
                }),
            };
            (name, result)
        });
    }

    /// Await the next task to settle. `None` once the group is empty.
    pub async fn join_next(&mut self) -> Option<(String, Result<()>)> {
        let settled = match self.tasks.join_next().await? {
            Ok(settled) => settled,
            Err(join_error) => (
                "unknown".to_string(),
                Err(Error::TaskPanicked {
                    task: "unknown".to_string(),
                    reason: join_error.to_string(),
                }),
            ),
        };
        match &settled.1 {
            Ok(()) => {}
            Err(Error::Cancelled(_)) => {
                debug!(scope = %self.scope.name(), task = %settled.0, "Task cancelled");
            }
            Err(error) => {
                warn!(scope = %self.scope.name(), task = %settled.0, error = %error, "Task failed");
            }
        }
        Some(settled)
    }

    /// Collect tasks as they settle until `stop` resolves. The first failure
    /// cancels the group's scope and returns at once; tasks still running
    /// must be drained afterwards.
    pub async fn settle_until<F>(&mut self, stop: F) -> DrainReport
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut report = DrainReport::default();
        loop {
            tokio::select! {
                _ = &mut stop => break,
                settled = self.join_next(), if !self.tasks.is_empty() => {
                    if let Some((task, result)) = settled {
                        report.record(task, result);
                    }
                    if report.has_failures() {
                        self.scope.cancel("task failed");
                        break;
                    }
                }
            }
        }
        report
    }

    /// Await every spawned task. Cancellations are collected, never raised.
    pub async fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport::default();
        self.drain_into(&mut report).await;
        report
    }

    /// Like [`drain`](Self::drain), adding to a report already holding the
    /// tasks that settled earlier.
    pub async fn drain_into(&mut self, report: &mut DrainReport) {
        while let Some((task, result)) = self.join_next().await {
            report.record(task, result);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
