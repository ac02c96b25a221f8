//! External signals that cancel an assembly attempt

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Something that happens to the cup while it is being prepared.
///
/// The coordinator arms a disruption when an assembly attempt starts and
/// cancels that attempt's scope once `strike` resolves.
#[async_trait]
pub trait Disruption: Send + Sync {
    /// Resolves when the disruption happens.
    async fn strike(&self);

    /// Reason recorded on the cancelled scope.
    fn reason(&self) -> String;
}

/// Disruption that strikes a fixed delay after it is armed.
#[derive(Debug, Clone)]
pub struct AfterDelay {
    delay: Duration,
    reason: String,
}

impl AfterDelay {
    pub fn new(delay: Duration, reason: impl Into<String>) -> Self {
        Self {
            delay,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Disruption for AfterDelay {
    async fn strike(&self) {
        tokio::time::sleep(self.delay).await;
    }

    fn reason(&self) -> String {
        self.reason.clone()
    }
}

/// Disruption fired by hand. Firing before the coordinator arms it is
/// remembered.
#[derive(Debug, Default)]
pub struct ManualDisruption {
    notify: Notify,
}

impl ManualDisruption {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fire(&self) {
        self.notify.notify_one();
    }
}

#[async_trait]
impl Disruption for ManualDisruption {
    async fn strike(&self) {
        self.notify.notified().await;
    }

    fn reason(&self) -> String {
        "dropped the cup".to_string()
    }
}
