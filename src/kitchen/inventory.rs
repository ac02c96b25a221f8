//! Durable supplies
//!
//! Milk, tea bags and the sugar jar are gathered once per run and survive a
//! dropped cup. A ready flag never goes back to false.

use crate::clock::Stopwatch;
use crate::config::BrewConfig;
use crate::error::{Error, Result};
use crate::sync::{CancelScope, TaskGroup};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Milk,
    TeaBags,
    SugarJar,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Milk,
        ResourceKind::TeaBags,
        ResourceKind::SugarJar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Milk => "milk",
            ResourceKind::TeaBags => "tea bags",
            ResourceKind::SugarJar => "sugar jar",
        }
    }

    fn index(self) -> usize {
        match self {
            ResourceKind::Milk => 0,
            ResourceKind::TeaBags => 1,
            ResourceKind::SugarJar => 2,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Default)]
struct Slot {
    ready: AtomicBool,
    /// Completed acquisition delays, for idempotence checks
    acquisitions: AtomicU32,
}

/// Readiness flags for the durable supplies of one run.
///
/// Each flag has a single writer: the acquisition task for that kind.
pub struct DurableStore {
    slots: [Slot; 3],
    latency: Duration,
    unavailable: Vec<ResourceKind>,
    clock: Stopwatch,
}

/// Point-in-time copy of the durable flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DurableSnapshot {
    pub milk: bool,
    pub tea_bags: bool,
    pub sugar_jar: bool,
}

impl DurableSnapshot {
    pub fn all_ready(&self) -> bool {
        self.milk && self.tea_bags && self.sugar_jar
    }
}

impl DurableStore {
    pub fn new(config: &BrewConfig, clock: Stopwatch) -> Self {
        Self {
            slots: Default::default(),
            latency: config.step_latency,
            unavailable: config.unavailable.clone(),
            clock,
        }
    }

    pub fn is_ready(&self, kind: ResourceKind) -> bool {
        self.slots[kind.index()].ready.load(Ordering::Acquire)
    }

    /// Number of acquisition delays that ran to completion for `kind`.
    pub fn acquisitions(&self, kind: ResourceKind) -> u32 {
        self.slots[kind.index()].acquisitions.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> DurableSnapshot {
        DurableSnapshot {
            milk: self.is_ready(ResourceKind::Milk),
            tea_bags: self.is_ready(ResourceKind::TeaBags),
            sugar_jar: self.is_ready(ResourceKind::SugarJar),
        }
    }

    /// Gather one resource. No-op if it is already on the bench; a
    /// cancellation during the delay leaves the flag false.
    pub async fn acquire(&self, kind: ResourceKind, scope: &CancelScope) -> Result<()> {
        if self.is_ready(kind) {
            return Ok(());
        }

        info!(origin = "inventory", at = %self.clock.elapsed(), "Gathering {kind} (async)");
        scope.sleep(self.latency).await?;

        if self.unavailable.contains(&kind) {
            warn!(origin = "inventory", at = %self.clock.elapsed(), "Ran out of {kind}");
            return Err(Error::Acquisition {
                resource: kind.to_string(),
                reason: "none left in the pantry".to_string(),
            });
        }

        let slot = &self.slots[kind.index()];
        slot.acquisitions.fetch_add(1, Ordering::AcqRel);
        slot.ready.store(true, Ordering::Release);
        info!(origin = "inventory", at = %self.clock.elapsed(), "Gathered {kind}.");
        Ok(())
    }

    /// Gather every resource that is not yet ready, concurrently.
    ///
    /// Returns once every acquisition has finished. If any was cancelled the
    /// result is `Cancelled`; resources gathered before the cancellation stay
    /// ready, and a later call only retries the missing ones.
    pub async fn ensure_all(self: &Arc<Self>, scope: &CancelScope) -> Result<()> {
        let mut group = TaskGroup::new(scope.clone());
        for kind in ResourceKind::ALL {
            if self.is_ready(kind) {
                continue;
            }
            let store = Arc::clone(self);
            let scope = scope.clone();
            group.spawn(format!("gather {kind}"), async move {
                store.acquire(kind, &scope).await
            });
        }

        group.drain().await.into_result()?;
        info!(origin = "inventory", at = %self.clock.elapsed(), "Durables on bench (milk/tea/sugar).");
        Ok(())
    }
}
