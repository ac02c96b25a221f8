//! The bench: the cup and everything in it
//!
//! Everything here is ephemeral. Dropping the cup invalidates all of it at
//! once, after which [`Bench::reset`] clears the flags so the cup can be
//! prepared again. Each flag is written by exactly one step; the workflow
//! guarantees no step is still running when `reset` is called.

use super::inventory::{DurableStore, ResourceKind};
use super::kettle::Kettle;
use crate::clock::Stopwatch;
use crate::config::BrewConfig;
use crate::error::{Error, Result};
use crate::sync::{CancelScope, CompletionGate, TaskGroup};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct Bench {
    cup: AtomicBool,
    spoon: AtomicBool,
    tea_bag: AtomicBool,
    sugar: AtomicBool,
    hot_water: AtomicBool,
    milk_poured: AtomicBool,
    stirs: AtomicU32,
    durables: Arc<DurableStore>,
    kettle: Arc<Kettle>,
    latency: Duration,
    clock: Stopwatch,
}

/// Point-in-time copy of the bench.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BenchSnapshot {
    pub cup: bool,
    pub spoon: bool,
    pub tea_bag: bool,
    pub sugar: bool,
    pub hot_water: bool,
    pub milk_poured: bool,
    pub stirs: u32,
}

impl BenchSnapshot {
    /// True when every flag that `reset` clears is false.
    pub fn is_clear(&self) -> bool {
        !(self.cup || self.spoon || self.tea_bag || self.sugar || self.hot_water || self.milk_poured)
    }

    /// Cup, spoon, tea bag and sugar are all in place.
    pub fn is_assembled(&self) -> bool {
        self.cup && self.spoon && self.tea_bag && self.sugar
    }
}

impl Bench {
    pub fn new(
        config: &BrewConfig,
        durables: Arc<DurableStore>,
        kettle: Arc<Kettle>,
        clock: Stopwatch,
    ) -> Self {
        Self {
            cup: AtomicBool::new(false),
            spoon: AtomicBool::new(false),
            tea_bag: AtomicBool::new(false),
            sugar: AtomicBool::new(false),
            hot_water: AtomicBool::new(false),
            milk_poured: AtomicBool::new(false),
            stirs: AtomicU32::new(0),
            durables,
            kettle,
            latency: config.step_latency,
            clock,
        }
    }

    pub fn snapshot(&self) -> BenchSnapshot {
        BenchSnapshot {
            cup: self.cup.load(Ordering::Acquire),
            spoon: self.spoon.load(Ordering::Acquire),
            tea_bag: self.tea_bag.load(Ordering::Acquire),
            sugar: self.sugar.load(Ordering::Acquire),
            hot_water: self.hot_water.load(Ordering::Acquire),
            milk_poured: self.milk_poured.load(Ordering::Acquire),
            stirs: self.stirs.load(Ordering::Acquire),
        }
    }

    /// Clear the cup and its contents after a drop. The stir count is left
    /// alone. Callers must have drained every task that writes to the bench.
    pub fn reset(&self) {
        for flag in [
            &self.cup,
            &self.spoon,
            &self.tea_bag,
            &self.sugar,
            &self.hot_water,
            &self.milk_poured,
        ] {
            flag.store(false, Ordering::Release);
        }
        info!(origin = "bench", at = %self.clock.elapsed(), "Bench cleared after drop.");
    }

    /// Wait one step, then commit. Nothing is committed if the scope is
    /// cancelled during the wait.
    async fn perform(
        &self,
        scope: &CancelScope,
        doing: &str,
        done: &str,
        commit: impl FnOnce(),
    ) -> Result<()> {
        info!(origin = "bench", at = %self.clock.elapsed(), "{doing} (async)");
        scope.sleep(self.latency).await?;
        commit();
        info!(origin = "bench", at = %self.clock.elapsed(), "{done}");
        Ok(())
    }

    pub async fn acquire_container(&self, scope: &CancelScope) -> Result<()> {
        self.perform(scope, "Gathering cup", "Cup gathered.", || {
            self.cup.store(true, Ordering::Release)
        })
        .await
    }

    pub async fn acquire_utensil(&self, scope: &CancelScope) -> Result<()> {
        self.perform(scope, "Gathering spoon", "Spoon gathered.", || {
            self.spoon.store(true, Ordering::Release)
        })
        .await
    }

    fn require_cup_prerequisites(&self, step: &str) -> Result<()> {
        let snapshot = self.snapshot();
        if !snapshot.cup || !snapshot.spoon || !self.durables.is_ready(ResourceKind::Milk) {
            return Err(Error::invalid_state(format!(
                "prerequisites for {step} are not satisfied (cup: {}, spoon: {}, milk: {})",
                snapshot.cup,
                snapshot.spoon,
                self.durables.is_ready(ResourceKind::Milk)
            )));
        }
        Ok(())
    }

    fn require_hot_water(&self, step: &str) -> Result<()> {
        if !self.hot_water.load(Ordering::Acquire) {
            return Err(Error::invalid_state(format!(
                "cannot {step} before hot water is in the cup"
            )));
        }
        Ok(())
    }

    /// Place the tea bag. Requires cup, spoon and milk.
    pub async fn add_primary_additive(&self, scope: &CancelScope) -> Result<()> {
        scope.checkpoint()?;
        self.require_cup_prerequisites("placing the tea bag")?;
        self.perform(scope, "Placing tea bag into cup", "Tea bag placed.", || {
            self.tea_bag.store(true, Ordering::Release)
        })
        .await
    }

    /// Scoop the sugar. Requires cup, spoon and milk.
    pub async fn add_secondary_additive(&self, scope: &CancelScope) -> Result<()> {
        scope.checkpoint()?;
        self.require_cup_prerequisites("scooping sugar")?;
        self.perform(scope, "Scooping sugar into cup", "Sugar added.", || {
            self.sugar.store(true, Ordering::Release)
        })
        .await
    }

    /// Pour the hot water. Requires a boiled kettle and a cup.
    pub async fn pour_liquid(&self, scope: &CancelScope) -> Result<()> {
        if !self.kettle.is_boiled() {
            return Err(Error::invalid_state("hot water must be ready before pouring"));
        }
        if !self.cup.load(Ordering::Acquire) {
            return Err(Error::invalid_state("cup must be ready before pouring"));
        }
        scope.checkpoint()?;
        self.perform(scope, "Pouring hot water", "Hot water poured.", || {
            self.hot_water.store(true, Ordering::Release)
        })
        .await
    }

    pub async fn stir(&self, scope: &CancelScope, label: &str) -> Result<()> {
        self.require_hot_water("stir")?;
        scope.checkpoint()?;
        self.perform(
            scope,
            &format!("Stirring ({label})"),
            &format!("Stirred ({label})."),
            || {
                self.stirs.fetch_add(1, Ordering::AcqRel);
            },
        )
        .await
    }

    /// Pour a dash of milk. Requires hot water in the cup and milk on hand.
    pub async fn add_poured_additive(&self, scope: &CancelScope) -> Result<()> {
        self.require_hot_water("add milk")?;
        scope.checkpoint()?;
        if !self.durables.is_ready(ResourceKind::Milk) {
            return Err(Error::invalid_state("milk not available"));
        }
        self.perform(scope, "Pouring a dash of milk", "Milk added.", || {
            self.milk_poured.store(true, Ordering::Release)
        })
        .await
    }

    /// Gather cup and spoon concurrently, check milk is on hand, then open
    /// `prereqs` so tea bag and sugar can start in any order.
    ///
    /// `prereqs` is resolved on every exit path, cancelled or failed when
    /// the cup cannot be prepared. Cup and spoon tasks are drained before
    /// this future completes.
    pub fn prepare_prerequisites(
        self: Arc<Self>,
        prereqs: CompletionGate<()>,
        scope: CancelScope,
    ) -> impl Future<Output = Result<()>> + Send + 'static {
        let guard = prereqs.guard();
        async move {
            info!(origin = "bench", at = %self.clock.elapsed(), "Preparing cup (async)");
            let result = async {
                let mut group = TaskGroup::new(scope.clone());
                if !self.cup.load(Ordering::Acquire) {
                    let bench = Arc::clone(&self);
                    let scope = scope.clone();
                    group.spawn("gather cup", async move { bench.acquire_container(&scope).await });
                }
                if !self.spoon.load(Ordering::Acquire) {
                    let bench = Arc::clone(&self);
                    let scope = scope.clone();
                    group.spawn("gather spoon", async move { bench.acquire_utensil(&scope).await });
                }
                group.drain().await.into_result()?;

                if !self.durables.is_ready(ResourceKind::Milk) {
                    return Err(Error::invalid_state(
                        "milk must be gathered before preparing the cup",
                    ));
                }
                Ok(())
            }
            .await;

            guard.settle(result.clone());
            result
        }
    }
}
