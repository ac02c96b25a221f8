//! The three demonstration scenarios run by the binary
//!
//! 1. Cancel the synchronous kettle fill part-way through.
//! 2. Cancel a batch of concurrent gathers.
//! 3. The full brew with a dropped cup, reset and retry.

use crate::clock::Stopwatch;
use crate::config::BrewConfig;
use crate::kitchen::{Kitchen, ResourceKind};
use crate::sync::{CancelScope, CompletionGate, OutcomeKind, TaskGroup};
use crate::workflow::{BrewReport, WorkflowCoordinator, WorkflowFault};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FillScenarioReport {
    pub filled: bool,
    /// How the hot-water gate was resolved
    pub hot_water: OutcomeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatherScenarioReport {
    pub outcome: OutcomeKind,
    pub cup: bool,
    pub spoon: bool,
    pub milk: bool,
    pub tea_bags: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioSummary {
    pub fill: FillScenarioReport,
    pub gather: GatherScenarioReport,
    pub brew: BrewReport,
}

/// Start preparing hot water and cancel it `sync_cancel_after` steps in,
/// while the kettle is still being filled.
pub async fn cancel_synchronous_fill(config: &BrewConfig, parent: &CancelScope) -> FillScenarioReport {
    let clock = Stopwatch::start();
    info!(origin = "scenario", at = %clock.elapsed(), "Example 1: Cancel synchronous work (Fill kettle)");

    let kitchen = Kitchen::new(config, clock);
    let scope = parent.child("fill");
    let hot_water = CompletionGate::new("hot-water");
    let heating = tokio::spawn(
        Arc::clone(&kitchen.kettle).prepare_ready(hot_water.clone(), scope.clone()),
    );

    tokio::time::sleep(config.steps(config.sync_cancel_after)).await;
    error!(origin = "scenario", at = %clock.elapsed(), "Oops. Power outage. Cancelling fill kettle work");
    scope.cancel("power outage");

    let outcome = hot_water.outcome().await;
    if let Err(e) = heating.await {
        warn!(origin = "scenario", at = %clock.elapsed(), "Hot water task ended abnormally: {e}");
    }

    let report = FillScenarioReport {
        filled: kitchen.kettle.is_filled(),
        hot_water: outcome.kind(),
    };
    info!(
        origin = "scenario",
        at = %clock.elapsed(),
        "Kettle filled: {} (hot water {})",
        report.filled,
        report.hot_water
    );
    report
}

/// Gather cup, spoon, milk and tea bags concurrently and cancel whatever is
/// still in flight after `cancel_after`.
pub async fn cancel_concurrent_gather(
    config: &BrewConfig,
    parent: &CancelScope,
    cancel_after: Duration,
) -> GatherScenarioReport {
    let clock = Stopwatch::start();
    info!(origin = "scenario", at = %clock.elapsed(), "Example 2: Cancel asynchronous gathers (cup, spoon, milk, tea)");

    let kitchen = Kitchen::new(config, clock);
    let scope = parent.child("gather");
    let mut group = TaskGroup::new(scope.clone());

    let bench = Arc::clone(&kitchen.bench);
    let cup_scope = scope.clone();
    group.spawn("gather cup", async move { bench.acquire_container(&cup_scope).await });
    let bench = Arc::clone(&kitchen.bench);
    let spoon_scope = scope.clone();
    group.spawn("gather spoon", async move { bench.acquire_utensil(&spoon_scope).await });
    for kind in [ResourceKind::Milk, ResourceKind::TeaBags] {
        let durables = Arc::clone(&kitchen.durables);
        let scope = scope.clone();
        group.spawn(format!("gather {kind}"), async move {
            durables.acquire(kind, &scope).await
        });
    }

    tokio::time::sleep(cancel_after).await;
    error!(origin = "scenario", at = %clock.elapsed(), "Oops. Called away. Cancelling any remaining gather work");
    scope.cancel("called away");

    let drained = group.drain().await;
    let outcome = if !drained.failures.is_empty() {
        OutcomeKind::Failed
    } else if drained.was_cancelled() {
        error!(origin = "scenario", at = %clock.elapsed(), "Gathering cancelled.");
        OutcomeKind::Cancelled
    } else {
        info!(origin = "scenario", at = %clock.elapsed(), "All gathers complete.");
        OutcomeKind::Success
    };

    let bench = kitchen.bench.snapshot();
    let report = GatherScenarioReport {
        outcome,
        cup: bench.cup,
        spoon: bench.spoon,
        milk: kitchen.durables.is_ready(ResourceKind::Milk),
        tea_bags: kitchen.durables.is_ready(ResourceKind::TeaBags),
    };
    info!(
        origin = "scenario",
        at = %clock.elapsed(),
        "State => Cup:{}, Spoon:{}, Milk:{}, TeaBags:{}",
        report.cup,
        report.spoon,
        report.milk,
        report.tea_bags
    );
    report
}

/// The full brew with a dropped cup and a single retry.
pub async fn brew_with_drop_and_restart(
    config: &BrewConfig,
    parent: &CancelScope,
) -> Result<BrewReport, WorkflowFault> {
    let coordinator = WorkflowCoordinator::new(config).within(parent);
    info!(
        origin = "scenario",
        at = %coordinator.clock().elapsed(),
        "Example 3: Orchestrated tea with gates, group cancellation and restart"
    );
    coordinator.run().await
}

/// Run all three scenarios in order.
pub async fn run_all(config: &BrewConfig, parent: &CancelScope) -> Result<ScenarioSummary, WorkflowFault> {
    let clock = Stopwatch::start();
    let fill = cancel_synchronous_fill(config, parent).await;
    let gather =
        cancel_concurrent_gather(config, parent, config.steps(config.gather_cancel_after)).await;
    let brew = brew_with_drop_and_restart(config, parent).await?;
    info!(origin = "scenario", at = %clock.elapsed(), "All examples finished.");
    Ok(ScenarioSummary { fill, gather, brew })
}
