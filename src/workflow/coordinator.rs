//! Brew coordinator
//!
//! Drives one run through the protocol:
//!
//! 1. Heat water under the master scope while gathering durable supplies.
//! 2. Prepare the cup in a child scope; a prerequisites gate releases the
//!    tea bag and sugar steps, which run in any order.
//! 3. When the cup is dropped, drain every task of that child scope, reset
//!    the bench and retry once in a fresh child scope with a fresh gate.
//! 4. Wait for hot water, then pour, stir, add milk and stir again.
//!
//! A cancelled assembly attempt is the only recoverable failure. Anything
//! else faults the run.

use super::disruption::{AfterDelay, Disruption};
use super::report::BrewReport;
use super::state::{WorkflowFault, WorkflowState};
use crate::clock::Stopwatch;
use crate::config::BrewConfig;
use crate::error::{Error, Result};
use crate::kitchen::{Kitchen, KitchenSnapshot};
use crate::sync::{CancelCause, CancelScope, CompletionGate, GateOutcome, TaskGroup};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// How an assembly attempt ended.
#[derive(Debug)]
enum AssemblyOutcome {
    Completed,
    /// The attempt's own scope was cancelled; all of its tasks are drained
    Cancelled(CancelCause),
}

pub struct WorkflowCoordinator {
    run_id: Uuid,
    clock: Stopwatch,
    kitchen: Kitchen,
    master: CancelScope,
    disruption: Option<Arc<dyn Disruption>>,
    state: WorkflowState,
    history: Vec<WorkflowState>,
}

impl WorkflowCoordinator {
    /// Coordinator whose first assembly attempt is disrupted
    /// `assembly_drop_after` steps after it starts.
    pub fn new(config: &BrewConfig) -> Self {
        let clock = Stopwatch::start();
        let disruption = AfterDelay::new(config.steps(config.assembly_drop_after), "dropped the cup");
        Self {
            run_id: Uuid::new_v4(),
            clock,
            kitchen: Kitchen::new(config, clock),
            master: CancelScope::root("master"),
            disruption: Some(Arc::new(disruption)),
            state: WorkflowState::Init,
            history: vec![WorkflowState::Init],
        }
    }

    /// Nest the master scope under `parent`, so cancelling `parent` cancels
    /// the whole run.
    pub fn within(mut self, parent: &CancelScope) -> Self {
        self.master = parent.child("master");
        self
    }

    pub fn with_disruption(mut self, disruption: Arc<dyn Disruption>) -> Self {
        self.disruption = Some(disruption);
        self
    }

    pub fn without_disruption(mut self) -> Self {
        self.disruption = None;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Handle to the scope covering the whole run.
    pub fn master_scope(&self) -> CancelScope {
        self.master.clone()
    }

    /// Stopwatch stamping this run's log events.
    pub fn clock(&self) -> Stopwatch {
        self.clock
    }

    pub fn kitchen(&self) -> &Kitchen {
        &self.kitchen
    }

    pub fn state(&self) -> WorkflowState {
        self.state
    }

    /// Run the brew to `Done`, or report the state it faulted in.
    pub async fn run(mut self) -> std::result::Result<BrewReport, WorkflowFault> {
        let span = info_span!("brew", run_id = %self.run_id);
        async move {
            match self.execute().await {
                Ok(report) => Ok(report),
                Err(error) => Err(self.fault(error)),
            }
        }
        .instrument(span)
        .await
    }

    fn transition(&mut self, next: WorkflowState) {
        info!(
            origin = "workflow",
            at = %self.clock.elapsed(),
            from = %self.state,
            to = %next,
            "State transition"
        );
        self.state = next;
        self.history.push(next);
    }

    fn fault(&mut self, error: Error) -> WorkflowFault {
        let state = self.state;
        self.transition(WorkflowState::Faulted);
        error!(origin = "workflow", at = %self.clock.elapsed(), state = %state, "Workflow faulted: {error}");
        // Stop heating and anything else still running under master
        self.master.cancel(format!("workflow faulted in {state}"));
        WorkflowFault {
            state,
            error,
            snapshot: self.kitchen.snapshot(),
        }
    }

    async fn execute(&mut self) -> Result<BrewReport> {
        let started_at = Utc::now();

        self.transition(WorkflowState::DurablesAndHeatingInFlight);
        let hot_water = CompletionGate::new("hot-water");
        let heating = tokio::spawn(
            Arc::clone(&self.kitchen.kettle).prepare_ready(hot_water.clone(), self.master.clone()),
        );
        self.kitchen.durables.ensure_all(&self.master).await?;
        let after_durables = self.kitchen.snapshot();

        self.transition(WorkflowState::AssemblyGroupActive);
        let mut assembly_attempts = 1;
        let mut after_reset: Option<KitchenSnapshot> = None;

        let disruption = self.disruption.clone();
        if let AssemblyOutcome::Cancelled(cause) = self.assemble(1, disruption).await? {
            info!(origin = "workflow", at = %self.clock.elapsed(), cause = %cause, "Assembly group drained");
            self.kitchen.bench.reset();
            after_reset = Some(self.kitchen.snapshot());

            info!(
                origin = "workflow",
                at = %self.clock.elapsed(),
                "Restarting cup preparation (reusing milk/sugar/tea jars)."
            );
            self.transition(WorkflowState::AssemblyGroupRetrying);
            assembly_attempts += 1;
            if let AssemblyOutcome::Cancelled(cause) = self.assemble(2, None).await? {
                return Err(Error::Cancelled(cause));
            }
        }

        self.transition(WorkflowState::AssemblyComplete);
        info!(origin = "workflow", at = %self.clock.elapsed(), "Cup prepared with tea bag and sugar.");

        self.finish(&hot_water).await?;
        heating.await.map_err(|e| Error::TaskPanicked {
            task: "prepare hot water".to_string(),
            reason: e.to_string(),
        })?;

        self.transition(WorkflowState::Done);
        let report = BrewReport {
            run_id: self.run_id,
            started_at,
            finished_at: Utc::now(),
            assembly_attempts,
            history: self.history.clone(),
            after_durables,
            after_reset,
            final_state: self.kitchen.snapshot(),
        };
        info!(origin = "workflow", at = %self.clock.elapsed(), "{}", report.summary());
        Ok(report)
    }

    /// One assembly attempt in its own child scope.
    ///
    /// Returns only after every task spawned under the attempt's scope has
    /// reached a terminal state.
    async fn assemble(
        &mut self,
        attempt: u32,
        disruption: Option<Arc<dyn Disruption>>,
    ) -> Result<AssemblyOutcome> {
        let scope = self.master.child(format!("assembly-{attempt}"));
        let prereqs = CompletionGate::new(format!("cup-prereqs-{attempt}"));
        let mut group = TaskGroup::new(scope.clone());

        let bench = Arc::clone(&self.kitchen.bench);
        group.spawn(
            "prepare cup",
            bench.prepare_prerequisites(prereqs.clone(), scope.clone()),
        );

        let trigger = disruption.map(|disruption| {
            let scope = scope.clone();
            let clock = self.clock;
            tokio::spawn(async move {
                tokio::select! {
                    _ = scope.cancelled() => {}
                    _ = disruption.strike() => {
                        let reason = disruption.reason();
                        error!(origin = "workflow", at = %clock.elapsed(), "Oops. {reason}. Cancelling cup preparation");
                        scope.cancel(reason);
                    }
                }
            })
        });

        match prereqs.outcome().await {
            GateOutcome::Success(()) => {
                debug!(origin = "workflow", at = %self.clock.elapsed(), "Cup prerequisites ready");
                let bench = Arc::clone(&self.kitchen.bench);
                let tea_scope = scope.clone();
                group.spawn("place tea bag", async move {
                    bench.add_primary_additive(&tea_scope).await
                });
                let bench = Arc::clone(&self.kitchen.bench);
                let sugar_scope = scope.clone();
                group.spawn("scoop sugar", async move {
                    bench.add_secondary_additive(&sugar_scope).await
                });
            }
            GateOutcome::Cancelled(cause) => {
                debug!(origin = "workflow", at = %self.clock.elapsed(), cause = %cause, "Cup prerequisites cancelled");
            }
            GateOutcome::Failed(error) => {
                scope.cancel("cup preparation failed");
                group.drain().await;
                if let Some(trigger) = trigger {
                    trigger.abort();
                }
                return Err(error);
            }
        }

        // An armed disruption is always waited for, unless a task fails first
        let clock = self.clock;
        let disrupted = async move {
            if let Some(trigger) = trigger {
                if let Err(e) = trigger.await {
                    warn!(origin = "workflow", at = %clock.elapsed(), "Disruption trigger ended abnormally: {e}");
                }
            }
        };
        let mut report = group.settle_until(disrupted).await;

        if !report.has_failures() && self.recoverable_cancellation(&scope).is_some() {
            self.transition(WorkflowState::AssemblyCancelledDraining);
        }
        group.drain_into(&mut report).await;
        debug!(
            origin = "workflow",
            at = %self.clock.elapsed(),
            completed = report.completed.len(),
            cancelled = report.cancelled.len(),
            failed = report.failures.len(),
            "Assembly attempt {attempt} drained"
        );

        if let Some((task, error)) = report.failures.into_iter().next() {
            warn!(origin = "workflow", at = %self.clock.elapsed(), task = %task, "Assembly task failed");
            return Err(error);
        }

        match scope.cause() {
            None => Ok(AssemblyOutcome::Completed),
            Some(cause) => match self.recoverable_cancellation(&scope) {
                Some(own) => Ok(AssemblyOutcome::Cancelled(own)),
                None => Err(Error::Cancelled(cause)),
            },
        }
    }

    /// The cause of `scope`'s cancellation when `cancel` was called on the
    /// attempt's scope itself and the run as a whole is still live. A
    /// cancellation inherited from master or above is not recoverable.
    fn recoverable_cancellation(&self, scope: &CancelScope) -> Option<CancelCause> {
        if self.master.is_cancelled() {
            return None;
        }
        scope.cause().filter(|cause| cause.scope == scope.name())
    }

    /// Strictly ordered finishing steps, each re-validating its own
    /// preconditions.
    async fn finish(&mut self, hot_water: &CompletionGate<()>) -> Result<()> {
        self.transition(WorkflowState::Finishing);
        hot_water.wait().await?;
        info!(origin = "workflow", at = %self.clock.elapsed(), "Hot water ready. Pouring into cup");

        let bench = Arc::clone(&self.kitchen.bench);
        bench.pour_liquid(&self.master).await?;
        bench.stir(&self.master, "first stir").await?;
        bench.add_poured_additive(&self.master).await?;
        bench.stir(&self.master, "second stir").await?;

        info!(origin = "workflow", at = %self.clock.elapsed(), "Done.");
        Ok(())
    }
}
