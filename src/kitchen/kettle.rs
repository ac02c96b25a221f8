//! The kettle: a two-stage heating unit
//!
//! Filling is CPU-bound and runs on the blocking pool in fixed-size chunks,
//! checking for cancellation between chunks. Boiling is a sequence of
//! cancellable delays. The unit only moves forward: `Empty → Filled → Boiled`.

use crate::clock::Stopwatch;
use crate::config::BrewConfig;
use crate::error::{Error, Result};
use crate::sync::{CancelScope, CompletionGate};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatingState {
    Empty,
    Filled,
    Boiled,
}

impl HeatingState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => HeatingState::Empty,
            1 => HeatingState::Filled,
            _ => HeatingState::Boiled,
        }
    }
}

impl fmt::Display for HeatingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeatingState::Empty => write!(f, "empty"),
            HeatingState::Filled => write!(f, "filled"),
            HeatingState::Boiled => write!(f, "boiled"),
        }
    }
}

pub struct Kettle {
    state: AtomicU8,
    chunk: Duration,
    chunk_count: u32,
    boil_step: Duration,
    boil_steps: u32,
    clock: Stopwatch,
}

impl Kettle {
    pub fn new(config: &BrewConfig, clock: Stopwatch) -> Self {
        Self {
            state: AtomicU8::new(HeatingState::Empty as u8),
            chunk: config.fill_chunk(),
            chunk_count: config.fill_chunk_count(),
            boil_step: config.step_latency,
            boil_steps: config.boil_steps,
            clock,
        }
    }

    pub fn state(&self) -> HeatingState {
        HeatingState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_filled(&self) -> bool {
        self.state() != HeatingState::Empty
    }

    pub fn is_boiled(&self) -> bool {
        self.state() == HeatingState::Boiled
    }

    fn advance(&self, from: HeatingState, to: HeatingState) -> Result<()> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|actual| {
                Error::invalid_state(format!(
                    "kettle must be {from} to become {to}, but it is {}",
                    HeatingState::from_u8(actual)
                ))
            })
    }

    /// Fill the kettle on the calling thread.
    ///
    /// Works through `fill_units * chunks_per_unit` busy chunks and checks
    /// `scope` before each one, so a cancellation lands within one chunk.
    /// Must not be called from an async worker; see [`Kettle::fill`].
    pub fn fill_blocking(&self, scope: &CancelScope) -> Result<()> {
        if self.state() != HeatingState::Empty {
            return Err(Error::invalid_state(format!(
                "kettle can only be filled when empty, but it is {}",
                self.state()
            )));
        }

        info!(origin = "kettle", at = %self.clock.elapsed(), "Filling kettle (sync)");
        for _ in 0..self.chunk_count {
            scope.checkpoint()?;
            busy_wait(self.chunk);
        }

        self.advance(HeatingState::Empty, HeatingState::Filled)?;
        info!(origin = "kettle", at = %self.clock.elapsed(), "Kettle filled.");
        Ok(())
    }

    /// Run [`Kettle::fill_blocking`] on the blocking pool.
    pub async fn fill(self: &Arc<Self>, scope: &CancelScope) -> Result<()> {
        let kettle = Arc::clone(self);
        let scope = scope.clone();
        tokio::task::spawn_blocking(move || kettle.fill_blocking(&scope))
            .await
            .map_err(|e| Error::TaskPanicked {
                task: "fill kettle".to_string(),
                reason: e.to_string(),
            })?
    }

    pub async fn boil(&self, scope: &CancelScope) -> Result<()> {
        if !self.is_filled() {
            return Err(Error::invalid_state("kettle must be filled first"));
        }
        if self.is_boiled() {
            return Err(Error::invalid_state("kettle has already boiled"));
        }

        info!(origin = "kettle", at = %self.clock.elapsed(), "Boiling kettle (async)");
        for _ in 0..self.boil_steps {
            scope.sleep(self.boil_step).await?;
        }

        self.advance(HeatingState::Filled, HeatingState::Boiled)?;
        info!(origin = "kettle", at = %self.clock.elapsed(), "Kettle boiled.");
        Ok(())
    }

    /// Fill then boil, publishing the outcome into `ready`.
    ///
    /// The gate is resolved exactly once on every exit path: success,
    /// cancelled with the scope's cause, or failed with the error. The
    /// resolution guard is taken before the future is first polled, so
    /// dropping or aborting the future still fails the gate.
    pub fn prepare_ready(
        self: Arc<Self>,
        ready: CompletionGate<()>,
        scope: CancelScope,
    ) -> impl Future<Output = ()> + Send + 'static {
        let guard = ready.guard();
        async move {
            let result = async {
                self.fill(&scope).await?;
                self.boil(&scope).await
            }
            .await;

            match &result {
                Ok(()) => {}
                Err(Error::Cancelled(cause)) => {
                    error!(origin = "kettle", at = %self.clock.elapsed(), cause = %cause, "Hot water preparation cancelled.");
                }
                Err(e) => {
                    error!(origin = "kettle", at = %self.clock.elapsed(), "Hot water preparation failed: {e}");
                }
            }
            guard.settle(result);
        }
    }
}

/// Spin for `duration` to stand in for CPU-bound work.
fn busy_wait(duration: Duration) {
    let started = Instant::now();
    while started.elapsed() < duration {
        std::hint::spin_loop();
    }
}
