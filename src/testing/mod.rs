//! Testing utilities
//!
//! Shortened pacing for tests and re-exports of hand-driven test doubles.

use crate::config::BrewConfig;
use std::time::Duration;

pub use crate::workflow::ManualDisruption;

/// Default config with every step shortened to `step_ms` milliseconds.
pub fn fast_config(step_ms: u64) -> BrewConfig {
    BrewConfig::default().with_step_latency(Duration::from_millis(step_ms))
}
