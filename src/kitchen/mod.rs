//! Kitchen state owned by one workflow run
//!
//! - `inventory` - durable supplies that survive a dropped cup
//! - `kettle` - the two-stage heating unit
//! - `bench` - the cup and its contents, reset after a drop

pub mod bench;
pub mod inventory;
pub mod kettle;

pub use bench::{Bench, BenchSnapshot};
pub use inventory::{DurableSnapshot, DurableStore, ResourceKind};
pub use kettle::{HeatingState, Kettle};

use crate::clock::Stopwatch;
use crate::config::BrewConfig;
use serde::Serialize;
use std::sync::Arc;

/// The per-run instances of every kitchen component, wired together.
#[derive(Clone)]
pub struct Kitchen {
    pub durables: Arc<DurableStore>,
    pub kettle: Arc<Kettle>,
    pub bench: Arc<Bench>,
}

/// Point-in-time copy of the whole kitchen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KitchenSnapshot {
    pub kettle: HeatingState,
    pub durables: DurableSnapshot,
    pub bench: BenchSnapshot,
}

impl Kitchen {
    pub fn new(config: &BrewConfig, clock: Stopwatch) -> Self {
        let durables = Arc::new(DurableStore::new(config, clock));
        let kettle = Arc::new(Kettle::new(config, clock));
        let bench = Arc::new(Bench::new(
            config,
            Arc::clone(&durables),
            Arc::clone(&kettle),
            clock,
        ));
        Self {
            durables,
            kettle,
            bench,
        }
    }

    pub fn snapshot(&self) -> KitchenSnapshot {
        KitchenSnapshot {
            kettle: self.kettle.state(),
            durables: self.durables.snapshot(),
            bench: self.bench.snapshot(),
        }
    }
}
