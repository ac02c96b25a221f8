//! # Teaflow
//!
//! Cooperative cancellation and completion gates, shown by making a cup of
//! tea: gather supplies and boil the kettle concurrently, prepare the cup in
//! a cancellable group, survive a dropped cup by draining, resetting and
//! retrying only the cup, then finish in strict order.
//!
//! ## Modules
//!
//! - `sync` - cancellation scopes, completion gates and task groups
//! - `kitchen` - durable supplies, the kettle and the bench
//! - `workflow` - the coordinator that drives a brew
//! - `scenarios` - the demonstrations run by the binary
//! - `config` - pacing and fault configuration
//! - `testing` - helpers for tests
pub mod clock;
pub mod config;
pub mod error;
pub mod kitchen;
pub mod scenarios;
pub mod sync;
pub mod workflow;

pub mod testing;

pub use config::BrewConfig;
pub use error::{Error, Result};
