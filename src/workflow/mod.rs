//! Brew workflow orchestration
//!
//! - `coordinator` - the protocol driver
//! - `disruption` - external signals that cancel an assembly attempt
//! - `state` - protocol phases and the fault type
//! - `report` - what a completed run hands back

pub mod coordinator;
pub mod disruption;
pub mod report;
pub mod state;

#[cfg(test)]
mod coordinator_tests;

pub use coordinator::WorkflowCoordinator;
pub use disruption::{AfterDelay, Disruption, ManualDisruption};
pub use report::BrewReport;
pub use state::{WorkflowFault, WorkflowState};
