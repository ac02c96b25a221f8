use crate::error::Error;
use crate::kitchen::KitchenSnapshot;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Phases of one brew, in protocol order. `Faulted` is reachable from any
/// phase on an unrecoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Init,
    DurablesAndHeatingInFlight,
    AssemblyGroupActive,
    AssemblyCancelledDraining,
    AssemblyGroupRetrying,
    AssemblyComplete,
    Finishing,
    Done,
    Faulted,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Done | WorkflowState::Faulted)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkflowState::Init => "init",
            WorkflowState::DurablesAndHeatingInFlight => "durables-and-heating-in-flight",
            WorkflowState::AssemblyGroupActive => "assembly-group-active",
            WorkflowState::AssemblyCancelledDraining => "assembly-cancelled-draining",
            WorkflowState::AssemblyGroupRetrying => "assembly-group-retrying",
            WorkflowState::AssemblyComplete => "assembly-complete",
            WorkflowState::Finishing => "finishing",
            WorkflowState::Done => "done",
            WorkflowState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// An unrecoverable error, tagged with the phase it happened in.
#[derive(Debug, Error)]
#[error("Workflow faulted in state {state}: {error}")]
pub struct WorkflowFault {
    pub state: WorkflowState,
    #[source]
    pub error: Error,
    /// Kitchen state when the fault was raised
    pub snapshot: KitchenSnapshot,
}
