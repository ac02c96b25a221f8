//! Coordination primitives: cancellation scopes, completion gates and task
//! groups.

pub mod gate;
pub mod group;
pub mod scope;

pub use gate::{CompletionGate, GateGuard, GateOutcome, OutcomeKind};
pub use group::{DrainReport, TaskGroup};
pub use scope::{CancelCause, CancelScope};
