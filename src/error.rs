use crate::sync::CancelCause;
use thiserror::Error;

/// Errors raised by kitchen steps and the primitives that coordinate them.
///
/// The type is `Clone` so a [`CompletionGate`](crate::sync::CompletionGate)
/// can hand the same failure to every reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Cancelled: {0}")]
    Cancelled(CancelCause),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Failed to acquire {resource}: {reason}")]
    Acquisition { resource: String, reason: String },

    #[error("Task {task} panicked: {reason}")]
    TaskPanicked { task: String, reason: String },

    #[error("Gate {0} was dropped before it was resolved")]
    Abandoned(String),
}

impl Error {
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Error::InvalidState(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
