use std::sync::Arc;

use thiserror::Error;

/// Stable codes for engine errors, used by the binary for exit codes and by
/// the JSON Lines renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    InvalidArgument = 3,
    InvalidState = 4,
    Rejected = 20,
    Unavailable = 30,
    Interrupted = 31,
}

/// Errors returned by the engine's submission and control APIs.
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("task rejected by service '{service}': service is shut down")]
    Rejected { service: String },

    #[error("wait interrupted: {0}")]
    InterruptedWait(String),

    #[error("coordinator unavailable: {0}")]
    Coordinator(#[from] std::io::Error),
}

impl TaskError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::InvalidState(_) => ErrorCode::InvalidState,
            Self::Rejected { .. } => ErrorCode::Rejected,
            Self::InterruptedWait(_) => ErrorCode::Interrupted,
            Self::Coordinator(_) => ErrorCode::Unavailable,
        }
    }
}

/// Failure raised by a task body. It is captured on the task's terminal
/// state and handed to listeners; it never propagates into the worker pool
/// or the coordinator.
#[derive(Error, Debug, Clone)]
pub enum WorkFailure {
    #[error("{0}")]
    Error(Arc<anyhow::Error>),

    #[error("task body panicked: {0}")]
    Panicked(String),
}

impl WorkFailure {
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl From<anyhow::Error> for WorkFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::Error(Arc::new(err))
    }
}
