//! Task lifecycle states and the transition table that guards them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Started,
    Running,
    Cancelled,
    Succeeded,
    Failed,
}

impl TaskState {
    /// DONE is the union of the three terminal states.
    pub fn is_done(self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Succeeded | TaskState::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Started => "started",
            TaskState::Running => "running",
            TaskState::Cancelled => "cancelled",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: TaskState, to: TaskState },
    #[error("Cannot transition from terminal state {state:?}")]
    FromTerminalState { state: TaskState },
}

/// Transition table for [`TaskState`].
pub struct StateTransition;

impl StateTransition {
    pub fn validate(from: TaskState, to: TaskState) -> Result<(), TransitionError> {
        if from.is_done() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = match (from, to) {
            (TaskState::Pending, TaskState::Started) => true,
            (TaskState::Started, TaskState::Running) => true,
            (TaskState::Running, TaskState::Succeeded) => true,
            (TaskState::Running, TaskState::Failed) => true,
            // cancellation short-circuits from any live state
            (_, TaskState::Cancelled) => true,
            _ => false,
        };

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }
}
