use serde::{Deserialize, Serialize};

use super::handle::TaskRef;
use super::state::TaskState;
use crate::error::WorkFailure;

/// Point in the lifecycle at which an event was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStage {
    Started,
    Progress,
    Succeeded,
    Failed,
    Cancelled,
}

impl EventStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            EventStage::Succeeded | EventStage::Failed | EventStage::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStage::Started => "started",
            EventStage::Progress => "progress",
            EventStage::Succeeded => "succeeded",
            EventStage::Failed => "failed",
            EventStage::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for EventStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable notification: the task it came from, the value it carries and
/// the stage that produced it.
#[derive(Debug, Clone)]
pub struct TaskEvent<P> {
    source: TaskRef,
    value: Option<P>,
    stage: EventStage,
}

impl<P> TaskEvent<P> {
    pub(crate) fn new(source: TaskRef, value: Option<P>, stage: EventStage) -> Self {
        Self {
            source,
            value,
            stage,
        }
    }

    pub fn source(&self) -> &TaskRef {
        &self.source
    }

    pub fn value(&self) -> Option<&P> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<P> {
        self.value
    }

    pub fn stage(&self) -> EventStage {
        self.stage
    }
}

/// Per-task observer. `T` is the result type, `V` the progress value type.
///
/// Every hook runs on the foreground coordinator. A panicking hook is logged
/// and does not affect the task or the other listeners.
pub trait TaskListener<T, V>: Send + Sync {
    fn started(&self, _event: &TaskEvent<()>) {}

    fn progress(&self, _event: &TaskEvent<V>) {}

    fn succeeded(&self, _event: &TaskEvent<T>) {}

    fn failed(&self, _event: &TaskEvent<WorkFailure>) {}

    fn cancelled(&self, _event: &TaskEvent<()>) {}
}

/// Final result of a task.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Succeeded(T),
    Failed(WorkFailure),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn state(&self) -> TaskState {
        match self {
            Outcome::Succeeded(_) => TaskState::Succeeded,
            Outcome::Failed(_) => TaskState::Failed,
            Outcome::Cancelled => TaskState::Cancelled,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Outcome::Succeeded(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Succeeded(v) => Some(v),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&WorkFailure> {
        match self {
            Outcome::Failed(f) => Some(f),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Succeeded(v) => Some(v),
            _ => None,
        }
    }
}
