//! Tasks: cancellable, observable units of background work.
//!
//! A [`Task<T, V>`] is typed by its result `T` and its progress value `V`.
//! Services and tasks-changed listeners see the untyped [`TaskRef`].

mod context;
mod event;
mod handle;
pub(crate) mod lifecycle;
pub mod state;
mod task;

pub use context::TaskContext;
pub use event::{EventStage, Outcome, TaskEvent, TaskListener};
pub use handle::TaskRef;
pub use state::{StateTransition, TaskState, TransitionError};
pub use task::{Task, TaskBuilder};
