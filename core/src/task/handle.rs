use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::lifecycle::TaskCore;
use super::state::TaskState;
use crate::blocker::{BlockingScope, InputBlocker};
use crate::error::WorkFailure;

/// Type-erased view of a typed task, the shape the service and the pool
/// work with.
pub(crate) trait ErasedTask: Send + Sync {
    fn core(&self) -> &TaskCore;
    fn run(self: Arc<Self>);
    fn cancel(self: Arc<Self>) -> bool;
}

/// Untyped, cloneable handle to a task.
///
/// Equality and hashing are reference identity: two handles are equal only
/// if they point at the same task.
#[derive(Clone)]
pub struct TaskRef(Arc<dyn ErasedTask>);

impl TaskRef {
    pub(crate) fn new(task: Arc<dyn ErasedTask>) -> Self {
        Self(task)
    }

    pub(crate) fn core(&self) -> &TaskCore {
        self.0.core()
    }

    pub(crate) fn run(&self) {
        self.0.clone().run();
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }

    pub fn id(&self) -> Uuid {
        self.core().id
    }

    pub fn title(&self) -> &str {
        &self.core().spec.title
    }

    pub fn description(&self) -> Option<&str> {
        self.core().spec.description.as_deref()
    }

    pub fn state(&self) -> TaskState {
        self.core().state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    /// True once the task has left PENDING, including when it is done.
    pub fn is_started(&self) -> bool {
        self.state() != TaskState::Pending
    }

    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.core().is_cancel_requested()
    }

    pub fn blocking_scope(&self) -> BlockingScope {
        self.core().spec.scope
    }

    pub fn block_target(&self) -> Option<&str> {
        self.core().spec.block_target.as_deref()
    }

    pub fn user_can_cancel(&self) -> bool {
        self.core().spec.user_can_cancel
    }

    pub fn progress(&self) -> u8 {
        self.core().lifecycle().progress
    }

    pub fn message(&self) -> Option<String> {
        self.core().lifecycle().message.clone()
    }

    pub fn failure(&self) -> Option<WorkFailure> {
        self.core().lifecycle().failure.clone()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.core().lifecycle().started_at
    }

    pub fn done_at(&self) -> Option<DateTime<Utc>> {
        self.core().lifecycle().done_at
    }

    /// Time between STARTED and DONE. `None` for tasks that never started or
    /// are still running.
    pub fn execution_duration(&self) -> Option<Duration> {
        self.core().lifecycle().duration
    }

    pub fn input_blocker(&self) -> Option<Arc<InputBlocker>> {
        self.core().input_blocker()
    }

    /// Name of the service that executed this task, while it is alive.
    pub fn service_name(&self) -> Option<String> {
        self.core().service().map(|s| s.name.clone())
    }

    /// See [`Task::cancel`](super::Task::cancel).
    pub fn cancel(&self) -> bool {
        self.0.clone().cancel()
    }

    /// Blocks until the task is done and its terminal notification is queued.
    pub fn wait(&self) {
        self.core().wait_settled(None);
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.core().wait_settled(Some(timeout))
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for TaskRef {}

impl Hash for TaskRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRef")
            .field("id", &self.id())
            .field("title", &self.title())
            .field("state", &self.state())
            .finish()
    }
}
