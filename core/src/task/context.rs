use uuid::Uuid;

use super::lifecycle::TaskCore;

/// What a work body can see of its own task while it runs.
pub struct TaskContext<'a, V> {
    core: &'a TaskCore,
    sink: &'a dyn Fn(V),
}

impl<'a, V> TaskContext<'a, V> {
    pub(crate) fn new(core: &'a TaskCore, sink: &'a dyn Fn(V)) -> Self {
        Self { core, sink }
    }

    pub fn id(&self) -> Uuid {
        self.core.id
    }

    pub fn title(&self) -> &str {
        &self.core.spec.title
    }

    /// Whether cancellation was requested. Bodies that loop should check this
    /// and return early; the result of a cancelled task is discarded.
    pub fn is_cancelled(&self) -> bool {
        self.core.is_cancel_requested()
    }

    /// Queues a progress notification carrying `value` on the coordinator.
    /// Values from one task are delivered in publish order.
    pub fn publish(&self, value: V) {
        (self.sink)(value);
    }

    /// Percentage complete, clamped to 100.
    pub fn set_progress(&self, percent: u8) {
        self.core.set_progress(percent);
    }

    /// Progress from a `done / total` pair. A zero total reads as complete.
    pub fn set_progress_of(&self, done: u64, total: u64) {
        let percent = if total == 0 {
            100
        } else {
            (u128::from(done.min(total)) * 100 / u128::from(total)) as u8
        };
        self.core.set_progress(percent);
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.core.set_message(message.into());
    }
}
