use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, OnceLock, RwLock};
use std::time::Duration;

use uuid::Uuid;

use super::context::TaskContext;
use super::event::{EventStage, Outcome, TaskEvent, TaskListener};
use super::handle::{ErasedTask, TaskRef};
use super::lifecycle::{Settlement, TaskCore, TaskSpec};
use super::state::TaskState;
use crate::blocker::{BlockingScope, InputBlocker};
use crate::coordinator::{dispatch, isolate, run_isolated, CoordinatorJob};
use crate::error::WorkFailure;
use crate::util::{lock, panic_message, read, write};

type WorkFn<T, V> = Box<dyn FnOnce(&TaskContext<'_, V>) -> anyhow::Result<T> + Send + 'static>;

pub(crate) struct TaskShared<T, V> {
    core: TaskCore,
    work: Mutex<Option<WorkFn<T, V>>>,
    outcome: OnceLock<Outcome<T>>,
    listeners: RwLock<Vec<Arc<dyn TaskListener<T, V>>>>,
}

/// A cancellable, observable unit of background work producing a `T` and
/// publishing intermediate `V` values.
///
/// `Task` is a cheap handle; clones refer to the same task. Hand it to
/// [`TaskService::execute_task`](crate::service::TaskService::execute_task)
/// to run it.
pub struct Task<T, V = ()> {
    shared: Arc<TaskShared<T, V>>,
}

impl<T, V> Clone for Task<T, V> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, V> fmt::Debug for Task<T, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.shared.core.id)
            .field("title", &self.shared.core.spec.title)
            .field("state", &self.shared.core.state())
            .finish()
    }
}

/// Builder for tasks that need more than a title.
#[derive(Debug, Clone, Default)]
pub struct TaskBuilder {
    spec: TaskSpec,
}

impl TaskBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            spec: TaskSpec {
                title: title.into(),
                ..TaskSpec::default()
            },
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.spec.description = Some(description.into());
        self
    }

    /// Input scope blocked while the task runs.
    pub fn blocking(mut self, scope: BlockingScope) -> Self {
        self.spec.scope = scope;
        self
    }

    /// Element the blocking scope is anchored to. Resolved at block time.
    pub fn block_target(mut self, target: impl Into<String>) -> Self {
        self.spec.block_target = Some(target.into());
        self
    }

    pub fn user_can_cancel(mut self, can: bool) -> Self {
        self.spec.user_can_cancel = can;
        self
    }

    pub fn build<T, V, F>(self, work: F) -> Task<T, V>
    where
        T: Clone + Send + Sync + 'static,
        V: Send + 'static,
        F: FnOnce(&TaskContext<'_, V>) -> anyhow::Result<T> + Send + 'static,
    {
        Task {
            shared: Arc::new(TaskShared {
                core: TaskCore::new(self.spec),
                work: Mutex::new(Some(Box::new(work))),
                outcome: OnceLock::new(),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }
}

impl<T, V> Task<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    pub fn new<F>(title: impl Into<String>, work: F) -> Self
    where
        F: FnOnce(&TaskContext<'_, V>) -> anyhow::Result<T> + Send + 'static,
    {
        TaskBuilder::new(title).build(work)
    }

    pub fn builder(title: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(title)
    }

    /// Untyped handle, as seen by services and tasks-changed listeners.
    pub fn handle(&self) -> TaskRef {
        self.shared.handle()
    }

    pub fn id(&self) -> Uuid {
        self.shared.core.id
    }

    pub fn title(&self) -> &str {
        &self.shared.core.spec.title
    }

    pub fn description(&self) -> Option<&str> {
        self.shared.core.spec.description.as_deref()
    }

    pub fn state(&self) -> TaskState {
        self.shared.core.state()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == TaskState::Pending
    }

    pub fn is_started(&self) -> bool {
        self.state() != TaskState::Pending
    }

    pub fn is_done(&self) -> bool {
        self.state().is_done()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == TaskState::Cancelled
    }

    pub fn blocking_scope(&self) -> BlockingScope {
        self.shared.core.spec.scope
    }

    pub fn user_can_cancel(&self) -> bool {
        self.shared.core.spec.user_can_cancel
    }

    pub fn progress(&self) -> u8 {
        self.shared.core.lifecycle().progress
    }

    pub fn message(&self) -> Option<String> {
        self.shared.core.lifecycle().message.clone()
    }

    pub fn execution_duration(&self) -> Option<Duration> {
        self.shared.core.lifecycle().duration
    }

    pub fn input_blocker(&self) -> Option<Arc<InputBlocker>> {
        self.shared.core.input_blocker()
    }

    /// Requests cancellation. A task that has not started goes straight to
    /// CANCELLED and its body never runs; a running task only sees the flag.
    /// Returns true when this call made the first request, false if the task
    /// was already done or cancellation had been requested before.
    pub fn cancel(&self) -> bool {
        self.shared.clone().cancel()
    }

    /// The result, present only once the task SUCCEEDED.
    pub fn result(&self) -> Option<T> {
        self.shared.outcome.get().and_then(|o| o.value().cloned())
    }

    pub fn failure(&self) -> Option<WorkFailure> {
        self.shared.outcome.get().and_then(|o| o.failure().cloned())
    }

    /// `None` while the task is not done.
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.shared.outcome.get().cloned()
    }

    /// Blocks the calling thread until the task is done and its terminal
    /// notification has been handed to the coordinator.
    ///
    /// Joining on the coordinator thread of a queueing coordinator waits for
    /// the coordinator itself and deadlocks.
    pub fn join(&self) -> Outcome<T> {
        loop {
            if let Some(outcome) = self.join_timeout(Duration::from_secs(3600)) {
                return outcome;
            }
        }
    }

    pub fn join_timeout(&self, timeout: Duration) -> Option<Outcome<T>> {
        if self.shared.core.wait_settled(Some(timeout)) {
            self.outcome()
        } else {
            None
        }
    }

    /// Async form of [`join`](Self::join).
    pub async fn completion(&self) -> Outcome<T> {
        let mut settled = self.shared.core.subscribe_settled();
        loop {
            if *settled.borrow_and_update() {
                if let Some(outcome) = self.outcome() {
                    return outcome;
                }
            }
            // the sender lives as long as the task, so this only fails if
            // the watch was closed under us
            if settled.changed().await.is_err() {
                return self.outcome().unwrap_or(Outcome::Cancelled);
            }
        }
    }

    /// Listeners may be attached before or after execution; events already
    /// delivered are not replayed.
    pub fn add_listener(&self, listener: Arc<dyn TaskListener<T, V>>) {
        write(&self.shared.listeners).push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TaskListener<T, V>>) -> bool {
        let mut listeners = write(&self.shared.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }
}

impl<T, V> From<&Task<T, V>> for TaskRef
where
    T: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn from(task: &Task<T, V>) -> Self {
        task.handle()
    }
}

impl<T, V> TaskShared<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn handle(self: &Arc<Self>) -> TaskRef {
        TaskRef::new(self.clone())
    }

    fn listeners(&self) -> Vec<Arc<dyn TaskListener<T, V>>> {
        read(&self.listeners).clone()
    }

    /// Delivers on the coordinator of the service that claimed the task, or
    /// inline for a task no service ever claimed.
    fn post<F>(self: &Arc<Self>, deliver: F)
    where
        F: FnOnce(&Arc<Self>) + Send + 'static,
    {
        let shared = self.clone();
        let job: CoordinatorJob = Box::new(move || deliver(&shared));
        match self.core.coordinator() {
            Some(coordinator) => dispatch(coordinator.as_ref(), job),
            None => {
                run_isolated(job);
            }
        }
    }

    fn publish(self: &Arc<Self>, value: V) {
        self.post(move |shared| {
            let event = TaskEvent::new(shared.handle(), Some(value), EventStage::Progress);
            for listener in shared.listeners() {
                isolate("progress listener", || listener.progress(&event));
            }
        });
    }

    fn execute_body(self: &Arc<Self>) -> Outcome<T> {
        let body = lock(&self.work).take();
        if self.core.is_cancel_requested() {
            return Outcome::Cancelled;
        }
        if !self.core.enter_running() {
            return Outcome::Cancelled;
        }
        let Some(body) = body else {
            return Outcome::Failed(WorkFailure::Panicked("work body already consumed".into()));
        };

        let sink = |value: V| self.publish(value);
        let ctx = TaskContext::new(&self.core, &sink);
        let produced = catch_unwind(AssertUnwindSafe(|| body(&ctx)));

        if self.core.is_cancel_requested() {
            return Outcome::Cancelled;
        }
        match produced {
            Ok(Ok(value)) => Outcome::Succeeded(value),
            Ok(Err(err)) => Outcome::Failed(err.into()),
            Err(payload) => Outcome::Failed(WorkFailure::Panicked(panic_message(payload.as_ref()))),
        }
    }

    /// Commits `outcome` as the terminal state if the task is in one of
    /// `from`, then hands the terminal notification to the coordinator.
    fn finish(self: &Arc<Self>, outcome: Outcome<T>, from: &[TaskState]) -> bool {
        let me = self.handle();
        let target = outcome.state();
        let failure = outcome.failure().cloned();
        let settlement = self.core.settle(&me, target, from, |lc| {
            lc.failure = failure;
            let _ = self.outcome.set(outcome);
        });
        let Some(settlement) = settlement else {
            return false;
        };

        let lc = self.core.lifecycle();
        tracing::debug!(
            task = %self.core.id,
            title = %self.core.spec.title,
            state = %target,
            duration_ms = lc.duration.map(|d| d.as_millis() as u64),
            "task done"
        );
        drop(lc);

        self.deliver_terminal(me, settlement);
        self.core.mark_settled();
        true
    }

    fn deliver_terminal(self: &Arc<Self>, me: TaskRef, settlement: Settlement) {
        let Settlement { service, change } = settlement;
        let coordinator = self.core.coordinator();
        let shared = self.clone();
        let job: CoordinatorJob = Box::new(move || {
            shared.notify_terminal(&me);
            match service {
                Some(service) => service.task_finished(&me, change),
                None => {
                    if let Some(blocker) = me.input_blocker() {
                        isolate("input unblock", || {
                            blocker.unblock();
                        });
                    }
                }
            }
        });
        match coordinator {
            Some(coordinator) => dispatch(coordinator.as_ref(), job),
            None => {
                run_isolated(job);
            }
        }
    }

    fn notify_terminal(&self, me: &TaskRef) {
        let Some(outcome) = self.outcome.get() else {
            return;
        };
        let listeners = self.listeners();
        match outcome {
            Outcome::Succeeded(value) => {
                let event = TaskEvent::new(me.clone(), Some(value.clone()), EventStage::Succeeded);
                for listener in &listeners {
                    isolate("succeeded listener", || listener.succeeded(&event));
                }
            }
            Outcome::Failed(failure) => {
                let event = TaskEvent::new(me.clone(), Some(failure.clone()), EventStage::Failed);
                for listener in &listeners {
                    isolate("failed listener", || listener.failed(&event));
                }
            }
            Outcome::Cancelled => {
                let event = TaskEvent::new(me.clone(), None, EventStage::Cancelled);
                for listener in &listeners {
                    isolate("cancelled listener", || listener.cancelled(&event));
                }
            }
        }
    }
}

impl<T, V> ErasedTask for TaskShared<T, V>
where
    T: Clone + Send + Sync + 'static,
    V: Send + 'static,
{
    fn core(&self) -> &TaskCore {
        &self.core
    }

    fn run(self: Arc<Self>) {
        if !self.core.begin() {
            tracing::debug!(
                task = %self.core.id,
                state = %self.core.state(),
                "skipping run, task is no longer pending"
            );
            return;
        }
        tracing::debug!(task = %self.core.id, title = %self.core.spec.title, "task started");

        self.post(|shared| {
            let event = TaskEvent::new(shared.handle(), None, EventStage::Started);
            for listener in shared.listeners() {
                isolate("started listener", || listener.started(&event));
            }
        });

        let outcome = self.execute_body();
        if let Outcome::Failed(failure) = &outcome {
            tracing::warn!(task = %self.core.id, title = %self.core.spec.title, "task failed: {}", failure);
        }
        self.finish(outcome, &[TaskState::Started, TaskState::Running]);
    }

    fn cancel(self: Arc<Self>) -> bool {
        if self.core.state().is_done() {
            return false;
        }
        let first = self.core.request_cancel();
        if self.finish(Outcome::Cancelled, &[TaskState::Pending]) {
            tracing::debug!(task = %self.core.id, "cancelled before start");
        }
        first
    }
}
