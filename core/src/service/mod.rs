//! Task services: a named worker pool plus the registry of in-flight tasks.
//!
//! A task is in a service's registry iff it was executed by that service and
//! has not reached a terminal state. Registration and deregistration happen
//! under the registry mutex; deregistration is part of the terminal
//! transition itself.

mod listener;

pub use listener::{TasksChanged, TasksListener};

use listener::ChangeSequencer;

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use crate::blocker::{ForegroundSurface, HeadlessSurface};
use crate::coordinator::{dispatch, isolate, EventLoopCoordinator, ForegroundCoordinator};
use crate::error::TaskError;
use crate::pool::{PoolConfig, PoolStats, Work, WorkerPool};
use crate::task::{Task, TaskRef};
use crate::util::{lock, read, write};

impl Work for TaskRef {
    fn execute(self) {
        self.run();
    }
}

/// In-flight tasks in submission order, plus the number the next change
/// to them will carry.
pub(crate) struct Registry {
    tasks: Vec<TaskRef>,
    next_sequence: u64,
}

impl Registry {
    fn new() -> Self {
        Self {
            tasks: Vec::new(),
            next_sequence: 0,
        }
    }

    fn record(&mut self, service: &str, old: Vec<TaskRef>) -> TasksChanged {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        TasksChanged::new(service, old, self.tasks.clone()).sequenced(sequence)
    }
}

pub(crate) struct ServiceShared {
    pub(crate) name: String,
    registry: Mutex<Registry>,
    pool: WorkerPool<TaskRef>,
    pub(crate) coordinator: Arc<dyn ForegroundCoordinator>,
    surface: Arc<dyn ForegroundSurface>,
    listeners: RwLock<Vec<Arc<dyn TasksListener>>>,
    sequencer: ChangeSequencer,
}

impl ServiceShared {
    pub(crate) fn lock_registry(&self) -> MutexGuard<'_, Registry> {
        lock(&self.registry)
    }

    /// Delivers `change` once every earlier change has been delivered.
    /// Called on the coordinator.
    fn publish_tasks_changed(&self, change: TasksChanged) {
        self.sequencer
            .submit(change, |change| self.fire_tasks_changed(change));
    }

    fn fire_tasks_changed(&self, change: &TasksChanged) {
        let listeners = read(&self.listeners).clone();
        for listener in listeners {
            isolate("tasks listener", || listener.tasks_changed(change));
        }
    }

    /// Coordinator-side half of done handling, after the task's own
    /// listeners have run.
    pub(crate) fn task_finished(&self, task: &TaskRef, change: Option<TasksChanged>) {
        if let Some(change) = change {
            self.publish_tasks_changed(change);
        }
        if let Some(blocker) = task.input_blocker() {
            isolate("input unblock", || {
                blocker.unblock();
            });
        }
    }
}

/// Removes `task` from `registry`, returning the change if it was listed.
pub(crate) fn deregister(
    service: &str,
    registry: &mut Registry,
    task: &TaskRef,
) -> Option<TasksChanged> {
    let index = registry.tasks.iter().position(|t| t == task)?;
    let old = registry.tasks.clone();
    registry.tasks.remove(index);
    Some(registry.record(service, old))
}

/// Named task-running service.
///
/// Cloning is cheap; clones share the same pool and registry. The pool shuts
/// down (letting queued work drain) once the last clone is dropped.
#[derive(Clone)]
pub struct TaskService {
    shared: Arc<ServiceShared>,
}

pub struct TaskServiceBuilder {
    name: String,
    pool: PoolConfig,
    coordinator: Option<Arc<dyn ForegroundCoordinator>>,
    surface: Option<Arc<dyn ForegroundSurface>>,
}

impl TaskServiceBuilder {
    pub fn pool(mut self, config: PoolConfig) -> Self {
        self.pool = config;
        self
    }

    pub fn coordinator(mut self, coordinator: Arc<dyn ForegroundCoordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn surface(mut self, surface: Arc<dyn ForegroundSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    /// Without an explicit coordinator the service starts its own
    /// [`EventLoopCoordinator`] thread.
    pub fn build(self) -> Result<TaskService, TaskError> {
        if self.name.trim().is_empty() {
            return Err(TaskError::InvalidArgument(
                "service name must not be empty".to_string(),
            ));
        }
        let pool = WorkerPool::new(self.pool)?;
        let coordinator: Arc<dyn ForegroundCoordinator> = match self.coordinator {
            Some(coordinator) => coordinator,
            None => Arc::new(EventLoopCoordinator::with_name(format!(
                "{}-coordinator",
                self.name
            ))?),
        };
        let surface: Arc<dyn ForegroundSurface> = match self.surface {
            Some(surface) => surface,
            None => Arc::new(HeadlessSurface::new()),
        };

        tracing::debug!(
            service = %self.name,
            core_size = pool.config().core_size,
            max_size = pool.config().max_size,
            "task service created"
        );
        Ok(TaskService {
            shared: Arc::new(ServiceShared {
                name: self.name,
                registry: Mutex::new(Registry::new()),
                pool,
                coordinator,
                surface,
                listeners: RwLock::new(Vec::new()),
                sequencer: ChangeSequencer::default(),
            }),
        })
    }
}

impl TaskService {
    /// Service with the default pool (3 core workers, up to 10, 1s
    /// keep-alive) delivering on `coordinator`.
    pub fn new(
        name: impl Into<String>,
        coordinator: Arc<dyn ForegroundCoordinator>,
    ) -> Result<Self, TaskError> {
        Self::builder(name).coordinator(coordinator).build()
    }

    pub fn builder(name: impl Into<String>) -> TaskServiceBuilder {
        TaskServiceBuilder {
            name: name.into(),
            pool: PoolConfig::default(),
            coordinator: None,
            surface: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn coordinator(&self) -> Arc<dyn ForegroundCoordinator> {
        self.shared.coordinator.clone()
    }

    pub fn surface(&self) -> Arc<dyn ForegroundSurface> {
        self.shared.surface.clone()
    }

    /// Registers `task`, arms its input blocker on the coordinator and hands
    /// it to the pool. Never waits for the task.
    ///
    /// Fails with `InvalidState` if the task is not pending or was already
    /// executed, and with `Rejected` once the service is shut down; a
    /// rejected task ends up CANCELLED.
    pub fn execute(&self, task: &TaskRef) -> Result<(), TaskError> {
        let (change, blocker) = {
            let mut registry = self.shared.lock_registry();
            task.core().claim(&self.shared)?;
            let old = registry.tasks.clone();
            registry.tasks.push(task.clone());
            let change = registry.record(&self.shared.name, old);
            (change, task.core().blocker_or_init(&self.shared.surface))
        };
        tracing::debug!(
            service = %self.shared.name,
            task = %task.id(),
            title = %task.title(),
            scope = %task.blocking_scope(),
            "task queued"
        );

        let shared = self.shared.clone();
        dispatch(
            self.shared.coordinator.as_ref(),
            Box::new(move || {
                shared.publish_tasks_changed(change);
                if let Some(blocker) = blocker {
                    isolate("input block", || {
                        blocker.block();
                    });
                }
            }),
        );

        if let Err(rejected) = self.shared.pool.submit(task.clone()) {
            tracing::warn!(
                service = %self.shared.name,
                task = %task.id(),
                "submission rejected: {}",
                rejected.error
            );
            rejected.into_item().cancel();
            return Err(TaskError::Rejected {
                service: self.shared.name.clone(),
            });
        }
        Ok(())
    }

    /// Typed convenience over [`execute`](Self::execute).
    pub fn execute_task<T, V>(&self, task: &Task<T, V>) -> Result<(), TaskError>
    where
        T: Clone + Send + Sync + 'static,
        V: Send + 'static,
    {
        self.execute(&task.handle())
    }

    /// Snapshot of the in-flight tasks in submission order.
    pub fn tasks(&self) -> Vec<TaskRef> {
        self.shared.lock_registry().tasks.clone()
    }

    /// Stops accepting tasks; queued tasks still run.
    pub fn shutdown(&self) {
        tracing::debug!(service = %self.shared.name, "shutdown requested");
        self.shared.pool.shutdown();
    }

    /// Stops accepting tasks and returns the ones that never started, now
    /// CANCELLED. Running tasks get a cancellation request.
    pub fn shutdown_now(&self) -> Vec<TaskRef> {
        let unstarted = self.shared.pool.shutdown_now();
        for task in &unstarted {
            task.cancel();
        }
        let running = self.tasks();
        for task in &running {
            task.cancel();
        }
        tracing::debug!(
            service = %self.shared.name,
            unstarted = unstarted.len(),
            running = running.len(),
            "shutdown now"
        );
        unstarted
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.pool.is_shutdown()
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.pool.is_terminated()
    }

    /// Blocks until the pool has terminated or `timeout` elapses. Returns
    /// whether termination completed. Must not be called on the coordinator
    /// thread.
    pub fn await_termination(&self, timeout: Duration) -> Result<bool, TaskError> {
        if self.shared.coordinator.is_coordinator_thread() {
            return Err(TaskError::InvalidState(format!(
                "await_termination on service '{}' called from the coordinator thread",
                self.shared.name
            )));
        }
        self.shared
            .pool
            .await_termination(timeout)
            .map_err(|e| TaskError::InterruptedWait(e.to_string()))
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.pool.stats()
    }

    pub fn add_tasks_listener(&self, listener: Arc<dyn TasksListener>) {
        write(&self.shared.listeners).push(listener);
    }

    pub fn remove_tasks_listener(&self, listener: &Arc<dyn TasksListener>) -> bool {
        let mut listeners = write(&self.shared.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }
}

impl PartialEq for TaskService {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for TaskService {}

impl fmt::Debug for TaskService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskService")
            .field("name", &self.shared.name)
            .field("in_flight", &self.shared.lock_registry().tasks.len())
            .field("pool", &self.shared.pool)
            .finish()
    }
}
