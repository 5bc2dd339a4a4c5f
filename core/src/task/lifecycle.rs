//! Untyped bookkeeping shared by every task: state, cancellation flag,
//! owning-service link, input blocker and progress properties.
//!
//! Lock order is service registry -> task lifecycle, never the reverse.
//! Both `claim` (called by the service with its registry held) and `settle`
//! follow it, which is what makes "terminal" and "deregistered" a single
//! observable step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use uuid::Uuid;

use super::handle::TaskRef;
use super::state::{StateTransition, TaskState};
use crate::blocker::{BlockingScope, ForegroundSurface, InputBlocker};
use crate::coordinator::ForegroundCoordinator;
use crate::error::{TaskError, WorkFailure};
use crate::service::{ServiceShared, TasksChanged};
use crate::util::lock;

/// Descriptive fields fixed at construction.
#[derive(Debug, Clone, Default)]
pub(crate) struct TaskSpec {
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) scope: BlockingScope,
    pub(crate) block_target: Option<String>,
    pub(crate) user_can_cancel: bool,
}

pub(crate) struct Lifecycle {
    pub(crate) state: TaskState,
    pub(crate) progress: u8,
    pub(crate) message: Option<String>,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) done_at: Option<DateTime<Utc>>,
    pub(crate) duration: Option<Duration>,
    pub(crate) failure: Option<WorkFailure>,
    started: Option<Instant>,
    // the terminal notification has been handed to the coordinator
    settled: bool,
}

/// Outcome of a terminal transition performed by [`TaskCore::settle`].
pub(crate) struct Settlement {
    pub(crate) service: Option<Arc<ServiceShared>>,
    /// Present when the transition also removed the task from its service.
    pub(crate) change: Option<TasksChanged>,
}

pub(crate) struct TaskCore {
    pub(crate) id: Uuid,
    pub(crate) spec: TaskSpec,
    lifecycle: Mutex<Lifecycle>,
    settled_cv: Condvar,
    settled_tx: watch::Sender<bool>,
    cancel_requested: AtomicBool,
    owner: OnceLock<Weak<ServiceShared>>,
    // kept past the service so late deliveries still reach the coordinator
    coordinator: OnceLock<Arc<dyn ForegroundCoordinator>>,
    blocker: OnceLock<Arc<InputBlocker>>,
}

impl TaskCore {
    pub(crate) fn new(spec: TaskSpec) -> Self {
        let (settled_tx, _) = watch::channel(false);
        Self {
            id: Uuid::new_v4(),
            spec,
            lifecycle: Mutex::new(Lifecycle {
                state: TaskState::Pending,
                progress: 0,
                message: None,
                started_at: None,
                done_at: None,
                duration: None,
                failure: None,
                started: None,
                settled: false,
            }),
            settled_cv: Condvar::new(),
            settled_tx,
            cancel_requested: AtomicBool::new(false),
            owner: OnceLock::new(),
            coordinator: OnceLock::new(),
            blocker: OnceLock::new(),
        }
    }

    pub(crate) fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    pub(crate) fn state(&self) -> TaskState {
        self.lifecycle().state
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Raises the cooperative flag. Returns true for the first request.
    pub(crate) fn request_cancel(&self) -> bool {
        !self.cancel_requested.swap(true, Ordering::SeqCst)
    }

    pub(crate) fn set_progress(&self, percent: u8) {
        let mut lc = self.lifecycle();
        if !lc.state.is_done() {
            lc.progress = percent.min(100);
        }
    }

    pub(crate) fn set_message(&self, message: String) {
        let mut lc = self.lifecycle();
        if !lc.state.is_done() {
            lc.message = Some(message);
        }
    }

    pub(crate) fn service(&self) -> Option<Arc<ServiceShared>> {
        self.owner.get().and_then(Weak::upgrade)
    }

    pub(crate) fn is_owned(&self) -> bool {
        self.owner.get().is_some()
    }

    /// The claiming service's coordinator, even after that service is gone.
    pub(crate) fn coordinator(&self) -> Option<Arc<dyn ForegroundCoordinator>> {
        self.coordinator.get().cloned()
    }

    pub(crate) fn input_blocker(&self) -> Option<Arc<InputBlocker>> {
        self.blocker.get().cloned()
    }

    /// Creates the blocker on first use; tasks without a blocking scope never
    /// get one.
    pub(crate) fn blocker_or_init(
        &self,
        surface: &Arc<dyn ForegroundSurface>,
    ) -> Option<Arc<InputBlocker>> {
        if self.spec.scope == BlockingScope::None {
            return None;
        }
        Some(
            self.blocker
                .get_or_init(|| {
                    Arc::new(InputBlocker::new(
                        self.spec.scope,
                        self.spec.block_target.clone(),
                        surface.clone(),
                    ))
                })
                .clone(),
        )
    }

    /// Links the task to `service`. The caller holds the service registry.
    pub(crate) fn claim(&self, service: &Arc<ServiceShared>) -> Result<(), TaskError> {
        let lc = self.lifecycle();
        if lc.state != TaskState::Pending {
            return Err(TaskError::InvalidState(format!(
                "task '{}' is {}, only pending tasks can be executed",
                self.spec.title, lc.state
            )));
        }
        if let Some(owner) = self.owner.get() {
            let by = owner
                .upgrade()
                .map(|s| s.name.clone())
                .unwrap_or_else(|| "<dropped>".to_string());
            return Err(TaskError::InvalidState(format!(
                "task '{}' was already executed by service '{}'",
                self.spec.title, by
            )));
        }
        self.owner
            .set(Arc::downgrade(service))
            .map_err(|_| TaskError::InvalidState(format!(
                "task '{}' was claimed concurrently",
                self.spec.title
            )))?;
        let _ = self.coordinator.set(service.coordinator.clone());
        Ok(())
    }

    /// PENDING -> STARTED. False if the task is no longer pending.
    pub(crate) fn begin(&self) -> bool {
        let mut lc = self.lifecycle();
        if StateTransition::validate(lc.state, TaskState::Started).is_err() {
            return false;
        }
        lc.state = TaskState::Started;
        lc.started_at = Some(Utc::now());
        lc.started = Some(Instant::now());
        true
    }

    /// STARTED -> RUNNING.
    pub(crate) fn enter_running(&self) -> bool {
        let mut lc = self.lifecycle();
        if lc.state != TaskState::Started {
            return false;
        }
        lc.state = TaskState::Running;
        true
    }

    /// Moves the task to the terminal `target`, but only from one of `from`.
    ///
    /// When the task belongs to a live service the transition happens with
    /// the service registry held and the task is removed from it in the same
    /// critical section. `commit` runs under the lifecycle lock so anything
    /// it publishes (the typed outcome) is visible no later than the state.
    pub(crate) fn settle<F>(
        &self,
        me: &TaskRef,
        target: TaskState,
        from: &[TaskState],
        commit: F,
    ) -> Option<Settlement>
    where
        F: FnOnce(&mut Lifecycle),
    {
        let mut commit = Some(commit);
        loop {
            let linked = self.owner.get().is_some();
            let service = self.service();
            let mut registry = service.as_ref().map(|s| s.lock_registry());
            let mut lc = self.lifecycle();

            // claimed between the owner read and the registry lock: retry
            // with the registry held
            if !linked && self.owner.get().is_some() {
                continue;
            }
            if !from.contains(&lc.state) || StateTransition::validate(lc.state, target).is_err() {
                return None;
            }

            lc.state = target;
            lc.done_at = Some(Utc::now());
            lc.duration = lc.started.map(|s| s.elapsed());
            if let Some(commit) = commit.take() {
                commit(&mut lc);
            }
            drop(lc);

            let change = match (service.as_ref(), registry.as_mut()) {
                (Some(s), Some(reg)) => crate::service::deregister(&s.name, reg, me),
                _ => None,
            };
            drop(registry);
            return Some(Settlement { service, change });
        }
    }

    /// Marks the terminal notification as handed off and wakes joiners.
    pub(crate) fn mark_settled(&self) {
        let mut lc = self.lifecycle();
        lc.settled = true;
        drop(lc);
        self.settled_cv.notify_all();
        self.settled_tx.send_replace(true);
    }

    /// Waits until the task is settled. `None` waits indefinitely. Returns
    /// whether it settled in time.
    pub(crate) fn wait_settled(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut lc = self.lifecycle();
        while !lc.settled {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self
                        .settled_cv
                        .wait_timeout(lc, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    lc = guard;
                }
                None => {
                    lc = self
                        .settled_cv
                        .wait(lc)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
        true
    }

    pub(crate) fn subscribe_settled(&self) -> watch::Receiver<bool> {
        self.settled_tx.subscribe()
    }
}
