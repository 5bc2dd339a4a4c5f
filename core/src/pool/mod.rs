//! Bounded worker pool.
//!
//! Workers are plain OS threads started lazily. A submission starts a new
//! worker while fewer than `core_size` are alive, or while queued work
//! outnumbers idle workers and fewer than `max_size` are alive. Workers above
//! the core size exit after idling for `keep_alive`. The queue is unbounded:
//! submissions only fail once the pool is shut down.

mod config;

pub use config::PoolConfig;

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{PoolError, SubmitError, TaskError};
use crate::util::{lock, panic_message};

/// A unit of work the pool can run.
pub trait Work: Send + 'static {
    fn execute(self);
}

/// Boxed closure work item.
pub struct Job(Box<dyn FnOnce() + Send + 'static>);

impl Job {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(f))
    }
}

impl Work for Job {
    fn execute(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Job")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Accepting and running work.
    Running,
    /// No intake; queued work still drains.
    Shutdown,
    /// No intake; the queue was handed back to the caller.
    Stop,
    /// Every worker has exited after shutdown.
    Terminated,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub run_state: RunState,
    pub live: usize,
    pub idle: usize,
    pub active: usize,
    pub queued: usize,
    pub completed: u64,
    pub largest: usize,
}

struct PoolState<W> {
    queue: VecDeque<W>,
    run_state: RunState,
    live: usize,
    idle: usize,
    active: usize,
    completed: u64,
    largest: usize,
    next_worker: u64,
}

struct PoolShared<W> {
    config: PoolConfig,
    state: Mutex<PoolState<W>>,
    work_ready: Condvar,
    terminated: Condvar,
}

pub struct WorkerPool<W: Work> {
    shared: Arc<PoolShared<W>>,
}

impl<W: Work> WorkerPool<W> {
    pub fn new(config: PoolConfig) -> Result<Self, TaskError> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(PoolShared {
                config,
                state: Mutex::new(PoolState {
                    queue: VecDeque::new(),
                    run_state: RunState::Running,
                    live: 0,
                    idle: 0,
                    active: 0,
                    completed: 0,
                    largest: 0,
                    next_worker: 0,
                }),
                work_ready: Condvar::new(),
                terminated: Condvar::new(),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    /// Queues `item`. Never blocks and never fails for capacity reasons; the
    /// item is handed back if the pool is shut down or no worker could be
    /// started at all.
    pub fn submit(&self, item: W) -> Result<(), SubmitError<W>> {
        let config = &self.shared.config;
        let mut state = lock(&self.shared.state);
        if state.run_state != RunState::Running {
            return Err(SubmitError {
                error: PoolError::ShutDown,
                item,
            });
        }
        state.queue.push_back(item);

        let wants_worker = state.live < config.core_size
            || (state.queue.len() > state.idle && state.live < config.max_size);
        if !wants_worker {
            drop(state);
            self.shared.work_ready.notify_one();
            return Ok(());
        }

        // spawned under the lock so a failure can take back exactly this item
        let worker_id = state.next_worker;
        state.next_worker += 1;
        state.live += 1;
        state.largest = state.largest.max(state.live);
        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name(format!("{}-{}", config.thread_name, worker_id))
            .spawn(move || worker_loop(shared, worker_id));

        match spawned {
            Ok(_) => Ok(()),
            Err(err) => {
                state.live -= 1;
                if state.live == 0 {
                    tracing::error!("no worker could be started: {}", err);
                    if let Some(item) = state.queue.pop_back() {
                        return Err(SubmitError {
                            error: PoolError::Spawn(err),
                            item,
                        });
                    }
                }
                tracing::warn!(live = state.live, "failed to grow worker pool: {}", err);
                drop(state);
                self.shared.work_ready.notify_one();
                Ok(())
            }
        }
    }

    /// Stops intake; queued work still runs.
    pub fn shutdown(&self) {
        let mut state = lock(&self.shared.state);
        if state.run_state == RunState::Running {
            state.run_state = RunState::Shutdown;
            tracing::debug!(queued = state.queue.len(), "worker pool shutting down");
        }
        self.try_terminate(&mut state);
        drop(state);
        self.shared.work_ready.notify_all();
    }

    /// Stops intake and returns every queued item that never started.
    /// Running items are left to finish.
    pub fn shutdown_now(&self) -> Vec<W> {
        let mut state = lock(&self.shared.state);
        if state.run_state == RunState::Terminated {
            return Vec::new();
        }
        state.run_state = RunState::Stop;
        let unstarted: Vec<W> = state.queue.drain(..).collect();
        tracing::debug!(unstarted = unstarted.len(), "worker pool stopping");
        self.try_terminate(&mut state);
        drop(state);
        self.shared.work_ready.notify_all();
        unstarted
    }

    pub fn is_shutdown(&self) -> bool {
        lock(&self.shared.state).run_state != RunState::Running
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.shared.state).run_state == RunState::Terminated
    }

    /// Blocks until the pool terminates or `timeout` elapses. Returns whether
    /// it terminated. A pool that was never shut down only ever times out.
    pub fn await_termination(&self, timeout: Duration) -> Result<bool, PoolError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut state = self
            .shared
            .state
            .lock()
            .map_err(|_| PoolError::Poisoned)?;
        while state.run_state != RunState::Terminated {
            match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    let (guard, _) = self
                        .shared
                        .terminated
                        .wait_timeout(state, deadline - now)
                        .map_err(|_| PoolError::Poisoned)?;
                    state = guard;
                }
                None => {
                    state = self
                        .shared
                        .terminated
                        .wait(state)
                        .map_err(|_| PoolError::Poisoned)?;
                }
            }
        }
        Ok(true)
    }

    pub fn stats(&self) -> PoolStats {
        let state = lock(&self.shared.state);
        PoolStats {
            run_state: state.run_state,
            live: state.live,
            idle: state.idle,
            active: state.active,
            queued: state.queue.len(),
            completed: state.completed,
            largest: state.largest,
        }
    }

    fn try_terminate(&self, state: &mut PoolState<W>) {
        if state.live == 0 && state.run_state != RunState::Running {
            state.run_state = RunState::Terminated;
            self.shared.terminated.notify_all();
        }
    }
}

impl<W: Work> Drop for WorkerPool<W> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<W: Work> std::fmt::Debug for WorkerPool<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop<W: Work>(shared: Arc<PoolShared<W>>, worker_id: u64) {
    tracing::trace!(worker = worker_id, "worker started");
    while let Some(item) = next_item(&shared) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| item.execute())) {
            tracing::error!(
                worker = worker_id,
                "work item panicked: {}",
                panic_message(payload.as_ref())
            );
        }
        let mut state = lock(&shared.state);
        state.active -= 1;
        state.completed += 1;
    }
    tracing::trace!(worker = worker_id, "worker exited");
}

/// Waits for the next item. `None` means this worker has retired; the live
/// count was already decremented under the same lock.
fn next_item<W: Work>(shared: &PoolShared<W>) -> Option<W> {
    let config = &shared.config;
    let mut state = lock(&shared.state);
    loop {
        if state.run_state != RunState::Stop {
            if let Some(item) = state.queue.pop_front() {
                state.active += 1;
                return Some(item);
            }
        }
        if state.run_state != RunState::Running {
            return retire(shared, state);
        }

        state.idle += 1;
        if state.live > config.core_size {
            let (guard, waited) = shared
                .work_ready
                .wait_timeout(state, config.keep_alive)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            state.idle -= 1;
            if waited.timed_out() && state.queue.is_empty() && state.live > config.core_size {
                return retire(shared, state);
            }
        } else {
            state = shared
                .work_ready
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.idle -= 1;
        }
    }
}

fn retire<W: Work>(shared: &PoolShared<W>, mut state: MutexGuard<'_, PoolState<W>>) -> Option<W> {
    state.live -= 1;
    if state.live == 0 && state.run_state != RunState::Running {
        state.run_state = RunState::Terminated;
        shared.terminated.notify_all();
    }
    None
}
