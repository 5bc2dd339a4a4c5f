use std::sync::{mpsc as std_mpsc, Mutex};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, oneshot};

use super::{run_isolated, CoordinatorJob, ForegroundCoordinator};
use crate::util::lock;

/// Coordinator backed by a dedicated thread draining an unbounded channel.
///
/// Jobs run strictly in queue order. A panicking job is logged and the loop
/// carries on. Dropping the coordinator closes the channel, lets the loop run
/// what is already queued, and joins the thread.
pub struct EventLoopCoordinator {
    name: String,
    thread_id: ThreadId,
    tx: Mutex<Option<mpsc::UnboundedSender<CoordinatorJob>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl EventLoopCoordinator {
    pub fn new() -> std::io::Result<Self> {
        Self::with_name("deskjob-coordinator")
    }

    pub fn with_name(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<CoordinatorJob>();
        let handle = thread::Builder::new().name(name.clone()).spawn(move || {
            tracing::debug!("coordinator loop started");
            let mut ran: u64 = 0;
            while let Some(job) = rx.blocking_recv() {
                run_isolated(job);
                ran += 1;
            }
            tracing::debug!(jobs = ran, "coordinator loop stopped");
        })?;

        Ok(Self {
            name,
            thread_id: handle.thread().id(),
            tx: Mutex::new(Some(tx)),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs `f` on the coordinator and blocks until it returns. Runs inline
    /// when called on the coordinator thread. Returns `None` if the loop has
    /// stopped or `f` panicked.
    pub fn invoke_and_wait<R, F>(&self, f: F) -> Option<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_coordinator_thread() {
            return Some(f());
        }
        let (done_tx, done_rx) = std_mpsc::sync_channel(1);
        if !self.send(Box::new(move || {
            let _ = done_tx.send(f());
        })) {
            return None;
        }
        done_rx.recv().ok()
    }

    /// Blocks until every job queued before this call has run.
    pub fn flush(&self) -> bool {
        self.invoke_and_wait(|| ()).is_some()
    }

    /// Async form of [`EventLoopCoordinator::flush`].
    pub async fn flush_async(&self) -> bool {
        let (done_tx, done_rx) = oneshot::channel::<()>();
        if !self.send(Box::new(move || {
            let _ = done_tx.send(());
        })) {
            return false;
        }
        done_rx.await.is_ok()
    }

    /// Closes the queue. Jobs already queued still run. Joins the loop
    /// thread unless called from it.
    pub fn shutdown(&self) {
        lock(&self.tx).take();
        if self.is_coordinator_thread() {
            return;
        }
        if let Some(handle) = lock(&self.handle).take() {
            if handle.join().is_err() {
                tracing::error!(name = %self.name, "coordinator thread panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.tx).is_some()
    }

    fn send(&self, job: CoordinatorJob) -> bool {
        match lock(&self.tx).as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => {
                tracing::warn!(name = %self.name, "coordinator is shut down, job dropped");
                false
            }
        }
    }
}

impl ForegroundCoordinator for EventLoopCoordinator {
    fn run_on_coordinator(&self, job: CoordinatorJob) {
        self.send(job);
    }

    fn is_coordinator_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for EventLoopCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EventLoopCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoopCoordinator")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}
