use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use super::{run_isolated, CoordinatorJob, ForegroundCoordinator};
use crate::util::lock;

/// Queue drained by a host-owned loop.
///
/// The thread that constructs the coordinator is the coordinator thread; it
/// calls [`PumpedCoordinator::pump`] whenever its own loop gets a turn.
#[derive(Debug)]
pub struct PumpedCoordinator {
    owner: ThreadId,
    queue: Mutex<VecDeque<CoordinatorJobSlot>>,
}

struct CoordinatorJobSlot(CoordinatorJob);

impl std::fmt::Debug for CoordinatorJobSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CoordinatorJob")
    }
}

impl PumpedCoordinator {
    pub fn new() -> Self {
        Self {
            owner: thread::current().id(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub fn pending(&self) -> usize {
        lock(&self.queue).len()
    }

    /// Runs queued jobs until the queue is empty, including jobs queued by the
    /// jobs themselves. Returns how many ran.
    ///
    /// Calling this from any thread other than the owner is a no-op.
    pub fn pump(&self) -> usize {
        if thread::current().id() != self.owner {
            tracing::warn!("pump() called off the coordinator thread, ignored");
            return 0;
        }
        let mut ran = 0;
        loop {
            // release the lock before running, jobs may queue more work
            let next = lock(&self.queue).pop_front();
            match next {
                Some(CoordinatorJobSlot(job)) => {
                    run_isolated(job);
                    ran += 1;
                }
                None => return ran,
            }
        }
    }
}

impl Default for PumpedCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ForegroundCoordinator for PumpedCoordinator {
    fn run_on_coordinator(&self, job: CoordinatorJob) {
        lock(&self.queue).push_back(CoordinatorJobSlot(job));
    }

    fn is_coordinator_thread(&self) -> bool {
        thread::current().id() == self.owner
    }
}
