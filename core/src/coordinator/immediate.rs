use super::{run_isolated, CoordinatorJob, ForegroundCoordinator};

/// Runs every job inline on the calling thread.
///
/// Suitable for single-threaded hosts, and for tests that want deliveries to
/// happen synchronously. It owns no thread, so `is_coordinator_thread` is
/// always false and `dispatch` reaches `run_on_coordinator`, which runs the
/// job where it stands.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImmediateCoordinator;

impl ImmediateCoordinator {
    pub fn new() -> Self {
        Self
    }
}

impl ForegroundCoordinator for ImmediateCoordinator {
    fn run_on_coordinator(&self, job: CoordinatorJob) {
        run_isolated(job);
    }

    fn is_coordinator_thread(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_runs_inline() {
        let ran = Arc::new(AtomicBool::new(false));
        let r = ran.clone();
        ImmediateCoordinator::new().run_on_coordinator(Box::new(move || r.store(true, Ordering::SeqCst)));
        assert!(ran.load(Ordering::SeqCst));
    }
}
