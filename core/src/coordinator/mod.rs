//! The foreground coordinator: the single logical thread that serializes
//! lifecycle-notification delivery and all blocking operations.
//!
//! The engine depends only on [`ForegroundCoordinator`]. A GUI host plugs in
//! its own event loop; headless hosts pick one of the implementations here:
//!
//! - [`ImmediateCoordinator`] runs every job inline (single-threaded hosts)
//! - [`EventLoopCoordinator`] owns a dedicated thread fed by a channel
//! - [`PumpedCoordinator`] queues jobs until the host drains them with `pump()`

mod event_loop;
mod immediate;
mod pumped;

pub use event_loop::EventLoopCoordinator;
pub use immediate::ImmediateCoordinator;
pub use pumped::PumpedCoordinator;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{CoordinatorKind, CoordinatorSettings};
use crate::error::TaskError;
use crate::util::panic_message;

pub type CoordinatorJob = Box<dyn FnOnce() + Send + 'static>;

pub trait ForegroundCoordinator: Send + Sync {
    /// Queues `job` for execution on the coordinator. Jobs run in the order
    /// they were queued.
    fn run_on_coordinator(&self, job: CoordinatorJob);

    fn is_coordinator_thread(&self) -> bool;
}

/// Runs `job` inline when already on the coordinator, queues it otherwise.
pub fn dispatch(coordinator: &dyn ForegroundCoordinator, job: CoordinatorJob) {
    if coordinator.is_coordinator_thread() {
        run_isolated(job);
    } else {
        coordinator.run_on_coordinator(job);
    }
}

/// Blocks until every job queued on `coordinator` before this call has run.
/// Returns false if that did not happen within `timeout`, which is always the
/// case for a [`PumpedCoordinator`] nobody pumps.
pub fn drain(coordinator: &dyn ForegroundCoordinator, timeout: Duration) -> bool {
    if coordinator.is_coordinator_thread() {
        return true;
    }
    let (tx, rx) = mpsc::channel();
    coordinator.run_on_coordinator(Box::new(move || {
        let _ = tx.send(());
    }));
    rx.recv_timeout(timeout).is_ok()
}

/// Builds the coordinator described by the config file.
pub fn from_settings(
    settings: &CoordinatorSettings,
) -> Result<Arc<dyn ForegroundCoordinator>, TaskError> {
    let coordinator: Arc<dyn ForegroundCoordinator> = match settings.kind {
        CoordinatorKind::EventLoop => {
            Arc::new(EventLoopCoordinator::with_name(settings.thread_name.clone())?)
        }
        CoordinatorKind::Immediate => Arc::new(ImmediateCoordinator::new()),
    };
    Ok(coordinator)
}

/// Runs one job, containing any panic it raises. Returns false if it panicked.
pub(crate) fn run_isolated(job: CoordinatorJob) -> bool {
    isolate("coordinator job", job)
}

/// Runs `f`, logging and swallowing a panic. `what` names the delivery in
/// the log line.
pub(crate) fn isolate<F: FnOnce()>(what: &str, f: F) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(payload) => {
            tracing::error!("{} panicked: {}", what, panic_message(payload.as_ref()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_inline_on_coordinator() {
        let coordinator = PumpedCoordinator::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        dispatch(
            &coordinator,
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        // the creating thread is the coordinator thread, so nothing was queued
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.pending(), 0);
    }

    #[test]
    fn test_dispatch_queues_off_coordinator() {
        let coordinator = Arc::new(PumpedCoordinator::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let (c, h) = (coordinator.clone(), hits.clone());
        std::thread::spawn(move || {
            dispatch(
                c.as_ref(),
                Box::new(move || {
                    h.fetch_add(1, Ordering::SeqCst);
                }),
            )
        })
        .join()
        .unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.pump(), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drain_waits_for_queued_jobs() {
        let coordinator = EventLoopCoordinator::with_name("drain-test").unwrap();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..5 {
            let ran = ran.clone();
            coordinator.run_on_coordinator(Box::new(move || {
                std::thread::sleep(Duration::from_millis(5));
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(drain(&coordinator, Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 5);

        let pumped = PumpedCoordinator::new();
        assert!(!drain(&pumped, Duration::from_millis(20)));
    }

    #[test]
    fn test_from_settings_immediate() {
        let settings = CoordinatorSettings {
            kind: CoordinatorKind::Immediate,
            ..CoordinatorSettings::default()
        };
        let coordinator = from_settings(&settings).unwrap();
        assert!(!coordinator.is_coordinator_thread());
    }

    #[test]
    fn test_run_isolated_contains_panic() {
        assert!(!run_isolated(Box::new(|| panic!("listener blew up"))));
        assert!(run_isolated(Box::new(|| {})));
    }
}
