mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{init_tracing, wait_until, Gate, Recorder, RecordingSurface, COORDINATOR};
use deskjob_core::{
    BlockerPhase, BlockingScope, EventLoopCoordinator, ForegroundCoordinator,
    ImmediateCoordinator, Outcome, PoolConfig, Task, TaskError, TaskRef, TaskService, TaskState,
    TasksChanged,
};
use pretty_assertions::assert_eq;

fn event_loop() -> Arc<EventLoopCoordinator> {
    Arc::new(EventLoopCoordinator::with_name(COORDINATOR).unwrap())
}

fn service_on(
    coordinator: &Arc<EventLoopCoordinator>,
    surface: Arc<RecordingSurface>,
    pool: PoolConfig,
) -> TaskService {
    TaskService::builder("test")
        .coordinator(coordinator.clone())
        .surface(surface)
        .pool(pool)
        .build()
        .unwrap()
}

#[test]
fn progress_then_exactly_one_terminal_notification_on_coordinator() {
    init_tracing();
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());

    let task: Task<u32, u32> = Task::new("count", |ctx| {
        for i in 1..=5 {
            ctx.publish(i);
        }
        Ok(15)
    });
    let recorder = Recorder::new();
    task.add_listener(recorder.clone());

    service.execute_task(&task).unwrap();
    assert_eq!(task.join().into_value(), Some(15));
    assert!(coordinator.flush());

    assert_eq!(
        recorder.labels(),
        vec![
            "started",
            "progress:1",
            "progress:2",
            "progress:3",
            "progress:4",
            "progress:5",
            "succeeded:15",
        ]
    );
    assert!(recorder.threads().iter().all(|t| t == COORDINATOR));
}

#[test]
fn failed_and_panicking_bodies_notify_failed_once() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());

    let failing: Task<u32> = Task::new("fail", |_| anyhow::bail!("no disk"));
    let panicking: Task<u32> = Task::new("panic", |_| panic!("bad index"));
    let (r1, r2) = (Recorder::new(), Recorder::new());
    failing.add_listener(r1.clone());
    panicking.add_listener(r2.clone());

    service.execute_task(&failing).unwrap();
    service.execute_task(&panicking).unwrap();
    assert!(matches!(failing.join(), Outcome::Failed(_)));
    assert!(matches!(panicking.join(), Outcome::Failed(f) if f.is_panic()));
    coordinator.flush();

    assert_eq!(r1.labels(), vec!["started", "failed:no disk"]);
    assert_eq!(r2.terminal_count(), 1);
    assert!(service.tasks().is_empty());
}

#[test]
fn terminal_state_is_final_and_cancel_is_noop() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let task: Task<&'static str> = Task::new("done", |_| Ok("ok"));
    let recorder = Recorder::new();
    task.add_listener(recorder.clone());

    service.execute_task(&task).unwrap();
    task.join();
    assert!(!task.cancel());
    coordinator.flush();

    assert_eq!(task.state(), TaskState::Succeeded);
    assert_eq!(task.result(), Some("ok"));
    assert_eq!(recorder.terminal_count(), 1);
}

#[test]
fn snapshot_lists_concurrent_submissions_and_is_independent() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let gate = Gate::new();

    let tasks: Vec<Task<usize>> = (0..8)
        .map(|i| {
            let gate = gate.clone();
            Task::new(format!("gated-{i}"), move |_| {
                gate.wait();
                Ok(i)
            })
        })
        .collect();

    thread::scope(|s| {
        for task in &tasks {
            let service = &service;
            s.spawn(move || service.execute_task(task).unwrap());
        }
    });

    let mut snapshot = service.tasks();
    assert_eq!(snapshot.len(), 8);
    snapshot.clear();
    assert_eq!(service.tasks().len(), 8);
    for task in &tasks {
        assert!(service.tasks().contains(&task.handle()));
    }

    gate.open();
    for task in &tasks {
        task.join();
    }
    assert!(service.tasks().is_empty());
}

#[test]
fn blocking_task_blocks_once_and_unblocks_once_on_coordinator() {
    let coordinator = event_loop();
    let surface = RecordingSurface::new();
    let service = service_on(&coordinator, surface.clone(), PoolConfig::default());
    let gate = Gate::new();
    let g = gate.clone();

    let task: Task<()> = Task::<()>::builder("save")
        .blocking(BlockingScope::Window)
        .block_target("editor")
        .build(move |_| {
            g.wait();
            Ok(())
        });
    service.execute_task(&task).unwrap();

    coordinator.flush();
    assert!(surface.is_blocked("window:editor"));
    assert_eq!(task.input_blocker().unwrap().phase(), BlockerPhase::Blocked);

    gate.open();
    task.join();
    coordinator.flush();

    let calls = surface.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].blocked);
    assert!(!calls[1].blocked);
    assert_eq!(calls[0].elements, vec!["window:editor".to_string()]);
    assert_eq!(calls[1].elements, calls[0].elements);
    assert!(calls.iter().all(|c| c.thread == COORDINATOR));
    assert!(!surface.is_blocked("window:editor"));
    assert_eq!(task.input_blocker().unwrap().phase(), BlockerPhase::Released);
}

#[test]
fn dropped_service_still_unblocks_on_coordinator() {
    let coordinator = event_loop();
    let surface = RecordingSurface::new();
    let service = service_on(&coordinator, surface.clone(), PoolConfig::default());
    let gate = Gate::new();
    let g = gate.clone();

    let task: Task<()> = Task::<()>::builder("orphan")
        .blocking(BlockingScope::Window)
        .build(move |_| {
            g.wait();
            Ok(())
        });
    service.execute_task(&task).unwrap();
    coordinator.flush();
    drop(service);

    gate.open();
    task.join();
    coordinator.flush();

    let calls = surface.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| c.thread == COORDINATOR));
    assert_eq!(task.input_blocker().unwrap().phase(), BlockerPhase::Released);
}

#[test]
fn unscoped_task_never_touches_surface() {
    let coordinator = event_loop();
    let surface = RecordingSurface::new();
    let service = service_on(&coordinator, surface.clone(), PoolConfig::default());
    let task: Task<()> = Task::new("plain", |_| Ok(()));
    service.execute_task(&task).unwrap();
    task.join();
    coordinator.flush();
    assert!(surface.calls().is_empty());
    assert!(task.input_blocker().is_none());
}

#[test]
fn resubmission_is_invalid_state() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let task: Task<()> = Task::new("once", |_| Ok(()));
    service.execute_task(&task).unwrap();
    let err = service.execute_task(&task).unwrap_err();
    assert!(matches!(err, TaskError::InvalidState(_)));
    task.join();

    let cancelled: Task<()> = Task::new("cancelled", |_| Ok(()));
    cancelled.cancel();
    assert!(matches!(
        service.execute_task(&cancelled),
        Err(TaskError::InvalidState(_))
    ));
}

#[test]
fn await_termination_reports_drain_and_timeout() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let gate = Gate::new();
    let g = gate.clone();
    let task: Task<()> = Task::new("slow", move |_| {
        g.wait();
        Ok(())
    });
    service.execute_task(&task).unwrap();
    service.shutdown();

    assert!(service.is_shutdown());
    assert!(!service.await_termination(Duration::from_millis(50)).unwrap());
    assert!(!service.is_terminated());

    gate.open();
    assert!(service.await_termination(Duration::from_secs(5)).unwrap());
    assert!(service.is_terminated());
    assert_eq!(task.state(), TaskState::Succeeded);
}

#[test]
fn await_termination_on_coordinator_thread_is_invalid_state() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let s = service.clone();
    let result = coordinator
        .invoke_and_wait(move || s.await_termination(Duration::from_millis(10)))
        .unwrap();
    assert!(matches!(result, Err(TaskError::InvalidState(_))));
}

#[test]
fn single_worker_runs_tasks_in_submission_order() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::fixed(1));
    let log = Arc::new(Mutex::new(Vec::new()));

    let tasks: Vec<Task<()>> = (0..3)
        .map(|i| {
            let log = log.clone();
            Task::new(format!("step-{i}"), move |_| {
                log.lock().unwrap().push(format!("start {i}"));
                thread::sleep(Duration::from_millis(10));
                log.lock().unwrap().push(format!("end {i}"));
                Ok(())
            })
        })
        .collect();
    for task in &tasks {
        service.execute_task(task).unwrap();
    }
    for task in &tasks {
        task.join();
    }

    assert_eq!(
        *log.lock().unwrap(),
        vec!["start 0", "end 0", "start 1", "end 1", "start 2", "end 2"]
    );
}

#[test]
fn tasks_changed_reports_add_and_remove() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let changes: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let c = changes.clone();
    service.add_tasks_listener(Arc::new(move |change: &TasksChanged| {
        assert_eq!(change.service(), "test");
        c.lock()
            .unwrap()
            .push((change.old().len(), change.new_tasks().len()));
    }));

    let task: Task<()> = Task::new("observed", |_| Ok(()));
    service.execute_task(&task).unwrap();
    task.join();
    coordinator.flush();

    assert_eq!(*changes.lock().unwrap(), vec![(0, 1), (1, 0)]);
}

type Chain = Arc<Mutex<Vec<(u64, Vec<TaskRef>, Vec<TaskRef>)>>>;

fn record_chain(service: &TaskService) -> Chain {
    let chain: Chain = Arc::new(Mutex::new(Vec::new()));
    let c = chain.clone();
    service.add_tasks_listener(Arc::new(move |change: &TasksChanged| {
        c.lock().unwrap().push((
            change.sequence(),
            change.old().to_vec(),
            change.new_tasks().to_vec(),
        ));
    }));
    chain
}

/// Submits `n` gated tasks from `n` threads, lets them all finish at once
/// and checks that listeners saw one unbroken chain ending empty.
fn assert_unbroken_chain(service: &TaskService, settle: impl Fn(), n: usize) {
    let chain = record_chain(service);
    let gate = Gate::new();
    let tasks: Vec<Task<usize>> = (0..n)
        .map(|i| {
            let gate = gate.clone();
            Task::new(format!("churn-{i}"), move |_| {
                gate.wait();
                Ok(i)
            })
        })
        .collect();

    thread::scope(|s| {
        for task in &tasks {
            s.spawn(move || service.execute_task(task).unwrap());
        }
    });
    gate.open();
    for task in &tasks {
        task.join();
    }
    settle();
    assert!(wait_until(Duration::from_secs(5), || chain.lock().unwrap().len() == 2 * n));

    let chain = chain.lock().unwrap();
    let sequences: Vec<u64> = chain.iter().map(|(seq, _, _)| *seq).collect();
    assert_eq!(sequences, (0..2 * n as u64).collect::<Vec<_>>());
    assert!(chain[0].1.is_empty());
    for pair in chain.windows(2) {
        assert_eq!(pair[1].1, pair[0].2);
    }
    assert!(chain.last().unwrap().2.is_empty());
    assert!(service.tasks().is_empty());
}

#[test]
fn concurrent_changes_reach_listeners_in_registry_order() {
    let coordinator = event_loop();
    for _ in 0..50 {
        let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
        assert_unbroken_chain(&service, || {
            coordinator.flush();
        }, 8);
    }
}

#[test]
fn concurrent_changes_stay_ordered_with_inline_delivery() {
    for _ in 0..50 {
        let service = TaskService::builder("inline")
            .coordinator(Arc::new(ImmediateCoordinator::new()))
            .build()
            .unwrap();
        assert_unbroken_chain(&service, || {}, 8);
    }
}

#[test]
fn panicking_subscribers_never_block_deregistration() {
    let coordinator = event_loop();
    let surface = RecordingSurface::new();
    let service = service_on(&coordinator, surface.clone(), PoolConfig::default());
    service.add_tasks_listener(Arc::new(|_: &TasksChanged| panic!("listener bug")));
    let after = Arc::new(AtomicUsize::new(0));
    let a = after.clone();
    service.add_tasks_listener(Arc::new(move |_: &TasksChanged| {
        a.fetch_add(1, Ordering::SeqCst);
    }));

    let task: Task<()> = Task::<()>::builder("guarded")
        .blocking(BlockingScope::Application)
        .build(|_| Ok(()));
    service.execute_task(&task).unwrap();
    task.join();
    coordinator.flush();

    assert!(service.tasks().is_empty());
    assert_eq!(after.load(Ordering::SeqCst), 2);
    assert!(!surface.is_blocked("application"));
    assert!(coordinator.is_running());
}

#[test]
fn shutdown_now_returns_and_cancels_unstarted_tasks() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::fixed(1));
    let gate = Gate::new();
    let g = gate.clone();
    let running: Task<()> = Task::new("running", move |_| {
        g.wait();
        Ok(())
    });
    let queued: Vec<Task<()>> = (0..2)
        .map(|i| Task::new(format!("queued-{i}"), |_| Ok(())))
        .collect();

    service.execute_task(&running).unwrap();
    assert!(wait_until(Duration::from_secs(5), || running.state()
        == TaskState::Running));
    for task in &queued {
        service.execute_task(task).unwrap();
    }

    let unstarted = service.shutdown_now();
    assert_eq!(unstarted.len(), 2);
    for task in &queued {
        assert!(unstarted.contains(&task.handle()));
        assert_eq!(task.state(), TaskState::Cancelled);
    }
    assert!(running.handle().is_cancel_requested());

    gate.open();
    assert!(running.join().is_cancelled());
    assert!(service.await_termination(Duration::from_secs(5)).unwrap());
    assert!(service.tasks().is_empty());
}

#[test]
fn submission_after_shutdown_is_rejected_and_cancelled() {
    let coordinator = event_loop();
    let surface = RecordingSurface::new();
    let service = service_on(&coordinator, surface.clone(), PoolConfig::default());
    service.shutdown();

    let task: Task<()> = Task::<()>::builder("late")
        .blocking(BlockingScope::Application)
        .build(|_| Ok(()));
    let recorder = Recorder::new();
    task.add_listener(recorder.clone());

    let err = service.execute_task(&task).unwrap_err();
    assert!(matches!(err, TaskError::Rejected { ref service } if service == "test"));
    assert!(task.join().is_cancelled());
    coordinator.flush();

    assert_eq!(recorder.labels(), vec!["cancelled"]);
    assert!(service.tasks().is_empty());
    assert!(!surface.is_blocked("application"));
}

#[test]
fn cooperative_cancel_of_running_task() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let task: Task<u32, u32> = Task::new("loop", |ctx| {
        let mut n = 0;
        while !ctx.is_cancelled() {
            n += 1;
            ctx.set_progress((n % 100) as u8);
            thread::sleep(Duration::from_millis(1));
        }
        // published after the cancel request, still delivered
        ctx.publish(n);
        Ok(n)
    });
    let recorder = Recorder::new();
    task.add_listener(recorder.clone());

    service.execute_task(&task).unwrap();
    assert!(wait_until(Duration::from_secs(5), || task.state()
        == TaskState::Running));
    assert!(task.cancel());
    assert!(task.join().is_cancelled());
    assert_eq!(task.result(), None);
    coordinator.flush();

    let labels = recorder.labels();
    assert_eq!(labels.first().map(String::as_str), Some("started"));
    assert!(labels[1].starts_with("progress:"));
    assert_eq!(labels.last().map(String::as_str), Some("cancelled"));
    assert_eq!(recorder.terminal_count(), 1);
}

#[tokio::test]
async fn completion_resolves_asynchronously() {
    let coordinator = event_loop();
    let service = service_on(&coordinator, RecordingSurface::new(), PoolConfig::default());
    let task: Task<String> = Task::new("async", |ctx| Ok(format!("hello from {}", ctx.title())));
    service.execute_task(&task).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(5), task.completion())
        .await
        .unwrap();
    assert_eq!(outcome.into_value().as_deref(), Some("hello from async"));
    assert!(coordinator.flush_async().await);
}

#[test]
fn coordinator_is_the_only_delivery_thread() {
    let coordinator = event_loop();
    assert!(!coordinator.is_coordinator_thread());
    let on_loop = coordinator
        .invoke_and_wait({
            let c = coordinator.clone();
            move || c.is_coordinator_thread()
        })
        .unwrap();
    assert!(on_loop);
}
