mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{wait_until, Gate, Recorder, RecordingSurface};
use deskjob_core::{
    BlockingScope, ForegroundCoordinator, ImmediateCoordinator, PoolConfig, PumpedCoordinator,
    ServiceRegistry, Task, TaskMonitor, TaskRef, TaskService, DEFAULT_SERVICE_NAME,
};
use pretty_assertions::assert_eq;

#[test]
fn pumped_coordinator_delivers_only_when_pumped() {
    let coordinator = Arc::new(PumpedCoordinator::new());
    let surface = RecordingSurface::new();
    let service = TaskService::builder("pumped")
        .coordinator(coordinator.clone())
        .surface(surface.clone())
        .build()
        .unwrap();

    let task: Task<u8, u8> = Task::<u8, u8>::builder("modal")
        .blocking(BlockingScope::Application)
        .build(|ctx| {
            ctx.publish(1);
            Ok(2)
        });
    let recorder = Recorder::new();
    task.add_listener(recorder.clone());

    // executing on the coordinator thread arms the blocker inline
    service.execute_task(&task).unwrap();
    assert!(surface.is_blocked("application"));

    task.join();
    assert!(recorder.labels().is_empty());
    assert!(surface.is_blocked("application"));

    assert!(coordinator.pump() >= 3);
    assert_eq!(recorder.labels(), vec!["started", "progress:1", "succeeded:2"]);
    assert!(!surface.is_blocked("application"));
}

#[test]
fn immediate_coordinator_delivers_on_worker_threads() {
    let service = TaskService::builder("inline")
        .coordinator(Arc::new(ImmediateCoordinator::new()))
        .pool(PoolConfig::fixed(1).with_thread_name("inline-worker"))
        .build()
        .unwrap();
    let task: Task<()> = Task::new("here", |_| Ok(()));
    let recorder = Recorder::new();
    task.add_listener(recorder.clone());

    service.execute_task(&task).unwrap();
    task.join();
    assert_eq!(recorder.labels(), vec!["started", "succeeded:()"]);
    assert!(recorder
        .threads()
        .iter()
        .all(|t| t.starts_with("inline-worker")));
}

#[test]
fn monitor_follows_the_oldest_in_flight_task() {
    let service = TaskService::new("monitored", Arc::new(ImmediateCoordinator::new())).unwrap();
    let monitor = TaskMonitor::new();
    monitor.watch(&service);
    let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    monitor.add_listener(Arc::new(move |_: Option<&TaskRef>, new: Option<&TaskRef>| {
        s.lock().unwrap().push(new.map(|t| t.title().to_string()));
    }));

    let (first_gate, second_gate) = (Gate::new(), Gate::new());
    let (g1, g2) = (first_gate.clone(), second_gate.clone());
    let first: Task<()> = Task::new("first", move |_| {
        g1.wait();
        Ok(())
    });
    let second: Task<()> = Task::new("second", move |_| {
        g2.wait();
        Ok(())
    });
    service.execute_task(&first).unwrap();
    service.execute_task(&second).unwrap();
    assert_eq!(monitor.foreground_task(), Some(first.handle()));

    first_gate.open();
    first.join();
    assert_eq!(monitor.foreground_task(), Some(second.handle()));

    second_gate.open();
    second.join();
    assert_eq!(monitor.foreground_task(), None);
    assert_eq!(
        *seen.lock().unwrap(),
        vec![Some("first".to_string()), Some("second".to_string()), None]
    );
    assert!(monitor.unwatch(&service));
}

#[test]
fn registry_routes_owners_to_bound_services() {
    let default = TaskService::new(
        DEFAULT_SERVICE_NAME,
        Arc::new(ImmediateCoordinator::new()),
    )
    .unwrap();
    let registry = ServiceRegistry::new(default.clone());
    let io = registry.create_service("io", PoolConfig::fixed(1)).unwrap();

    struct Window;
    let editor = Arc::new(Window);
    let palette = Arc::new(Window);
    registry.bind_owner(&editor, "io").unwrap();

    let task: Task<()> = Task::new("load", |_| Ok(()));
    registry.service_for(&editor).execute_task(&task).unwrap();
    task.join();
    assert_eq!(task.handle().service_name().as_deref(), Some("io"));
    assert_eq!(registry.service_for(&palette), default);
    assert!(!io.coordinator().is_coordinator_thread());

    drop(editor);
    assert_eq!(registry.bound_owners(), 0);

    registry.shutdown_all();
    assert!(registry
        .await_termination_all(Duration::from_secs(5))
        .unwrap());
    assert!(wait_until(Duration::from_secs(1), || io.is_terminated()));
}
