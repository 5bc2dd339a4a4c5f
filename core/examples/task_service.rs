//! Task service walkthrough
//!
//! Runs a few tasks on a service backed by its own coordinator thread, with
//! a blocking task, a failing task and a cancelled one.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use deskjob_core::{
    BlockingScope, EventLoopCoordinator, HeadlessSurface, Outcome, Task, TaskEvent, TaskListener,
    TaskMonitor, TaskRef, TaskService, TasksChanged, WorkFailure,
};

struct Printer;

impl TaskListener<u64, u64> for Printer {
    fn started(&self, event: &TaskEvent<()>) {
        println!("▶ {} started", event.source().title());
    }

    fn progress(&self, event: &TaskEvent<u64>) {
        if let Some(chunk) = event.value() {
            println!("  {} chunk {} ({}%)", event.source().title(), chunk, event.source().progress());
        }
    }

    fn succeeded(&self, event: &TaskEvent<u64>) {
        println!("✓ {} = {:?}", event.source().title(), event.value());
    }

    fn failed(&self, event: &TaskEvent<WorkFailure>) {
        println!("✗ {}: {:?}", event.source().title(), event.value());
    }

    fn cancelled(&self, event: &TaskEvent<()>) {
        println!("⊘ {} cancelled", event.source().title());
    }
}

fn chunked_sum(title: &str, chunks: u64) -> Task<u64, u64> {
    Task::<u64, u64>::builder(title)
        .description("sums numbers in chunks")
        .user_can_cancel(true)
        .build(move |ctx| {
            let mut total = 0;
            for chunk in 0..chunks {
                if ctx.is_cancelled() {
                    break;
                }
                total += (chunk * 1_000..(chunk + 1) * 1_000).sum::<u64>();
                ctx.set_progress_of(chunk + 1, chunks);
                ctx.publish(chunk);
                std::thread::sleep(Duration::from_millis(20));
            }
            Ok(total)
        })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let coordinator = Arc::new(EventLoopCoordinator::new()?);
    let surface = Arc::new(HeadlessSurface::new());
    let service = TaskService::builder("example")
        .coordinator(coordinator.clone())
        .surface(surface.clone())
        .build()?;

    service.add_tasks_listener(Arc::new(|change: &TasksChanged| {
        println!("  [{}] in flight: {}", change.service(), change.new_tasks().len());
    }));
    let monitor = TaskMonitor::new();
    monitor.watch(&service);
    monitor.add_listener(Arc::new(|_: Option<&TaskRef>, new: Option<&TaskRef>| {
        println!("  foreground → {:?}", new.map(|t| t.title().to_string()));
    }));

    let modal: Task<u64, u64> = Task::<u64, u64>::builder("modal save")
        .blocking(BlockingScope::Window)
        .build(|ctx| {
            ctx.set_message("writing");
            std::thread::sleep(Duration::from_millis(50));
            Ok(1)
        });
    let sum = chunked_sum("sum", 5);
    let doomed = chunked_sum("doomed", 50);
    let broken: Task<u64, u64> = Task::new("broken", |_| anyhow::bail!("no such file"));

    for task in [&modal, &sum, &doomed, &broken] {
        task.add_listener(Arc::new(Printer));
        service.execute_task(task)?;
    }

    coordinator.flush();
    println!("  blocked while saving: {:?}", surface.blocked_elements());

    std::thread::sleep(Duration::from_millis(60));
    doomed.cancel();

    for task in [&modal, &sum, &doomed, &broken] {
        match task.join() {
            Outcome::Succeeded(v) => println!("{} -> {}", task.title(), v),
            Outcome::Failed(e) => println!("{} -> failed: {}", task.title(), e),
            Outcome::Cancelled => println!("{} -> cancelled", task.title()),
        }
    }

    service.shutdown();
    service.await_termination(Duration::from_secs(5))?;
    coordinator.flush();
    println!("  blocked after shutdown: {:?}", surface.blocked_elements());
    Ok(())
}
