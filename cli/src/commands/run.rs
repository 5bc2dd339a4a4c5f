use std::sync::Arc;
use std::time::Duration;

use deskjob_core::config::AppConfig;
use deskjob_core::coordinator;
use deskjob_core::{
    BlockingScope, CliError, Outcome, RenderBridge, ServiceRegistry, Task, TaskContext,
    TaskService,
};
use deskjob_plugins::{build_renderer, RenderFormat};
use serde::Serialize;

use super::cli::RunArgs;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// One task of the simulated workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedTask {
    pub title: String,
    pub steps: u32,
    pub step_ms: u64,
    pub fail: bool,
    pub scope: BlockingScope,
}

impl SimulatedTask {
    /// The body sleeps `step_ms` per step, publishes the step number and
    /// returns the sum of all steps. A failing task bails once it is halfway.
    pub fn into_task(self) -> Task<u64, u32> {
        let SimulatedTask {
            title,
            steps,
            step_ms,
            fail,
            scope,
        } = self;
        Task::<u64, u32>::builder(title)
            .description(format!("{steps} steps of {step_ms}ms"))
            .blocking(scope)
            .user_can_cancel(true)
            .build(move |ctx: &TaskContext<'_, u32>| {
                let mut sum = 0u64;
                for step in 1..=steps {
                    if ctx.is_cancelled() {
                        tracing::debug!(task = %ctx.title(), step, "cancellation observed");
                        break;
                    }
                    std::thread::sleep(Duration::from_millis(step_ms));
                    sum += u64::from(step);
                    ctx.set_progress_of(u64::from(step), u64::from(steps));
                    ctx.set_message(format!("step {step}/{steps}"));
                    ctx.publish(step);
                    if fail && step * 2 >= steps {
                        anyhow::bail!("simulated failure at step {step}");
                    }
                }
                Ok(sum)
            })
    }
}

pub fn plan(args: &RunArgs) -> Vec<SimulatedTask> {
    (0..args.tasks)
        .map(|i| SimulatedTask {
            title: format!("job-{}", i + 1),
            steps: args.steps.max(1),
            step_ms: args.step_ms,
            fail: args.fail_every.is_some_and(|n| n > 0 && (i + 1) % n == 0),
            scope: args.blocking,
        })
        .collect()
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RunSummary {
    pub fn from_outcomes<T>(outcomes: &[Outcome<T>]) -> Self {
        let mut summary = RunSummary::default();
        for outcome in outcomes {
            match outcome {
                Outcome::Succeeded(_) => summary.succeeded += 1,
                Outcome::Failed(_) => summary.failed += 1,
                Outcome::Cancelled => summary.cancelled += 1,
            }
        }
        summary
    }

    /// 0 when every task succeeded, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.failed == 0 && self.cancelled == 0 {
            0
        } else {
            1
        }
    }
}

fn select_service(registry: &ServiceRegistry, name: Option<&str>) -> Result<TaskService, CliError> {
    match name {
        Some(name) => registry
            .task_service(name)
            .ok_or_else(|| CliError::Command(format!("unknown service '{name}'"))),
        None => Ok(registry.default_service()),
    }
}

pub async fn run_cmd(args: RunArgs, format: RenderFormat, cfg: &AppConfig) -> Result<i32, CliError> {
    let registry = Arc::new(ServiceRegistry::from_config(cfg)?);
    let service = select_service(&registry, args.service.as_deref())?;

    let renderer = build_renderer(format, atty::is(atty::Stream::Stderr));
    let bridge = RenderBridge::new(renderer.clone());
    bridge.watch(&service);

    let tasks: Vec<Task<u64, u32>> = plan(&args)
        .into_iter()
        .map(SimulatedTask::into_task)
        .collect();
    tracing::info!(
        service = %service.name(),
        tasks = tasks.len(),
        "submitting workload"
    );
    for task in &tasks {
        bridge.attach(task);
        service.execute_task(task)?;
    }

    let interrupt = {
        let service = service.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted, cancelling tasks");
                service.shutdown_now();
            }
        })
    };
    let cancel_timer = args.cancel_after_ms.map(|ms| {
        let handles: Vec<_> = tasks.iter().map(Task::handle).collect();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let cancelled = handles.iter().filter(|h| h.cancel()).count();
            tracing::info!(cancelled, "cancel timer fired");
        })
    });

    let outcomes = futures::future::join_all(tasks.iter().map(|t| t.completion())).await;
    interrupt.abort();
    if let Some(timer) = cancel_timer {
        timer.abort();
    }

    registry.shutdown_all();
    let terminated = {
        let registry = registry.clone();
        tokio::task::spawn_blocking(move || registry.await_termination_all(SHUTDOWN_GRACE))
            .await
            .map_err(|e| CliError::Command(format!("shutdown join failed: {e}")))??
    };
    if !terminated {
        tracing::warn!("services did not terminate within {:?}", SHUTDOWN_GRACE);
    }
    let foreground = service.coordinator();
    let drained =
        tokio::task::spawn_blocking(move || coordinator::drain(foreground.as_ref(), SHUTDOWN_GRACE))
            .await
            .map_err(|e| CliError::Command(format!("coordinator drain join failed: {e}")))?;
    if !drained {
        tracing::warn!("coordinator did not drain pending notifications");
    }
    renderer.finish();

    let summary = RunSummary::from_outcomes(&outcomes);
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "run finished"
    );
    match format {
        RenderFormat::Jsonl => println!(
            "{}",
            serde_json::json!({ "type": "run.summary", "summary": &summary })
        ),
        RenderFormat::Text | RenderFormat::Progress => println!(
            "{} succeeded, {} failed, {} cancelled",
            summary.succeeded, summary.failed, summary.cancelled
        ),
    }
    Ok(summary.exit_code())
}
