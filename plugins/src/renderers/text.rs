use deskjob_core::render::{LifecycleRenderer, RenderEvent};
use deskjob_core::task::TaskState;

use super::short_id;

pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn status(&self, state: TaskState) -> &'static str {
        match (state, self.ascii_only) {
            (TaskState::Succeeded, true) => "OK",
            (TaskState::Succeeded, false) => "SUCCESS",
            (TaskState::Failed, true) => "FAIL",
            (TaskState::Failed, false) => "FAILED",
            (TaskState::Cancelled, true) => "CANCEL",
            (TaskState::Cancelled, false) => "CANCELLED",
            (other, _) => other.as_str(),
        }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::TaskQueued {
                service,
                task_id,
                title,
                scope,
            } => format!(
                "TASK QUEUED {} (task {}, {}, blocks {})",
                service,
                short_id(task_id),
                title,
                scope
            ),
            RenderEvent::TaskStarted {
                service,
                task_id,
                title,
            } => format!("TASK START {} (task {}, {})", service, short_id(task_id), title),
            RenderEvent::TaskProgress {
                service,
                task_id,
                title,
                progress,
                message,
            } => {
                let mut line = format!(
                    "TASK PROGRESS {} (task {}, {}, {}%)",
                    service,
                    short_id(task_id),
                    title,
                    progress
                );
                if let Some(msg) = message {
                    line.push_str(&format!(": {}", msg));
                }
                line
            }
            RenderEvent::TaskFinished {
                service,
                task_id,
                title,
                state,
                duration_ms,
                error,
            } => {
                let mut line = format!(
                    "TASK END {} (task {}, {}, status {}",
                    service,
                    short_id(task_id),
                    title,
                    self.status(*state)
                );
                if let Some(ms) = duration_ms {
                    line.push_str(&format!(", duration {}ms", ms));
                }
                line.push(')');
                if let Some(err) = error {
                    line.push_str(&format!(": {}", err));
                }
                line
            }
            RenderEvent::ServiceIdle { service } => format!("SERVICE IDLE {}", service),
        }
    }
}

impl LifecycleRenderer for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        println!("{}", self.format_event(event));
    }
}
