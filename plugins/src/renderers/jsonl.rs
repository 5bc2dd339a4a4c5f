use chrono::Local;
use deskjob_core::render::{LifecycleRenderer, RenderEvent};
use serde_json::{json, Value};

pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        let ts = Local::now().to_rfc3339();
        match event {
            RenderEvent::TaskQueued {
                service,
                task_id,
                title,
                scope,
            } => json!({
                "v": 1,
                "event_type": "task.queued",
                "ts": ts,
                "service": service,
                "task_id": task_id.to_string(),
                "metadata": {
                    "title": title,
                    "blocking_scope": scope,
                }
            }),
            RenderEvent::TaskStarted {
                service,
                task_id,
                title,
            } => json!({
                "v": 1,
                "event_type": "task.start",
                "ts": ts,
                "service": service,
                "task_id": task_id.to_string(),
                "metadata": {
                    "title": title,
                }
            }),
            RenderEvent::TaskProgress {
                service,
                task_id,
                title,
                progress,
                message,
            } => json!({
                "v": 1,
                "event_type": "task.progress",
                "ts": ts,
                "service": service,
                "task_id": task_id.to_string(),
                "progress": progress,
                "metadata": {
                    "title": title,
                    "message": message,
                }
            }),
            RenderEvent::TaskFinished {
                service,
                task_id,
                title,
                state,
                duration_ms,
                error,
            } => json!({
                "v": 1,
                "event_type": "task.end",
                "ts": ts,
                "service": service,
                "task_id": task_id.to_string(),
                "state": state,
                "metadata": {
                    "title": title,
                    "duration_ms": duration_ms,
                    "error": error,
                    "success": *state == deskjob_core::TaskState::Succeeded,
                }
            }),
            RenderEvent::ServiceIdle { service } => json!({
                "v": 1,
                "event_type": "service.idle",
                "ts": ts,
                "service": service,
            }),
        }
    }
}

impl LifecycleRenderer for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn render(&self, event: &RenderEvent) {
        let value = self.event_to_json(event);
        if self.pretty_print {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| "{}".into()));
        } else {
            println!("{}", serde_json::to_string(&value).unwrap_or_else(|_| "{}".into()));
        }
    }
}
