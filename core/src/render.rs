//! Presentation-side view of the lifecycle.
//!
//! Renderers live outside the engine (see the plugins crate); they receive
//! flattened [`RenderEvent`]s. [`RenderBridge`] turns task and service
//! notifications into those events.

use std::sync::Arc;

use uuid::Uuid;

use crate::blocker::BlockingScope;
use crate::error::WorkFailure;
use crate::service::{TaskService, TasksChanged, TasksListener};
use crate::task::{Task, TaskEvent, TaskListener, TaskRef, TaskState};

/// Output renderer plugin.
pub trait LifecycleRenderer: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn render(&self, event: &RenderEvent);
    /// Called once the host is done rendering, e.g. to clear progress bars.
    fn finish(&self) {}
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderEvent {
    TaskQueued {
        service: String,
        task_id: Uuid,
        title: String,
        scope: BlockingScope,
    },
    TaskStarted {
        service: String,
        task_id: Uuid,
        title: String,
    },
    TaskProgress {
        service: String,
        task_id: Uuid,
        title: String,
        progress: u8,
        message: Option<String>,
    },
    TaskFinished {
        service: String,
        task_id: Uuid,
        title: String,
        state: TaskState,
        duration_ms: Option<u64>,
        error: Option<String>,
    },
    /// The last in-flight task of a service finished.
    ServiceIdle { service: String },
}

impl RenderEvent {
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            RenderEvent::TaskQueued { task_id, .. }
            | RenderEvent::TaskStarted { task_id, .. }
            | RenderEvent::TaskProgress { task_id, .. }
            | RenderEvent::TaskFinished { task_id, .. } => Some(*task_id),
            RenderEvent::ServiceIdle { .. } => None,
        }
    }
}

/// Adapts lifecycle notifications to a [`LifecycleRenderer`].
#[derive(Clone)]
pub struct RenderBridge {
    renderer: Arc<dyn LifecycleRenderer>,
}

impl RenderBridge {
    pub fn new(renderer: Arc<dyn LifecycleRenderer>) -> Self {
        Self { renderer }
    }

    pub fn renderer(&self) -> &Arc<dyn LifecycleRenderer> {
        &self.renderer
    }

    /// Renders queue and idle events for `service`.
    pub fn watch(&self, service: &TaskService) {
        service.add_tasks_listener(Arc::new(self.clone()));
    }

    /// Renders start, progress and finish events for `task`.
    pub fn attach<T, V>(&self, task: &Task<T, V>)
    where
        T: Clone + Send + Sync + 'static,
        V: Send + 'static,
    {
        task.add_listener(Arc::new(self.clone()));
    }

    fn finished(&self, task: &TaskRef, error: Option<&WorkFailure>) {
        self.renderer.render(&RenderEvent::TaskFinished {
            service: task.service_name().unwrap_or_default(),
            task_id: task.id(),
            title: task.title().to_string(),
            state: task.state(),
            duration_ms: task.execution_duration().map(|d| d.as_millis() as u64),
            error: error.map(|e| e.to_string()),
        });
    }
}

impl TasksListener for RenderBridge {
    fn tasks_changed(&self, change: &TasksChanged) {
        for task in change.added() {
            self.renderer.render(&RenderEvent::TaskQueued {
                service: change.service().to_string(),
                task_id: task.id(),
                title: task.title().to_string(),
                scope: task.blocking_scope(),
            });
        }
        if change.new_tasks().is_empty() && !change.old().is_empty() {
            self.renderer.render(&RenderEvent::ServiceIdle {
                service: change.service().to_string(),
            });
        }
    }
}

impl<T, V> TaskListener<T, V> for RenderBridge {
    fn started(&self, event: &TaskEvent<()>) {
        let task = event.source();
        self.renderer.render(&RenderEvent::TaskStarted {
            service: task.service_name().unwrap_or_default(),
            task_id: task.id(),
            title: task.title().to_string(),
        });
    }

    fn progress(&self, event: &TaskEvent<V>) {
        let task = event.source();
        self.renderer.render(&RenderEvent::TaskProgress {
            service: task.service_name().unwrap_or_default(),
            task_id: task.id(),
            title: task.title().to_string(),
            progress: task.progress(),
            message: task.message(),
        });
    }

    fn succeeded(&self, event: &TaskEvent<T>) {
        self.finished(event.source(), None);
    }

    fn failed(&self, event: &TaskEvent<WorkFailure>) {
        self.finished(event.source(), event.value());
    }

    fn cancelled(&self, event: &TaskEvent<()>) {
        self.finished(event.source(), None);
    }
}
