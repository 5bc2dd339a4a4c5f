//! Foreground-task tracking for status bars and progress indicators.
//!
//! A [`TaskMonitor`] watches one or more services and picks the task a UI
//! should surface: the oldest in-flight task, unless the host pinned
//! another one with [`TaskMonitor::set_foreground_task`].

use std::sync::{Arc, Mutex, RwLock};

use crate::coordinator::isolate;
use crate::service::{TaskService, TasksChanged, TasksListener};
use crate::task::TaskRef;
use crate::util::{lock, read, write};

/// Observer of foreground-task changes. Called on the coordinator.
pub trait ForegroundTaskListener: Send + Sync {
    fn foreground_task_changed(&self, old: Option<&TaskRef>, new: Option<&TaskRef>);
}

impl<F> ForegroundTaskListener for F
where
    F: Fn(Option<&TaskRef>, Option<&TaskRef>) + Send + Sync,
{
    fn foreground_task_changed(&self, old: Option<&TaskRef>, new: Option<&TaskRef>) {
        self(old, new)
    }
}

#[derive(Default)]
struct MonitorState {
    tasks: Vec<TaskRef>,
    foreground: Option<TaskRef>,
}

#[derive(Default)]
pub struct TaskMonitor {
    state: Mutex<MonitorState>,
    listeners: RwLock<Vec<Arc<dyn ForegroundTaskListener>>>,
}

impl TaskMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Subscribes this monitor to `service`'s tasks-changed notifications.
    pub fn watch(self: &Arc<Self>, service: &TaskService) {
        service.add_tasks_listener(self.clone());
    }

    pub fn unwatch(self: &Arc<Self>, service: &TaskService) -> bool {
        let me: Arc<dyn TasksListener> = self.clone();
        service.remove_tasks_listener(&me)
    }

    pub fn foreground_task(&self) -> Option<TaskRef> {
        lock(&self.state).foreground.clone()
    }

    /// Tasks seen across every watched service, oldest first.
    pub fn tasks(&self) -> Vec<TaskRef> {
        lock(&self.state).tasks.clone()
    }

    /// Pins `task` as the foreground task until it finishes. `None` falls
    /// back to the oldest tracked task.
    pub fn set_foreground_task(&self, task: Option<TaskRef>) {
        let (old, new) = {
            let mut state = lock(&self.state);
            let old = state.foreground.clone();
            state.foreground = match task {
                Some(task) if !task.is_done() => Some(task),
                _ => state.tasks.first().cloned(),
            };
            (old, state.foreground.clone())
        };
        self.fire(old, new);
    }

    pub fn add_listener(&self, listener: Arc<dyn ForegroundTaskListener>) {
        write(&self.listeners).push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ForegroundTaskListener>) -> bool {
        let mut listeners = write(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    fn fire(&self, old: Option<TaskRef>, new: Option<TaskRef>) {
        if old == new {
            return;
        }
        let listeners = read(&self.listeners).clone();
        for listener in listeners {
            isolate("foreground listener", || {
                listener.foreground_task_changed(old.as_ref(), new.as_ref())
            });
        }
    }
}

impl TasksListener for TaskMonitor {
    fn tasks_changed(&self, change: &TasksChanged) {
        let (old, new) = {
            let mut state = lock(&self.state);
            let removed = change.removed();
            state.tasks.retain(|t| !removed.contains(t));
            for task in change.added() {
                if !state.tasks.contains(&task) {
                    state.tasks.push(task);
                }
            }

            let old = state.foreground.clone();
            let keep = old
                .as_ref()
                .is_some_and(|fg| state.tasks.contains(fg));
            if !keep {
                state.foreground = state.tasks.first().cloned();
            }
            (old, state.foreground.clone())
        };
        self.fire(old, new);
    }
}

impl std::fmt::Debug for TaskMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("TaskMonitor")
            .field("tasks", &state.tasks.len())
            .field("foreground", &state.foreground)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    fn handle(title: &str) -> TaskRef {
        let task: Task<()> = Task::new(title, |_| Ok(()));
        task.handle()
    }

    #[test]
    fn test_oldest_task_is_foreground() {
        let monitor = TaskMonitor::new();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let c = changes.clone();
        monitor.add_listener(Arc::new(
            move |_: Option<&TaskRef>, new: Option<&TaskRef>| {
                c.lock()
                    .unwrap()
                    .push(new.map(|t| t.title().to_string()));
            },
        ));

        let (a, b) = (handle("a"), handle("b"));
        monitor.tasks_changed(&TasksChanged::new("s", vec![], vec![a.clone()]));
        monitor.tasks_changed(&TasksChanged::new(
            "s",
            vec![a.clone()],
            vec![a.clone(), b.clone()],
        ));
        assert_eq!(monitor.foreground_task(), Some(a.clone()));

        monitor.tasks_changed(&TasksChanged::new("s", vec![a.clone(), b.clone()], vec![b.clone()]));
        assert_eq!(monitor.foreground_task(), Some(b.clone()));
        monitor.tasks_changed(&TasksChanged::new("s", vec![b], vec![]));
        assert_eq!(monitor.foreground_task(), None);

        assert_eq!(
            *changes.lock().unwrap(),
            vec![Some("a".to_string()), Some("b".to_string()), None]
        );
    }

    #[test]
    fn test_pinned_task_survives_additions() {
        let monitor = TaskMonitor::new();
        let (a, b) = (handle("a"), handle("b"));
        monitor.tasks_changed(&TasksChanged::new("s", vec![], vec![a.clone(), b.clone()]));
        monitor.set_foreground_task(Some(b.clone()));
        let c = handle("c");
        monitor.tasks_changed(&TasksChanged::new(
            "s",
            vec![a.clone(), b.clone()],
            vec![a.clone(), b.clone(), c],
        ));
        assert_eq!(monitor.foreground_task(), Some(b));
        monitor.set_foreground_task(None);
        assert_eq!(monitor.foreground_task(), Some(a));
    }
}
