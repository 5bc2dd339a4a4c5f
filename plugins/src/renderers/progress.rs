use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use deskjob_core::render::{LifecycleRenderer, RenderEvent};
use deskjob_core::task::TaskState;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use uuid::Uuid;

/// Visual progress for task execution
///
/// One overall bar counting finished tasks, plus one bar per in-flight task
/// tracking its reported percentage.
pub struct ProgressRendererPlugin {
    multi: MultiProgress,
    overall: ProgressBar,
    task_bars: Mutex<HashMap<Uuid, ProgressBar>>,
    enabled: bool,
}

fn overall_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} tasks ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▓▒░  ")
}

fn task_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} {bar:20.green/white} {pos:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
}

impl ProgressRendererPlugin {
    /// `enabled = false` renders nothing (for non-tty output).
    pub fn new(enabled: bool) -> Self {
        let target = if enabled {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        Self::with_draw_target(target, enabled)
    }

    fn with_draw_target(target: ProgressDrawTarget, enabled: bool) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = if enabled {
            multi.add(ProgressBar::new(0))
        } else {
            ProgressBar::hidden()
        };
        overall.set_style(overall_style());
        overall.set_message("Waiting for tasks...");
        Self {
            multi,
            overall,
            task_bars: Mutex::new(HashMap::new()),
            enabled,
        }
    }

    fn bars(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, ProgressBar>> {
        self.task_bars
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl LifecycleRenderer for ProgressRendererPlugin {
    fn name(&self) -> &str {
        "progress-renderer"
    }

    fn format(&self) -> &str {
        "progress"
    }

    fn render(&self, event: &RenderEvent) {
        if !self.enabled {
            return;
        }
        match event {
            RenderEvent::TaskQueued { task_id, title, .. } => {
                self.overall.inc_length(1);
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(task_style());
                bar.set_message(format!("⏳ {}", title));
                self.bars().insert(*task_id, bar);
            }
            RenderEvent::TaskStarted { task_id, title, .. } => {
                if let Some(bar) = self.bars().get(task_id) {
                    bar.set_message(format!("▶ {}", title));
                    bar.enable_steady_tick(Duration::from_millis(100));
                }
            }
            RenderEvent::TaskProgress {
                task_id,
                title,
                progress,
                message,
                ..
            } => {
                if let Some(bar) = self.bars().get(task_id) {
                    bar.set_position(u64::from(*progress));
                    match message {
                        Some(msg) => bar.set_message(format!("▶ {}: {}", title, msg)),
                        None => bar.set_message(format!("▶ {}", title)),
                    }
                }
            }
            RenderEvent::TaskFinished {
                task_id,
                title,
                state,
                duration_ms,
                ..
            } => {
                if let Some(bar) = self.bars().remove(task_id) {
                    let icon = match state {
                        TaskState::Succeeded => "✅",
                        TaskState::Cancelled => "⊘",
                        _ => "❌",
                    };
                    bar.finish_with_message(format!(
                        "{} {} ({}ms)",
                        icon,
                        title,
                        duration_ms.unwrap_or(0)
                    ));
                }
                self.overall.inc(1);
            }
            RenderEvent::ServiceIdle { service } => {
                self.overall.set_message(format!("{} idle", service));
            }
        }
    }

    fn finish(&self) {
        if self.enabled {
            self.overall
                .finish_with_message("✅ All tasks completed".to_string());
        }
    }
}

impl Drop for ProgressRendererPlugin {
    fn drop(&mut self) {
        // Ensure all bars are cleaned up
        for (_, bar) in self.bars().drain() {
            bar.finish_and_clear();
        }
    }
}
