use std::time::Duration;

use crate::config::PoolSettings;
use crate::error::TaskError;

/// Sizing of a [`super::WorkerPool`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Workers that stay alive while idle.
    pub core_size: usize,
    /// Upper bound on live workers, reached only under load.
    pub max_size: usize,
    /// How long a non-core worker may idle before it exits.
    pub keep_alive: Duration,
    /// Worker threads are named `{thread_name}-{n}`.
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_size: 3,
            max_size: 10,
            keep_alive: Duration::from_secs(1),
            thread_name: "deskjob-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// A pool of exactly `size` workers.
    pub fn fixed(size: usize) -> Self {
        Self {
            core_size: size,
            max_size: size,
            ..Self::default()
        }
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Converts file settings, resolving `max_size = 0` to the CPU count.
    pub fn from_settings(settings: &PoolSettings) -> Result<Self, TaskError> {
        let max_size = match settings.max_size {
            0 => num_cpus::get().max(settings.core_size).max(1),
            n => n,
        };
        let config = Self {
            core_size: settings.core_size,
            max_size,
            keep_alive: Duration::from_millis(settings.keep_alive_ms),
            thread_name: settings.thread_name.clone(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TaskError> {
        if self.max_size == 0 {
            return Err(TaskError::InvalidArgument(
                "pool max_size must be at least 1".into(),
            ));
        }
        if self.core_size > self.max_size {
            return Err(TaskError::InvalidArgument(format!(
                "pool core_size ({}) exceeds max_size ({})",
                self.core_size, self.max_size
            )));
        }
        if self.thread_name.trim().is_empty() {
            return Err(TaskError::InvalidArgument(
                "pool thread_name must not be empty".into(),
            ));
        }
        Ok(())
    }
}
