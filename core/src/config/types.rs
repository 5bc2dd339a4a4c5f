use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub service: ServiceSettings,

    #[serde(default)]
    pub coordinator: CoordinatorSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "deskjob_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Worker pool sizing as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSettings {
    #[serde(default = "default_core_size")]
    pub core_size: usize,

    /// 0 means "one per CPU, but never below `core_size`".
    #[serde(default = "default_max_size")]
    pub max_size: usize,

    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,

    #[serde(default = "default_worker_thread_name")]
    pub thread_name: String,
}

fn default_core_size() -> usize {
    3
}

fn default_max_size() -> usize {
    10
}

fn default_keep_alive_ms() -> u64 {
    1_000
}

fn default_worker_thread_name() -> String {
    "deskjob-worker".to_string()
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            core_size: default_core_size(),
            max_size: default_max_size(),
            keep_alive_ms: default_keep_alive_ms(),
            thread_name: default_worker_thread_name(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Name of the service every unbound owner falls back to.
    #[serde(default = "default_service_name")]
    pub default_name: String,

    /// Additional named services, each with its own pool.
    #[serde(default)]
    pub extra: Vec<NamedServiceSettings>,
}

fn default_service_name() -> String {
    "default".to_string()
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_name: default_service_name(),
            extra: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedServiceSettings {
    pub name: String,

    #[serde(flatten)]
    pub pool: PoolSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorKind {
    /// Dedicated coordinator thread.
    #[default]
    EventLoop,
    /// Deliver inline on whichever thread produced the notification.
    Immediate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    #[serde(default)]
    pub kind: CoordinatorKind,

    #[serde(default = "default_coordinator_thread_name")]
    pub thread_name: String,
}

fn default_coordinator_thread_name() -> String {
    "deskjob-coordinator".to_string()
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            kind: CoordinatorKind::default(),
            thread_name: default_coordinator_thread_name(),
        }
    }
}
