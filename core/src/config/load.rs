use std::path::{Path, PathBuf};

use anyhow::Context;

use super::types::AppConfig;

/// Get the default deskjob data directory: ~/.deskjob
pub fn get_deskjob_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".deskjob"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.deskjob/config.toml (highest)
    let data_dir = get_deskjob_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let mut cfg = if user_config.exists() {
        load_from(&user_config)?
    } else if local_config.exists() {
        load_from(local_config)?
    } else {
        AppConfig::default()
    };

    // Log files go under the data directory unless configured
    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_ref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg)?;
    Ok(cfg)
}

/// Loads exactly `path`, without environment overrides.
pub fn load_from(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let path = path.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    toml::from_str::<AppConfig>(&s).with_context(|| format!("parsing config {}", path.display()))
}

pub fn apply_env_overrides(cfg: &mut AppConfig) -> anyhow::Result<()> {
    apply_overrides(cfg, |key| std::env::var(key).ok())
}

fn apply_overrides(
    cfg: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let value = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = value("DESKJOB_POOL_CORE_SIZE") {
        cfg.pool.core_size = v
            .trim()
            .parse()
            .with_context(|| format!("DESKJOB_POOL_CORE_SIZE must be a number, got '{v}'"))?;
    }
    if let Some(v) = value("DESKJOB_POOL_MAX_SIZE") {
        cfg.pool.max_size = v
            .trim()
            .parse()
            .with_context(|| format!("DESKJOB_POOL_MAX_SIZE must be a number, got '{v}'"))?;
    }
    if let Some(v) = value("DESKJOB_DEFAULT_SERVICE") {
        cfg.service.default_name = v.trim().to_string();
    }
    if let Some(v) = value("DESKJOB_LOG_LEVEL") {
        cfg.logging.level = v.trim().to_string();
    }
    Ok(())
}
