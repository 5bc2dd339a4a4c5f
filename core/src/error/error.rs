use thiserror::Error;

use super::task::TaskError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("task engine error: {0}")]
    Task(#[from] TaskError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}
