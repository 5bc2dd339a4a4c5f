use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("worker pool state is poisoned")]
    Poisoned,
}

/// A submission the pool refused, handed back to the caller untouched.
pub struct SubmitError<W> {
    pub error: PoolError,
    pub item: W,
}

impl<W> SubmitError<W> {
    pub fn into_item(self) -> W {
        self.item
    }
}

impl<W> fmt::Debug for SubmitError<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitError")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<W> fmt::Display for SubmitError<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "submission rejected: {}", self.error)
    }
}

impl<W> std::error::Error for SubmitError<W> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
