#[allow(clippy::module_inception)]
pub mod error;
pub mod pool;
pub mod task;

pub use error::CliError;
pub use pool::{PoolError, SubmitError};
pub use task::{ErrorCode, TaskError, WorkFailure};
