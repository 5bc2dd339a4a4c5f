//! # deskjob-core
//!
//! Background task execution engine for desktop-style hosts.
//!
//! A [`TaskService`] runs [`Task`]s on a bounded [`WorkerPool`], keeps the
//! set of in-flight tasks, and funnels every lifecycle notification and
//! input-blocking operation through a single-threaded
//! [`ForegroundCoordinator`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use deskjob_core::{ImmediateCoordinator, Task, TaskService};
//!
//! let service = TaskService::new("default", Arc::new(ImmediateCoordinator::new()))?;
//! let task: Task<u64> = Task::new("sum", |ctx| {
//!     ctx.set_message("adding");
//!     Ok((1..=10).sum())
//! });
//! service.execute_task(&task)?;
//! assert_eq!(task.join().into_value(), Some(55));
//! # Ok::<(), deskjob_core::TaskError>(())
//! ```

pub mod blocker;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod monitor;
pub mod pool;
pub mod registry;
pub mod render;
pub mod service;
pub mod task;
pub mod util;

pub use blocker::{BlockerPhase, BlockingScope, ForegroundSurface, HeadlessSurface, InputBlocker};
pub use config::AppConfig;
pub use coordinator::{
    EventLoopCoordinator, ForegroundCoordinator, ImmediateCoordinator, PumpedCoordinator,
};
pub use error::{CliError, ErrorCode, PoolError, SubmitError, TaskError, WorkFailure};
pub use monitor::{ForegroundTaskListener, TaskMonitor};
pub use pool::{PoolConfig, PoolStats, WorkerPool};
pub use registry::{ServiceRegistry, WeakRegistry, DEFAULT_SERVICE_NAME};
pub use render::{LifecycleRenderer, RenderBridge, RenderEvent};
pub use service::{TaskService, TaskServiceBuilder, TasksChanged, TasksListener};
pub use task::{
    EventStage, Outcome, Task, TaskBuilder, TaskContext, TaskEvent, TaskListener, TaskRef,
    TaskState,
};
