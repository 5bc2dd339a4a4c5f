//! Application configuration: TOML file plus environment overrides.

pub mod load;
pub mod types;

pub use load::{apply_env_overrides, get_deskjob_data_dir, load_default, load_from};
pub use types::{
    AppConfig, CoordinatorKind, CoordinatorSettings, LoggingConfig, NamedServiceSettings,
    PoolSettings, ServiceSettings,
};
