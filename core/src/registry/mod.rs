//! Application-level set of named task services.
//!
//! There is always a default service. Presentation-layer owners (windows,
//! views, controllers) can be bound to a named service; the binding holds
//! the owner weakly and disappears with it. Unbound owners get the default.

mod weak;

pub use weak::WeakRegistry;

use std::any::Any;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::blocker::ForegroundSurface;
use crate::config::AppConfig;
use crate::coordinator::{self, ForegroundCoordinator};
use crate::error::TaskError;
use crate::pool::PoolConfig;
use crate::service::TaskService;
use crate::util::{read, write};

pub const DEFAULT_SERVICE_NAME: &str = "default";

type Owner = dyn Any + Send + Sync;

pub struct ServiceRegistry {
    default: TaskService,
    services: RwLock<Vec<TaskService>>,
    owners: WeakRegistry<Owner, String>,
}

impl ServiceRegistry {
    /// Registry whose default service is `default`.
    pub fn new(default: TaskService) -> Self {
        Self {
            services: RwLock::new(vec![default.clone()]),
            default,
            owners: WeakRegistry::new(),
        }
    }

    /// Builds the default service and every extra service from `config`,
    /// all sharing one coordinator.
    pub fn from_config(config: &AppConfig) -> Result<Self, TaskError> {
        let coordinator = coordinator::from_settings(&config.coordinator)?;
        Self::from_config_with(config, coordinator)
    }

    pub fn from_config_with(
        config: &AppConfig,
        coordinator: Arc<dyn ForegroundCoordinator>,
    ) -> Result<Self, TaskError> {
        let default = TaskService::builder(config.service.default_name.clone())
            .pool(PoolConfig::from_settings(&config.pool)?)
            .coordinator(coordinator)
            .build()?;
        let registry = Self::new(default);
        for extra in &config.service.extra {
            registry.create_service(&extra.name, PoolConfig::from_settings(&extra.pool)?)?;
        }
        Ok(registry)
    }

    pub fn default_service(&self) -> TaskService {
        self.default.clone()
    }

    pub fn default_name(&self) -> &str {
        self.default.name()
    }

    pub fn task_service(&self, name: &str) -> Option<TaskService> {
        read(&self.services)
            .iter()
            .find(|s| s.name() == name)
            .cloned()
    }

    /// All services, default first, then in registration order.
    pub fn task_services(&self) -> Vec<TaskService> {
        read(&self.services).clone()
    }

    pub fn add_service(&self, service: TaskService) -> Result<(), TaskError> {
        let mut services = write(&self.services);
        if services.iter().any(|s| s.name() == service.name()) {
            return Err(TaskError::InvalidArgument(format!(
                "a task service named '{}' already exists",
                service.name()
            )));
        }
        tracing::debug!(service = %service.name(), "task service registered");
        services.push(service);
        Ok(())
    }

    /// Creates and registers a service sharing the default service's
    /// coordinator and surface.
    pub fn create_service(&self, name: &str, pool: PoolConfig) -> Result<TaskService, TaskError> {
        let default = self.default_service();
        let service = TaskService::builder(name)
            .pool(pool)
            .coordinator(default.coordinator())
            .surface(default.surface())
            .build()?;
        self.add_service(service.clone())?;
        Ok(service)
    }

    /// Unregisters `name` and drops its owner bindings. The service itself
    /// keeps running until its last handle is gone.
    pub fn remove_service(&self, name: &str) -> Result<TaskService, TaskError> {
        if name == self.default.name() {
            return Err(TaskError::InvalidArgument(
                "the default task service cannot be removed".to_string(),
            ));
        }
        let removed = {
            let mut services = write(&self.services);
            let index = services
                .iter()
                .position(|s| s.name() == name)
                .ok_or_else(|| TaskError::InvalidArgument(format!("no task service named '{name}'")))?;
            services.remove(index)
        };
        self.owners.retain_values(|bound| bound != name);
        tracing::debug!(service = %name, "task service removed");
        Ok(removed)
    }

    /// Routes `owner` to the service called `name` for as long as `owner`
    /// is alive.
    pub fn bind_owner<K>(&self, owner: &Arc<K>, name: &str) -> Result<(), TaskError>
    where
        K: Any + Send + Sync,
    {
        if self.task_service(name).is_none() {
            return Err(TaskError::InvalidArgument(format!(
                "no task service named '{name}'"
            )));
        }
        let owner: Arc<Owner> = owner.clone();
        self.owners.insert(&owner, name.to_string());
        Ok(())
    }

    pub fn unbind_owner<K>(&self, owner: &Arc<K>) -> bool
    where
        K: Any + Send + Sync,
    {
        let owner: Arc<Owner> = owner.clone();
        self.owners.remove(&owner).is_some()
    }

    /// The service bound to `owner`, or the default service.
    pub fn service_for<K>(&self, owner: &Arc<K>) -> TaskService
    where
        K: Any + Send + Sync,
    {
        let owner: Arc<Owner> = owner.clone();
        self.owners
            .get(&owner)
            .and_then(|name| self.task_service(&name))
            .unwrap_or_else(|| self.default_service())
    }

    pub fn bound_owners(&self) -> usize {
        self.owners.len()
    }

    pub fn surface(&self) -> Arc<dyn ForegroundSurface> {
        self.default_service().surface()
    }

    pub fn shutdown_all(&self) {
        for service in self.task_services() {
            service.shutdown();
        }
    }

    /// Waits for every service under one shared deadline. Returns whether
    /// all of them terminated.
    pub fn await_termination_all(&self, timeout: Duration) -> Result<bool, TaskError> {
        let started = Instant::now();
        for service in self.task_services() {
            let left = timeout.saturating_sub(started.elapsed());
            if !service.await_termination(left)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = read(&self.services)
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        f.debug_struct("ServiceRegistry")
            .field("default", &self.default.name())
            .field("services", &names)
            .field("owners", &self.owners)
            .finish()
    }
}
