//! Collaborators available to steps, and the traits steps use to ask for them.
//!
//! The set of capabilities is closed. A step type opts into a collaborator by
//! implementing the matching `*Aware` trait and returning itself from the
//! corresponding `as_*_aware` accessor on [`StepAction`](super::StepAction).

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ApplicationConfig;
use crate::error::Result;
use crate::shell::ShellExecutor;

/// A collaborator a step can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Step-scoped logger.
    Logger,
    /// Application configuration.
    ApplicationConfig,
    /// Shell executor.
    Shell,
    /// Mount and sync manager.
    MountManager,
    /// Version control adapter.
    Repository,
    /// Maintenance mode strategy.
    MaintenanceStrategy,
    /// Database adapter manager.
    DatabaseManager,
}

/// Synchronizes directories between mounts.
#[async_trait]
pub trait MountManager: Send + Sync {
    /// Copies `source` onto `destination`.
    async fn sync(&self, source: &Path, destination: &Path) -> Result<()>;
}

/// Talks to the version control system.
#[async_trait]
pub trait RepositoryAdapter: Send + Sync {
    /// Checks `reference` out into `destination`.
    async fn checkout(&self, reference: &str, destination: &Path) -> Result<()>;
}

/// Puts the application in and out of maintenance mode.
#[async_trait]
pub trait MaintenanceStrategy: Send + Sync {
    /// Enables maintenance mode.
    async fn enable(&self) -> Result<()>;

    /// Disables maintenance mode.
    async fn disable(&self) -> Result<()>;
}

/// Imports and exports application databases.
#[async_trait]
pub trait DatabaseAdapterManager: Send + Sync {
    /// Exports every database into `destination`.
    async fn export(&self, destination: &Path) -> Result<()>;

    /// Imports every dump found in `source`.
    async fn import(&self, source: &Path) -> Result<()>;
}

/// Logger handed to steps, tagging every line with the step name.
#[derive(Debug, Clone, Default)]
pub struct StepLogger {
    step: Option<String>,
}

impl StepLogger {
    /// Creates a logger not yet bound to a step.
    #[must_use]
    pub const fn new() -> Self {
        Self { step: None }
    }

    /// Returns a logger bound to `step`.
    #[must_use]
    pub fn for_step(&self, step: &str) -> Self {
        Self {
            step: Some(step.to_string()),
        }
    }

    /// The step this logger is bound to.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    /// Logs at info level.
    pub fn info(&self, message: &str) {
        info!(step = self.step().unwrap_or("-"), "{message}");
    }

    /// Logs at debug level.
    pub fn debug(&self, message: &str) {
        debug!(step = self.step().unwrap_or("-"), "{message}");
    }

    /// Logs at warn level.
    pub fn warn(&self, message: &str) {
        warn!(step = self.step().unwrap_or("-"), "{message}");
    }
}

/// Wants a step-scoped logger.
pub trait LoggerAware {
    /// Receives the logger.
    fn set_logger(&mut self, logger: StepLogger);
}

/// Wants the application configuration.
pub trait ApplicationConfigAware {
    /// Receives the configuration.
    fn set_application_config(&mut self, config: Arc<ApplicationConfig>);
}

/// Wants the shell executor.
pub trait ShellAdapterAware {
    /// Receives the shell executor.
    fn set_shell(&mut self, shell: Arc<dyn ShellExecutor>);
}

/// Wants the mount manager.
pub trait MountManagerAware {
    /// Receives the mount manager.
    fn set_mount_manager(&mut self, mounts: Arc<dyn MountManager>);
}

/// Wants the repository adapter.
pub trait RepositoryAdapterAware {
    /// Receives the repository adapter.
    fn set_repository(&mut self, repository: Arc<dyn RepositoryAdapter>);
}

/// Wants the maintenance strategy.
pub trait MaintenanceStrategyAware {
    /// Receives the maintenance strategy.
    fn set_maintenance_strategy(&mut self, strategy: Arc<dyn MaintenanceStrategy>);
}

/// Wants the database adapter manager.
pub trait DatabaseAdapterManagerAware {
    /// Receives the database adapter manager.
    fn set_database_manager(&mut self, databases: Arc<dyn DatabaseAdapterManager>);
}

/// The collaborators supplied for one run.
///
/// The logger is always present; every other capability is optional and
/// only required by steps that ask for it.
#[derive(Clone, Default)]
pub struct Capabilities {
    logger: StepLogger,
    config: Option<Arc<ApplicationConfig>>,
    shell: Option<Arc<dyn ShellExecutor>>,
    mounts: Option<Arc<dyn MountManager>>,
    repository: Option<Arc<dyn RepositoryAdapter>>,
    maintenance: Option<Arc<dyn MaintenanceStrategy>>,
    databases: Option<Arc<dyn DatabaseAdapterManager>>,
}

impl Capabilities {
    /// Creates a bag with only the logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Supplies the application configuration.
    #[must_use]
    pub fn with_application_config(mut self, config: Arc<ApplicationConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Supplies the shell executor.
    #[must_use]
    pub fn with_shell(mut self, shell: Arc<dyn ShellExecutor>) -> Self {
        self.shell = Some(shell);
        self
    }

    /// Supplies the mount manager.
    #[must_use]
    pub fn with_mount_manager(mut self, mounts: Arc<dyn MountManager>) -> Self {
        self.mounts = Some(mounts);
        self
    }

    /// Supplies the repository adapter.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn RepositoryAdapter>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Supplies the maintenance strategy.
    #[must_use]
    pub fn with_maintenance_strategy(mut self, strategy: Arc<dyn MaintenanceStrategy>) -> Self {
        self.maintenance = Some(strategy);
        self
    }

    /// Supplies the database adapter manager.
    #[must_use]
    pub fn with_database_manager(mut self, databases: Arc<dyn DatabaseAdapterManager>) -> Self {
        self.databases = Some(databases);
        self
    }

    /// The root logger.
    #[must_use]
    pub const fn logger(&self) -> &StepLogger {
        &self.logger
    }

    /// The application configuration, if supplied.
    #[must_use]
    pub fn application_config(&self) -> Option<Arc<ApplicationConfig>> {
        self.config.clone()
    }

    /// The shell executor, if supplied.
    #[must_use]
    pub fn shell(&self) -> Option<Arc<dyn ShellExecutor>> {
        self.shell.clone()
    }

    /// The mount manager, if supplied.
    #[must_use]
    pub fn mount_manager(&self) -> Option<Arc<dyn MountManager>> {
        self.mounts.clone()
    }

    /// The repository adapter, if supplied.
    #[must_use]
    pub fn repository(&self) -> Option<Arc<dyn RepositoryAdapter>> {
        self.repository.clone()
    }

    /// The maintenance strategy, if supplied.
    #[must_use]
    pub fn maintenance_strategy(&self) -> Option<Arc<dyn MaintenanceStrategy>> {
        self.maintenance.clone()
    }

    /// The database adapter manager, if supplied.
    #[must_use]
    pub fn database_manager(&self) -> Option<Arc<dyn DatabaseAdapterManager>> {
        self.databases.clone()
    }

    /// Lists the capabilities present in this bag.
    #[must_use]
    pub fn available(&self) -> Vec<Capability> {
        let mut available = vec![Capability::Logger];
        if self.config.is_some() {
            available.push(Capability::ApplicationConfig);
        }
        if self.shell.is_some() {
            available.push(Capability::Shell);
        }
        if self.mounts.is_some() {
            available.push(Capability::MountManager);
        }
        if self.repository.is_some() {
            available.push(Capability::Repository);
        }
        if self.maintenance.is_some() {
            available.push(Capability::MaintenanceStrategy);
        }
        if self.databases.is_some() {
            available.push(Capability::DatabaseManager);
        }
        available
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("available", &self.available())
            .finish()
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Logger => "logger",
            Self::ApplicationConfig => "application config",
            Self::Shell => "shell",
            Self::MountManager => "mount manager",
            Self::Repository => "repository",
            Self::MaintenanceStrategy => "maintenance strategy",
            Self::DatabaseManager => "database manager",
        };
        write!(f, "{s}")
    }
}
