//! The contract implemented by class-based steps.

use async_trait::async_trait;

use crate::error::Result;

use super::capability::{
    ApplicationConfigAware, DatabaseAdapterManagerAware, LoggerAware, MaintenanceStrategyAware,
    MountManagerAware, RepositoryAdapterAware, ShellAdapterAware,
};
use super::context::StepContext;

/// A unit of work provided by a registered step type.
///
/// The `as_*_aware` accessors declare which collaborators the step needs.
/// Each returns `None` unless overridden; the dispatcher injects every
/// collaborator whose accessor returns `Some` before calling [`run`](Self::run).
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Runs the step, optionally returning output text.
    async fn run(&self, ctx: &StepContext<'_>) -> Result<Option<String>>;

    /// Logger injection.
    fn as_logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
        None
    }

    /// Application config injection.
    fn as_config_aware(&mut self) -> Option<&mut dyn ApplicationConfigAware> {
        None
    }

    /// Shell executor injection.
    fn as_shell_aware(&mut self) -> Option<&mut dyn ShellAdapterAware> {
        None
    }

    /// Mount manager injection.
    fn as_mount_aware(&mut self) -> Option<&mut dyn MountManagerAware> {
        None
    }

    /// Repository adapter injection.
    fn as_repository_aware(&mut self) -> Option<&mut dyn RepositoryAdapterAware> {
        None
    }

    /// Maintenance strategy injection.
    fn as_maintenance_aware(&mut self) -> Option<&mut dyn MaintenanceStrategyAware> {
        None
    }

    /// Database adapter manager injection.
    fn as_database_aware(&mut self) -> Option<&mut dyn DatabaseAdapterManagerAware> {
        None
    }
}
