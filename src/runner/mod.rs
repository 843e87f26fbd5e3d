//! Plan execution engine.
//!
//! This module holds the step registry, the capability bag, the step
//! dispatcher, and the runner that drives plans through their phases.

mod action;
mod capability;
mod context;
mod dispatcher;
mod plan_runner;
mod registry;

pub use action::StepAction;
pub use capability::{
    ApplicationConfigAware, Capabilities, Capability, DatabaseAdapterManager,
    DatabaseAdapterManagerAware, LoggerAware, MaintenanceStrategy, MaintenanceStrategyAware,
    MountManager, MountManagerAware, RepositoryAdapter, RepositoryAdapterAware,
    ShellAdapterAware, StepLogger,
};
pub use context::{RunMode, RunOptions, StepContext};
pub use dispatcher::{StepDispatcher, StepResult};
pub use plan_runner::{PlanRunner, RunReport, RunState, StepRecord, StepStatus};
pub use registry::{CallableFn, StepFactory, StepRegistry, StepType};
