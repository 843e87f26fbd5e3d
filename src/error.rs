//! Error types for the Deckhand plan engine.
//!
//! Errors are split by the moment they can occur: configuration loading,
//! plan normalization (before any side effect), step execution, and
//! rollback.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::PlanKind;
use crate::runner::Capability;

/// The main error type for Deckhand.
#[derive(Debug, Error)]
pub enum DeckhandError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Plan normalization errors.
    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    /// Step execution errors.
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// Rollback errors.
    #[error("Rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Errors raised while normalizing raw step definitions into a plan.
///
/// These are always raised before the first step runs.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The main step list is empty.
    #[error("The {kind} plan has no steps")]
    EmptySteps {
        /// Kind of plan being normalized.
        kind: PlanKind,
    },

    /// More than one discriminator key was supplied.
    #[error("Step '{step}' is ambiguous: it defines {keys}")]
    AmbiguousStep {
        /// Name (or position) of the step.
        step: String,
        /// The conflicting discriminator keys.
        keys: String,
    },

    /// A parallel group was found inside another parallel group.
    #[error("Step '{step}' is a nested parallel group; groups may only be one level deep")]
    NestedParallelGroup {
        /// Name (or position) of the step.
        step: String,
    },

    /// The named step type is not registered.
    #[error("Step '{step}' uses unknown step type '{type_name}'")]
    UnknownStepType {
        /// Name of the step.
        step: String,
        /// The unregistered type name.
        type_name: String,
    },

    /// The named step type exists but not for this plan kind.
    #[error("Step '{step}' uses step type '{type_name}', which is not a {kind} step")]
    UnsupportedStepType {
        /// Name of the step.
        step: String,
        /// The step type name.
        type_name: String,
        /// Kind of plan being normalized.
        kind: PlanKind,
    },

    /// A callable was given as something other than a function reference.
    #[error("Callable for step '{step}' must be a named function reference")]
    ClosureCallable {
        /// Name of the step.
        step: String,
    },

    /// The callable reference is not registered.
    #[error("Step '{step}' references unknown callable '{reference}'")]
    UnknownCallable {
        /// Name of the step.
        step: String,
        /// The unregistered reference.
        reference: String,
    },

    /// A trigger is not part of the condition vocabulary.
    #[error("Step '{step}' declares unknown trigger '{condition}'")]
    UnknownCondition {
        /// Name of the step.
        step: String,
        /// The unknown trigger.
        condition: String,
    },

    /// The definition is malformed.
    #[error("Invalid definition for step '{step}': {message}")]
    InvalidDefinition {
        /// Name (or position) of the step.
        step: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors raised while executing a step.
#[derive(Debug, Error)]
pub enum StepError {
    /// A shell command exited with a non-zero status.
    #[error("Command for step '{step}' exited with status {exit_code}: {stderr}")]
    CommandFailed {
        /// Name of the step.
        step: String,
        /// Exit code, `-1` when killed by a signal.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// A shell command could not be started.
    #[error("Command for step '{step}' could not be started: {message}")]
    CommandSpawn {
        /// Name of the step.
        step: String,
        /// Description of the failure.
        message: String,
    },

    /// A shell command exceeded its timeout.
    #[error("Command for step '{step}' timed out after {timeout_secs}s")]
    Timeout {
        /// Name of the step.
        step: String,
        /// Timeout that was exceeded.
        timeout_secs: u64,
    },

    /// A callable returned an error.
    #[error("Callable step '{step}' failed: {message}")]
    CallableFailed {
        /// Name of the step.
        step: String,
        /// Description of the failure.
        message: String,
    },

    /// A class step returned an error.
    #[error("Step '{step}' failed: {message}")]
    ActionFailed {
        /// Name of the step.
        step: String,
        /// Description of the failure.
        message: String,
    },

    /// A step needs a collaborator that was not supplied for this run.
    #[error("Step '{step}' requires the {capability} capability, which is not available")]
    MissingCapability {
        /// Name of the step.
        step: String,
        /// The missing capability.
        capability: Capability,
    },

    /// One or more children of a parallel group failed.
    #[error("Parallel group '{group}' failed: {}", summarize(.failures))]
    ParallelGroupFailed {
        /// Name of the group.
        group: String,
        /// Every child failure, in declaration order.
        failures: Vec<StepError>,
    },
}

/// A failure while running the rollback phases.
#[derive(Debug, Error)]
#[error("{source}{}", original_suffix(.original.as_ref()))]
pub struct RollbackError {
    /// The rollback step failure.
    pub source: StepError,
    /// The step failure that triggered the rollback, if any.
    pub original: Option<StepError>,
}

/// Result type alias for Deckhand operations.
pub type Result<T> = std::result::Result<T, DeckhandError>;

fn summarize(failures: &[StepError]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn original_suffix(original: Option<&StepError>) -> String {
    original.map_or_else(String::new, |e| format!(" (after: {e})"))
}

impl DeckhandError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error was raised before anything executed.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Plan(_))
    }

    /// Returns the step error that caused a failed run, if any.
    #[must_use]
    pub const fn step_error(&self) -> Option<&StepError> {
        match self {
            Self::Step(e) => Some(e),
            Self::Rollback(RollbackError { source, .. }) => Some(source),
            _ => None,
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl PlanError {
    /// Creates an invalid definition error.
    #[must_use]
    pub fn invalid(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            step: step.into(),
            message: message.into(),
        }
    }
}

impl StepError {
    /// Returns the name of the step (or group) that failed.
    #[must_use]
    pub fn step_name(&self) -> &str {
        match self {
            Self::CommandFailed { step, .. }
            | Self::CommandSpawn { step, .. }
            | Self::Timeout { step, .. }
            | Self::CallableFailed { step, .. }
            | Self::ActionFailed { step, .. }
            | Self::MissingCapability { step, .. } => step,
            Self::ParallelGroupFailed { group, .. } => group,
        }
    }
}
