//! Normalized step representation.
//!
//! Whatever shape a step had in configuration, after normalization it is one
//! of four variants: a shell command, a registered callable, a registered
//! step type, or a one-level group of steps run concurrently.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::condition::Condition;

/// Scheduling hint for shell commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Run under a raised niceness.
    Low,
    /// Run at the inherited priority.
    #[default]
    Normal,
    /// Same as normal: raising priority needs privileges the tool does not assume.
    High,
}

/// A shell command step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandStep {
    /// The shell line, passed to `sh -c` unchanged.
    pub line: String,
    /// Working directory; relative paths resolve against the code root.
    pub working_dir: Option<PathBuf>,
    /// Step-declared environment, applied last.
    pub env: BTreeMap<String, String>,
    /// Scheduling hint.
    pub priority: Priority,
    /// Timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// A step backed by a registered step type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassStep {
    /// Registered step type name.
    pub type_name: String,
    /// Free-form options handed to the step.
    pub options: BTreeMap<String, serde_yaml::Value>,
}

/// A group of steps executed concurrently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelGroup {
    /// Member steps; never groups themselves.
    pub children: Vec<Step>,
}

/// The normalized form of a step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepVariant {
    /// Shell command.
    Command(CommandStep),
    /// Registered callable.
    Callable {
        /// Registry reference of the function.
        reference: String,
    },
    /// Registered step type.
    Class(ClassStep),
    /// Concurrent group.
    Parallel(ParallelGroup),
}

/// A named step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Step {
    /// Step name, used for logging and lookups.
    pub name: String,
    /// What the step does.
    pub variant: StepVariant,
    /// Conditions under which the step runs; empty means always.
    pub triggers: Vec<Condition>,
}

impl Priority {
    /// Returns the niceness to apply, if any.
    #[must_use]
    pub const fn niceness(self) -> Option<i8> {
        match self {
            Self::Low => Some(10),
            Self::Normal | Self::High => None,
        }
    }
}

impl CommandStep {
    /// Creates a command step with default settings.
    #[must_use]
    pub fn new(line: impl Into<String>) -> Self {
        Self {
            line: line.into(),
            working_dir: None,
            env: BTreeMap::new(),
            priority: Priority::Normal,
            timeout_secs: None,
        }
    }
}

impl StepVariant {
    /// Short label for the variant.
    #[must_use]
    pub const fn kind_label(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Callable { .. } => "callable",
            Self::Class(_) => "class",
            Self::Parallel(_) => "parallel",
        }
    }

    /// The name a step gets when configuration supplies none.
    #[must_use]
    pub fn derived_name(&self) -> Option<&str> {
        match self {
            Self::Command(command) => Some(command.line.as_str()),
            Self::Callable { reference } => Some(reference.as_str()),
            Self::Class(class) => Some(class.type_name.as_str()),
            Self::Parallel(_) => None,
        }
    }
}

impl Step {
    /// Creates an untriggered step.
    #[must_use]
    pub fn new(name: impl Into<String>, variant: StepVariant) -> Self {
        Self {
            name: name.into(),
            variant,
            triggers: Vec::new(),
        }
    }

    /// Sets the step triggers.
    #[must_use]
    pub fn with_triggers(mut self, triggers: Vec<Condition>) -> Self {
        self.triggers = triggers;
        self
    }

    /// Returns the children when this step is a parallel group.
    #[must_use]
    pub fn children(&self) -> Option<&[Step]> {
        match &self.variant {
            StepVariant::Parallel(group) => Some(group.children.as_slice()),
            _ => None,
        }
    }

    /// Human-readable summary of what the step does.
    #[must_use]
    pub fn description(&self) -> String {
        match &self.variant {
            StepVariant::Command(command) => format!("run `{}`", command.line),
            StepVariant::Callable { reference } => format!("call {reference}"),
            StepVariant::Class(class) => format!("step {}", class.type_name),
            StepVariant::Parallel(group) => {
                let names: Vec<&str> = group.children.iter().map(|c| c.name.as_str()).collect();
                format!("parallel [{}]", names.join(", "))
            }
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.variant.kind_label())
    }
}
