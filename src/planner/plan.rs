//! Plan types.
//!
//! A plan owns the five ordered step lists of one build or deploy
//! invocation. Plans are produced by the normalizer and never change
//! afterwards.

use serde::{Deserialize, Serialize};

use super::step::Step;

/// Which step contract a plan's step types must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlanKind {
    /// Producing a build artifact.
    Build,
    /// Deploying code, assets and databases.
    Deploy,
}

/// A step list of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Optional reset before the main run.
    Clean,
    /// Always runs before the main steps.
    Preflight,
    /// The main, condition-filtered list.
    Steps,
    /// Always runs first when rolling back.
    RollbackPreflight,
    /// Undoes partial effects.
    RollbackSteps,
}

/// A normalized plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    kind: PlanKind,
    preflight: Vec<Step>,
    clean: Vec<Step>,
    steps: Vec<Step>,
    rollback_preflight: Vec<Step>,
    rollback_steps: Vec<Step>,
}

impl Phase {
    /// Every phase, in the order lists appear in configuration.
    pub const ALL: [Self; 5] = [
        Self::Preflight,
        Self::Clean,
        Self::Steps,
        Self::RollbackPreflight,
        Self::RollbackSteps,
    ];

    /// Returns the configuration key of this phase's list.
    #[must_use]
    pub const fn config_key(self) -> &'static str {
        match self {
            Self::Clean => "clean_steps",
            Self::Preflight => "preflight_steps",
            Self::Steps => "steps",
            Self::RollbackPreflight => "rollback_preflight_steps",
            Self::RollbackSteps => "rollback_steps",
        }
    }

    /// Returns true for the two rollback phases.
    #[must_use]
    pub const fn is_rollback(self) -> bool {
        matches!(self, Self::RollbackPreflight | Self::RollbackSteps)
    }
}

impl Plan {
    /// Assembles a plan from normalized lists.
    pub(crate) const fn from_lists(
        kind: PlanKind,
        preflight: Vec<Step>,
        clean: Vec<Step>,
        steps: Vec<Step>,
        rollback_preflight: Vec<Step>,
        rollback_steps: Vec<Step>,
    ) -> Self {
        Self {
            kind,
            preflight,
            clean,
            steps,
            rollback_preflight,
            rollback_steps,
        }
    }

    /// The plan kind.
    #[must_use]
    pub const fn kind(&self) -> PlanKind {
        self.kind
    }

    /// Returns the steps of `phase` in execution order.
    #[must_use]
    pub fn phase(&self, phase: Phase) -> &[Step] {
        match phase {
            Phase::Clean => &self.clean,
            Phase::Preflight => &self.preflight,
            Phase::Steps => &self.steps,
            Phase::RollbackPreflight => &self.rollback_preflight,
            Phase::RollbackSteps => &self.rollback_steps,
        }
    }

    /// Finds a step by name in `phase`.
    ///
    /// Names are not unique; the last step with the name wins.
    #[must_use]
    pub fn find(&self, phase: Phase, name: &str) -> Option<&Step> {
        self.phase(phase).iter().rev().find(|s| s.name == name)
    }

    /// Total number of top-level steps across all lists.
    #[must_use]
    pub fn step_count(&self) -> usize {
        Phase::ALL.iter().map(|p| self.phase(*p).len()).sum()
    }

    /// Returns true if the plan has rollback steps of any kind.
    #[must_use]
    pub fn has_rollback(&self) -> bool {
        !self.rollback_preflight.is_empty() || !self.rollback_steps.is_empty()
    }
}

impl std::fmt::Display for PlanKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Build => "build",
            Self::Deploy => "deploy",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Clean => "clean",
            Self::Preflight => "preflight",
            Self::Steps => "steps",
            Self::RollbackPreflight => "rollback-preflight",
            Self::RollbackSteps => "rollback-steps",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} plan ({} steps):", self.kind, self.step_count())?;
        for phase in Phase::ALL {
            let steps = self.phase(phase);
            if steps.is_empty() {
                continue;
            }
            writeln!(f, "  {phase}:")?;
            for (i, step) in steps.iter().enumerate() {
                writeln!(f, "    {i}. {step}: {}", step.description())?;
            }
        }
        Ok(())
    }
}
