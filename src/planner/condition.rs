//! Run conditions and trigger filtering.
//!
//! Each invocation activates a set of conditions describing the kind of work
//! requested. Steps in the main list may declare triggers; a step runs only
//! when one of its triggers is active.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;

/// A tag describing what kind of work an invocation requests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Condition {
    /// Directory skeleton and shared links.
    Skeleton,
    /// Application code, from any source.
    Code,
    /// Code coming from a prepared build.
    CodeBuild,
    /// Code coming from a repository checkout.
    CodeRepo,
    /// Static assets.
    Assets,
    /// Databases.
    Databases,
    /// Cache and index refresh.
    Refresh,
}

/// The set of conditions active for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConditionSet(BTreeSet<Condition>);

impl Condition {
    /// Every condition, in vocabulary order.
    pub const ALL: [Self; 7] = [
        Self::Skeleton,
        Self::Code,
        Self::CodeBuild,
        Self::CodeRepo,
        Self::Assets,
        Self::Databases,
        Self::Refresh,
    ];

    /// Returns the configuration spelling of this condition.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Skeleton => "skeleton",
            Self::Code => "code",
            Self::CodeBuild => "code-build",
            Self::CodeRepo => "code-repo",
            Self::Assets => "assets",
            Self::Databases => "databases",
            Self::Refresh => "refresh",
        }
    }
}

impl FromStr for Condition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConditionSet {
    /// Creates an empty condition set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Adds a condition.
    pub fn insert(&mut self, condition: Condition) {
        self.0.insert(condition);
    }

    /// Returns the set with `condition` added.
    #[must_use]
    pub fn with(mut self, condition: Condition) -> Self {
        self.insert(condition);
        self
    }

    /// Returns true if `condition` is active.
    #[must_use]
    pub fn contains(&self, condition: Condition) -> bool {
        self.0.contains(&condition)
    }

    /// Returns true if no condition is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the active conditions in vocabulary order.
    pub fn iter(&self) -> impl Iterator<Item = Condition> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Condition> for ConditionSet {
    fn from_iter<I: IntoIterator<Item = Condition>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for ConditionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = self.iter().map(Condition::as_str).collect();
        write!(f, "{}", names.join(", "))
    }
}

/// Decides whether a step with `triggers` runs under `active`.
///
/// A step without triggers always runs. Otherwise at least one trigger must
/// be active.
#[must_use]
pub fn should_run(triggers: &[Condition], active: &ConditionSet) -> bool {
    triggers.is_empty() || triggers.iter().any(|t| active.contains(*t))
}
