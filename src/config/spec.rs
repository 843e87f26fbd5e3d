//! Configuration types.
//!
//! These structs map to `deckhand.yaml`: the application being managed,
//! shell defaults, and the raw build and deploy plans.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::planner::{PlanKind, RawPlan};

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeckhandConfig {
    /// The application being built and deployed.
    pub application: ApplicationConfig,
    /// Defaults for command steps.
    #[serde(default)]
    pub shell: ShellConfig,
    /// Build plan.
    #[serde(default)]
    pub build: Option<RawPlan>,
    /// Deploy plan.
    #[serde(default)]
    pub deploy: Option<RawPlan>,
}

/// Application-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Directory the application code lives in.
    pub code_root: PathBuf,
    /// File layout of the code root.
    #[serde(default)]
    pub strategy: LayoutStrategy,
    /// Where builds are produced; relative to the code root.
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
    /// Where snapshots are kept; relative to the code root.
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
    /// Free-form options passed to every step.
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// How the code root is laid out on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutStrategy {
    /// Code deployed in place.
    #[default]
    Default,
    /// Two release slots, switched atomically.
    BlueGreen,
    /// One directory per deployed branch.
    Branch,
}

/// Defaults for command steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShellConfig {
    /// Shell binary used to run command lines.
    #[serde(default = "default_shell")]
    pub program: String,
    /// Timeout for commands that declare none.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Environment added to every command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_environment() -> String {
    String::from("dev")
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("builds")
}

fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_shell() -> String {
    String::from("sh")
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell(),
            timeout_secs: None,
            env: BTreeMap::new(),
        }
    }
}

impl DeckhandConfig {
    /// Returns the raw plan of `kind`, if configured.
    #[must_use]
    pub const fn plan(&self, kind: PlanKind) -> Option<&RawPlan> {
        match kind {
            PlanKind::Build => self.build.as_ref(),
            PlanKind::Deploy => self.deploy.as_ref(),
        }
    }
}

impl ApplicationConfig {
    /// Resolves `path` against the code root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.code_root.join(path)
        }
    }

    /// Directory a build with `build_id` is produced in.
    #[must_use]
    pub fn build_path(&self, build_id: &str) -> PathBuf {
        self.resolve(&self.build_dir).join(build_id)
    }

    /// Directory snapshots are written to.
    #[must_use]
    pub fn snapshot_root(&self) -> PathBuf {
        self.resolve(&self.snapshot_dir)
    }
}

impl std::fmt::Display for LayoutStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Default => "default",
            Self::BlueGreen => "blue-green",
            Self::Branch => "branch",
        };
        write!(f, "{s}")
    }
}
