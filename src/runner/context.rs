//! Run-scoped options and the per-step context.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::planner::Phase;

/// The option bag shared, read-only, by every step of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunOptions {
    /// Application code root.
    pub code_root: PathBuf,
    /// Build identifier.
    pub build_id: Option<String>,
    /// Path of the build being deployed or produced.
    pub build_path: Option<PathBuf>,
    /// Path of the snapshot being deployed or produced.
    pub snapshot_path: Option<PathBuf>,
    /// Repository reference (branch, tag or commit).
    pub repo_reference: Option<String>,
    /// Whether assets are part of this run.
    pub include_assets: bool,
    /// Whether databases are part of this run.
    pub include_databases: bool,
    /// Whether rollback steps may undo database and asset changes.
    pub allow_full_rollback: bool,
    /// Free-form options from configuration and the command line.
    pub extra: BTreeMap<String, String>,
}

/// Everything a step sees when it runs.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    /// Run options.
    pub options: &'a RunOptions,
    /// Step-local options from the definition.
    pub step_options: &'a BTreeMap<String, serde_yaml::Value>,
    /// Name of the running step.
    pub step_name: &'a str,
    /// Phase the step runs in.
    pub phase: Phase,
}

/// Which parts of a plan a run executes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Run the clean list before preflight.
    pub clean: bool,
    /// Only run the rollback lists.
    pub rollback: bool,
}

impl RunOptions {
    /// Creates options for `code_root` with everything else unset.
    #[must_use]
    pub fn new(code_root: impl Into<PathBuf>) -> Self {
        Self {
            code_root: code_root.into(),
            ..Self::default()
        }
    }

    /// Resolves `path` against the code root.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.code_root.join(path)
        }
    }

    /// Exports the options as environment variables for command steps.
    #[must_use]
    pub fn to_env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        env.insert(
            String::from("CODE_ROOT"),
            self.code_root.display().to_string(),
        );
        if let Some(build_id) = &self.build_id {
            env.insert(String::from("BUILD_ID"), build_id.clone());
        }
        if let Some(path) = &self.build_path {
            env.insert(String::from("BUILD_PATH"), path.display().to_string());
        }
        if let Some(path) = &self.snapshot_path {
            env.insert(String::from("SNAPSHOT_PATH"), path.display().to_string());
        }
        if let Some(reference) = &self.repo_reference {
            env.insert(String::from("REPO_REFERENCE"), reference.clone());
        }
        env.insert(String::from("INCLUDE_ASSETS"), flag(self.include_assets));
        env.insert(
            String::from("INCLUDE_DATABASES"),
            flag(self.include_databases),
        );
        env.insert(
            String::from("ALLOW_FULL_ROLLBACK"),
            flag(self.allow_full_rollback),
        );
        for (key, value) in &self.extra {
            env.insert(env_key(key), value.clone());
        }
        env
    }
}

impl<'a> StepContext<'a> {
    /// Returns a string step option.
    #[must_use]
    pub fn option_str(&self, key: &str) -> Option<&'a str> {
        self.step_options.get(key).and_then(serde_yaml::Value::as_str)
    }

    /// Returns a boolean step option, or `default` when absent.
    #[must_use]
    pub fn option_bool(&self, key: &str, default: bool) -> bool {
        self.step_options
            .get(key)
            .and_then(serde_yaml::Value::as_bool)
            .unwrap_or(default)
    }

    /// Returns a list-of-strings step option; a single string counts as one item.
    #[must_use]
    pub fn option_list(&self, key: &str) -> Vec<&'a str> {
        match self.step_options.get(key) {
            Some(serde_yaml::Value::Sequence(items)) => {
                items.iter().filter_map(serde_yaml::Value::as_str).collect()
            }
            Some(serde_yaml::Value::String(item)) => vec![item.as_str()],
            _ => Vec::new(),
        }
    }
}

impl RunMode {
    /// Preflight and steps only.
    #[must_use]
    pub const fn forward() -> Self {
        Self {
            clean: false,
            rollback: false,
        }
    }

    /// Rollback lists only.
    #[must_use]
    pub const fn rollback_only() -> Self {
        Self {
            clean: false,
            rollback: true,
        }
    }

    /// Adds the clean phase.
    #[must_use]
    pub const fn with_clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }
}

fn flag(value: bool) -> String {
    String::from(if value { "1" } else { "0" })
}

fn env_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}
