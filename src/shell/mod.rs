//! Shell execution for command steps.
//!
//! Command steps never spawn processes themselves: they go through a
//! [`ShellExecutor`] from the capability bag, so tests and callers can swap
//! the local implementation out.

mod local;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Result;
use crate::planner::Priority;

pub use local::LocalShell;

/// A fully resolved shell invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellRequest {
    /// The shell line.
    pub line: String,
    /// Directory the command runs in.
    pub working_dir: PathBuf,
    /// Environment added on top of the process environment.
    pub env: BTreeMap<String, String>,
    /// Scheduling hint.
    pub priority: Priority,
}

/// Result of a shell invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShellOutput {
    /// Exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

/// Runs shell lines.
#[async_trait]
pub trait ShellExecutor: Send + Sync {
    /// Runs `request` to completion and captures its output.
    ///
    /// A non-zero exit is reported through [`ShellOutput::exit_code`], not as
    /// an error; errors mean the command could not run at all.
    async fn execute(&self, request: &ShellRequest) -> Result<ShellOutput>;
}

impl ShellRequest {
    /// Creates a request with no extra environment.
    #[must_use]
    pub fn new(line: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            line: line.into(),
            working_dir: working_dir.into(),
            env: BTreeMap::new(),
            priority: Priority::Normal,
        }
    }
}

impl ShellOutput {
    /// Returns true if the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output followed by standard error, trimmed.
    #[must_use]
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (_, true) => stdout.to_string(),
            (true, false) => stderr.to_string(),
            (false, false) => format!("{stdout}\n{stderr}"),
        }
    }
}
