//! Local shell executor backed by `tokio::process`.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::debug;

use crate::error::Result;

use super::{ShellExecutor, ShellOutput, ShellRequest};

/// Default shell binary.
const DEFAULT_SHELL: &str = "sh";

/// Runs commands with `sh -c` on the local host.
#[derive(Debug, Clone)]
pub struct LocalShell {
    /// Shell binary.
    shell: String,
    /// Environment applied before the request environment.
    base_env: BTreeMap<String, String>,
}

impl Default for LocalShell {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalShell {
    /// Creates a local shell using `sh`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shell: String::from(DEFAULT_SHELL),
            base_env: BTreeMap::new(),
        }
    }

    /// Uses a different shell binary.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Sets environment shared by every command.
    #[must_use]
    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.base_env = env;
        self
    }

    fn build_command(&self, request: &ShellRequest) -> Command {
        let mut command = if let Some(niceness) = request.priority.niceness() {
            let mut nice = Command::new("nice");
            nice.arg("-n").arg(niceness.to_string()).arg(&self.shell);
            nice
        } else {
            Command::new(&self.shell)
        };

        command
            .arg("-c")
            .arg(&request.line)
            .current_dir(&request.working_dir)
            .envs(&self.base_env)
            .envs(&request.env)
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl ShellExecutor for LocalShell {
    async fn execute(&self, request: &ShellRequest) -> Result<ShellOutput> {
        debug!(
            "Running `{}` in {}",
            request.line,
            request.working_dir.display()
        );

        let output = self.build_command(request).output().await?;

        Ok(ShellOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}
