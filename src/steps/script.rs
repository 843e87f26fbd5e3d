//! Project script execution.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

use crate::error::{DeckhandError, Result};
use crate::runner::{
    LoggerAware, ShellAdapterAware, StepAction, StepContext, StepLogger,
};
use crate::shell::{ShellExecutor, ShellRequest};

/// Runs a script shipped with the application.
///
/// Options: `script` (path, relative to the code root) and `args` (list).
/// The script runs from the code root with the run options exported. The
/// path and every argument are quoted, so they reach the script verbatim.
#[derive(Default)]
pub struct RunScript {
    logger: StepLogger,
    shell: Option<Arc<dyn ShellExecutor>>,
}

impl RunScript {
    /// Factory for the registry.
    #[must_use]
    pub fn boxed() -> Box<dyn StepAction> {
        Box::new(Self::default())
    }
}

impl LoggerAware for RunScript {
    fn set_logger(&mut self, logger: StepLogger) {
        self.logger = logger;
    }
}

impl ShellAdapterAware for RunScript {
    fn set_shell(&mut self, shell: Arc<dyn ShellExecutor>) {
        self.shell = Some(shell);
    }
}

#[async_trait]
impl StepAction for RunScript {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<Option<String>> {
        let script = ctx
            .option_str("script")
            .ok_or_else(|| DeckhandError::internal("option 'script' is required"))?;
        let shell = self
            .shell
            .as_ref()
            .ok_or_else(|| DeckhandError::internal("no shell executor"))?;

        let path = ctx.options.resolve(Path::new(script));
        let program = path.display().to_string();
        let line = shell_words::join(
            std::iter::once(program.as_str()).chain(ctx.option_list("args")),
        );

        let mut request = ShellRequest::new(line, &ctx.options.code_root);
        request.env = ctx.options.to_env();

        self.logger.info(&format!("Running {}", path.display()));
        let output = shell.execute(&request).await?;

        if !output.success() {
            return Err(DeckhandError::internal(format!(
                "{script} exited with status {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }

        let text = output.combined();
        Ok((!text.is_empty()).then_some(text))
    }

    fn as_logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
        Some(self)
    }

    fn as_shell_aware(&mut self) -> Option<&mut dyn ShellAdapterAware> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Phase;
    use crate::runner::RunOptions;
    use crate::testing::RecordingShell;
    use std::collections::BTreeMap;

    fn step_options(yaml: &str) -> BTreeMap<String, serde_yaml::Value> {
        serde_yaml::from_str(yaml).expect("valid yaml")
    }

    #[tokio::test]
    async fn test_runs_script_with_args() {
        let shell = RecordingShell::new();
        let mut step = RunScript::default();
        step.set_shell(shell.clone());

        let options = RunOptions::new("/srv/shop");
        let opts = step_options("script: bin/warmup.sh\nargs: [--env, prod]\n");
        let ctx = StepContext {
            options: &options,
            step_options: &opts,
            step_name: "warmup",
            phase: Phase::Steps,
        };

        let output = step.run(&ctx).await.expect("script should succeed");
        assert_eq!(
            output.as_deref(),
            Some("ran /srv/shop/bin/warmup.sh --env prod")
        );

        let request = shell.requests().pop().expect("one request");
        assert_eq!(request.env["CODE_ROOT"], "/srv/shop");
    }

    #[tokio::test]
    async fn test_script_is_required() {
        let mut step = RunScript::default();
        step.set_shell(RecordingShell::new());

        let options = RunOptions::new("/srv/shop");
        let opts = BTreeMap::new();
        let ctx = StepContext {
            options: &options,
            step_options: &opts,
            step_name: "warmup",
            phase: Phase::Steps,
        };

        let err = step.run(&ctx).await.expect_err("script option is missing");
        assert!(err.to_string().contains("'script'"));
    }

    #[tokio::test]
    async fn test_path_and_args_are_quoted() {
        let shell = RecordingShell::new();
        let mut step = RunScript::default();
        step.set_shell(shell.clone());

        let options = RunOptions::new("/srv/my shop");
        let opts =
            step_options("script: bin/warmup.sh\nargs: [--env, 'a;rm -rf x', '$(id)']\n");
        let ctx = StepContext {
            options: &options,
            step_options: &opts,
            step_name: "warmup",
            phase: Phase::Steps,
        };

        step.run(&ctx).await.expect("script should succeed");

        let request = shell.requests().pop().expect("one request");
        assert!(request.line.starts_with("'/srv/my shop/bin/warmup.sh'"));
        assert_eq!(
            shell_words::split(&request.line).expect("line should split"),
            vec!["/srv/my shop/bin/warmup.sh", "--env", "a;rm -rf x", "$(id)"]
        );
    }
}
