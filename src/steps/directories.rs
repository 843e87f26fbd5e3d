//! Directory preparation.

use async_trait::async_trait;

use crate::error::Result;
use crate::runner::{LoggerAware, StepAction, StepContext, StepLogger};

/// Creates every directory listed in the `paths` option.
///
/// Relative paths resolve against the code root. Existing directories are
/// left alone.
#[derive(Debug, Default)]
pub struct EnsureDirectories {
    logger: StepLogger,
}

impl EnsureDirectories {
    /// Factory for the registry.
    #[must_use]
    pub fn boxed() -> Box<dyn StepAction> {
        Box::new(Self::default())
    }
}

impl LoggerAware for EnsureDirectories {
    fn set_logger(&mut self, logger: StepLogger) {
        self.logger = logger;
    }
}

#[async_trait]
impl StepAction for EnsureDirectories {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<Option<String>> {
        let paths = ctx.option_list("paths");
        if paths.is_empty() {
            self.logger.warn("No paths configured");
            return Ok(None);
        }

        let mut created = 0;
        for path in &paths {
            let target = ctx.options.resolve(std::path::Path::new(path));
            if target.is_dir() {
                self.logger.debug(&format!("{} exists", target.display()));
                continue;
            }
            tokio::fs::create_dir_all(&target).await?;
            self.logger.info(&format!("Created {}", target.display()));
            created += 1;
        }

        Ok(Some(format!("{created} of {} directories created", paths.len())))
    }

    fn as_logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Phase;
    use crate::runner::RunOptions;
    use std::collections::BTreeMap;

    #[test]
    fn test_creates_missing_directories() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("var")).expect("create var");

        let options = RunOptions::new(dir.path());
        let mut step_options = BTreeMap::new();
        step_options.insert(
            String::from("paths"),
            serde_yaml::from_str("[var, pub/media, var/cache]").expect("valid yaml"),
        );
        let ctx = StepContext {
            options: &options,
            step_options: &step_options,
            step_name: "dirs",
            phase: Phase::Steps,
        };

        let step = EnsureDirectories::default();
        let output = tokio_test::block_on(step.run(&ctx)).expect("step should succeed");

        assert_eq!(output.as_deref(), Some("2 of 3 directories created"));
        assert!(dir.path().join("pub/media").is_dir());
        assert!(dir.path().join("var/cache").is_dir());
    }

    #[test]
    fn test_no_paths_is_a_noop() {
        let options = RunOptions::new("/nonexistent");
        let step_options = BTreeMap::new();
        let ctx = StepContext {
            options: &options,
            step_options: &step_options,
            step_name: "dirs",
            phase: Phase::Preflight,
        };

        let output = tokio_test::block_on(EnsureDirectories::default().run(&ctx))
            .expect("step should succeed");
        assert!(output.is_none());
    }
}
