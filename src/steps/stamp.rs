//! Build stamping.

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::ApplicationConfig;
use crate::error::{DeckhandError, Result};
use crate::runner::{
    ApplicationConfigAware, LoggerAware, StepAction, StepContext, StepLogger,
};

/// Name of the file holding the build identifier.
pub const BUILD_ID_FILE: &str = "BUILD_ID";

/// Writes the build identifier into the build directory.
///
/// The build directory is the run's build path, or the configured build
/// directory joined with the build id.
#[derive(Debug, Default)]
pub struct RecordBuildId {
    logger: StepLogger,
    config: Option<Arc<ApplicationConfig>>,
}

impl RecordBuildId {
    /// Factory for the registry.
    #[must_use]
    pub fn boxed() -> Box<dyn StepAction> {
        Box::new(Self::default())
    }
}

impl LoggerAware for RecordBuildId {
    fn set_logger(&mut self, logger: StepLogger) {
        self.logger = logger;
    }
}

impl ApplicationConfigAware for RecordBuildId {
    fn set_application_config(&mut self, config: Arc<ApplicationConfig>) {
        self.config = Some(config);
    }
}

#[async_trait]
impl StepAction for RecordBuildId {
    async fn run(&self, ctx: &StepContext<'_>) -> Result<Option<String>> {
        let build_id = ctx
            .options
            .build_id
            .as_deref()
            .ok_or_else(|| DeckhandError::internal("no build id for this run"))?;

        let build_path = match (&ctx.options.build_path, &self.config) {
            (Some(path), _) => path.clone(),
            (None, Some(config)) => config.build_path(build_id),
            (None, None) => return Err(DeckhandError::internal("no build path for this run")),
        };

        tokio::fs::create_dir_all(&build_path).await?;
        let stamp = build_path.join(BUILD_ID_FILE);
        tokio::fs::write(&stamp, format!("{build_id}\n")).await?;

        self.logger
            .info(&format!("Recorded build {build_id} in {}", stamp.display()));
        Ok(Some(format!("build {build_id}")))
    }

    fn as_logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
        Some(self)
    }

    fn as_config_aware(&mut self) -> Option<&mut dyn ApplicationConfigAware> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Phase;
    use crate::runner::RunOptions;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn app(code_root: PathBuf) -> ApplicationConfig {
        ApplicationConfig {
            name: String::from("shop"),
            environment: String::from("dev"),
            code_root,
            strategy: crate::config::LayoutStrategy::Default,
            build_dir: PathBuf::from("builds"),
            snapshot_dir: PathBuf::from("snapshots"),
            options: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_stamps_configured_build_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut options = RunOptions::new(dir.path());
        options.build_id = Some(String::from("20240101120000"));
        let step_options = BTreeMap::new();
        let ctx = StepContext {
            options: &options,
            step_options: &step_options,
            step_name: "stamp",
            phase: Phase::Steps,
        };

        let mut step = RecordBuildId::default();
        step.set_application_config(Arc::new(app(dir.path().to_path_buf())));

        let output = step.run(&ctx).await.expect("step should succeed");
        assert_eq!(output.as_deref(), Some("build 20240101120000"));

        let stamp = dir.path().join("builds/20240101120000").join(BUILD_ID_FILE);
        let content = std::fs::read_to_string(stamp).expect("stamp written");
        assert_eq!(content, "20240101120000\n");
    }

    #[tokio::test]
    async fn test_requires_build_id() {
        let options = RunOptions::new("/srv");
        let step_options = BTreeMap::new();
        let ctx = StepContext {
            options: &options,
            step_options: &step_options,
            step_name: "stamp",
            phase: Phase::Steps,
        };

        let err = RecordBuildId::default()
            .run(&ctx)
            .await
            .expect_err("build id is missing");
        assert!(err.to_string().contains("no build id"));
    }
}
