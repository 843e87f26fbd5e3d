//! Application builder.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{ApplicationConfig, DeckhandConfig};
use crate::error::Result;
use crate::planner::{Condition, ConditionSet, PlanKind, RawPlan};
use crate::runner::{PlanRunner, RunMode, RunOptions, RunReport};

use super::{base_options, generate_build_id, required_plan};

/// What to build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build identifier; generated when absent.
    pub build_id: Option<String>,
    /// Include assets in the build.
    pub include_assets: bool,
    /// Include database dumps in the build.
    pub include_databases: bool,
    /// Run the clean list first.
    pub clean: bool,
    /// Extra options from the command line.
    pub extra: BTreeMap<String, String>,
}

/// Runs the build plan of an application.
#[derive(Debug, Clone)]
pub struct ApplicationBuilder {
    /// Application being built.
    application: Arc<ApplicationConfig>,
    /// The configured build plan.
    plan: RawPlan,
    /// Plan runner.
    runner: PlanRunner,
}

impl ApplicationBuilder {
    /// Creates a builder from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no build plan is configured.
    pub fn from_config(config: &DeckhandConfig, runner: PlanRunner) -> Result<Self> {
        Ok(Self {
            application: Arc::new(config.application.clone()),
            plan: required_plan(config, PlanKind::Build)?,
            runner,
        })
    }

    /// Conditions active for `request`.
    #[must_use]
    pub fn conditions(request: &BuildRequest) -> ConditionSet {
        let mut conditions = ConditionSet::new()
            .with(Condition::Code)
            .with(Condition::CodeBuild);
        if request.include_assets {
            conditions.insert(Condition::Assets);
        }
        if request.include_databases {
            conditions.insert(Condition::Databases);
        }
        conditions
    }

    /// Option bag for building `build_id`.
    #[must_use]
    pub fn options(&self, request: &BuildRequest, build_id: &str) -> RunOptions {
        let mut options = base_options(&self.application);
        options.build_id = Some(build_id.to_string());
        options.build_path = Some(self.application.build_path(build_id));
        options.include_assets = request.include_assets;
        options.include_databases = request.include_databases;
        options.extra.extend(request.extra.clone());
        options
    }

    /// Runs the build plan.
    ///
    /// # Errors
    ///
    /// Returns the plan or step error that stopped the build.
    pub async fn build(&self, request: &BuildRequest) -> Result<RunReport> {
        let build_id = request.build_id.clone().unwrap_or_else(generate_build_id);
        let conditions = Self::conditions(request);
        info!("Building {} as {build_id}", self.application.name);

        self.runner
            .run_raw(
                &self.plan,
                PlanKind::Build,
                &conditions,
                &self.options(request, &build_id),
                RunMode::forward().with_clean(request.clean),
            )
            .await
    }

    /// Runs only the rollback lists of the build plan for `build_id`.
    ///
    /// # Errors
    ///
    /// Returns the plan or rollback error.
    pub async fn rollback(&self, request: &BuildRequest, build_id: &str) -> Result<RunReport> {
        info!("Rolling back build {build_id} of {}", self.application.name);

        self.runner
            .run_raw(
                &self.plan,
                PlanKind::Build,
                &Self::conditions(request),
                &self.options(request, build_id),
                RunMode::rollback_only(),
            )
            .await
    }
}
