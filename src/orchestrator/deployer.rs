//! Application deployer.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{ApplicationConfig, DeckhandConfig};
use crate::error::Result;
use crate::planner::{Condition, ConditionSet, PlanKind, RawPlan};
use crate::runner::{PlanRunner, RunMode, RunOptions, RunReport};

use super::{base_options, required_plan};

/// Where deployed code comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CodeSource {
    /// No code is deployed.
    #[default]
    None,
    /// A prepared build.
    Build {
        /// Build identifier.
        build_id: String,
    },
    /// A repository checkout.
    Repository {
        /// Branch, tag or commit.
        reference: String,
    },
    /// A snapshot archive.
    Snapshot {
        /// Snapshot path; relative paths resolve against the snapshot directory.
        path: PathBuf,
    },
}

/// What to deploy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployRequest {
    /// Code source.
    pub source: CodeSource,
    /// Deploy assets.
    pub include_assets: bool,
    /// Deploy databases.
    pub include_databases: bool,
    /// Refresh caches and indexes.
    pub refresh: bool,
    /// Run the clean list first.
    pub clean: bool,
    /// Let rollback steps undo database and asset changes.
    pub allow_full_rollback: bool,
    /// Extra options from the command line.
    pub extra: BTreeMap<String, String>,
}

/// Runs the deploy plan of an application.
#[derive(Debug, Clone)]
pub struct ApplicationDeployer {
    /// Application being deployed.
    application: Arc<ApplicationConfig>,
    /// The configured deploy plan.
    plan: RawPlan,
    /// Plan runner.
    runner: PlanRunner,
}

impl ApplicationDeployer {
    /// Creates a deployer from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if no deploy plan is configured.
    pub fn from_config(config: &DeckhandConfig, runner: PlanRunner) -> Result<Self> {
        Ok(Self {
            application: Arc::new(config.application.clone()),
            plan: required_plan(config, PlanKind::Deploy)?,
            runner,
        })
    }

    /// Conditions active for `request`.
    ///
    /// The skeleton is always part of a deploy.
    #[must_use]
    pub fn conditions(request: &DeployRequest) -> ConditionSet {
        let mut conditions = ConditionSet::new().with(Condition::Skeleton);

        match &request.source {
            CodeSource::None => {}
            CodeSource::Build { .. } => {
                conditions.insert(Condition::Code);
                conditions.insert(Condition::CodeBuild);
            }
            CodeSource::Repository { .. } => {
                conditions.insert(Condition::Code);
                conditions.insert(Condition::CodeRepo);
            }
            CodeSource::Snapshot { .. } => conditions.insert(Condition::Code),
        }

        if request.include_assets {
            conditions.insert(Condition::Assets);
        }
        if request.include_databases {
            conditions.insert(Condition::Databases);
        }
        if request.refresh {
            conditions.insert(Condition::Refresh);
        }
        conditions
    }

    /// Option bag for `request`.
    #[must_use]
    pub fn options(&self, request: &DeployRequest) -> RunOptions {
        let mut options = base_options(&self.application);

        match &request.source {
            CodeSource::None => {}
            CodeSource::Build { build_id } => {
                options.build_id = Some(build_id.clone());
                options.build_path = Some(self.application.build_path(build_id));
            }
            CodeSource::Repository { reference } => {
                options.repo_reference = Some(reference.clone());
            }
            CodeSource::Snapshot { path } => {
                options.snapshot_path = Some(if path.is_absolute() {
                    path.clone()
                } else {
                    self.application.snapshot_root().join(path)
                });
            }
        }

        options.include_assets = request.include_assets;
        options.include_databases = request.include_databases;
        options.allow_full_rollback = request.allow_full_rollback;
        options.extra.extend(request.extra.clone());
        options
    }

    /// Runs the deploy plan.
    ///
    /// # Errors
    ///
    /// Returns the plan or step error that stopped the deploy.
    pub async fn deploy(&self, request: &DeployRequest) -> Result<RunReport> {
        let conditions = Self::conditions(request);
        info!(
            "Deploying {} ({}) with {conditions}",
            self.application.name, self.application.environment
        );

        self.runner
            .run_raw(
                &self.plan,
                PlanKind::Deploy,
                &conditions,
                &self.options(request),
                RunMode::forward().with_clean(request.clean),
            )
            .await
    }

    /// Runs only the rollback lists of the deploy plan.
    ///
    /// # Errors
    ///
    /// Returns the plan or rollback error.
    pub async fn rollback(&self, request: &DeployRequest) -> Result<RunReport> {
        info!("Rolling back {}", self.application.name);

        self.runner
            .run_raw(
                &self.plan,
                PlanKind::Deploy,
                &Self::conditions(request),
                &self.options(request),
                RunMode::rollback_only(),
            )
            .await
    }
}
