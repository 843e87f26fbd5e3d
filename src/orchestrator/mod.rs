//! Build and deploy orchestration.
//!
//! Orchestrators turn a user's intent (what to deploy, from where, with
//! which extras) into a condition set and an option bag, then hand the
//! configured plan to the [`PlanRunner`].

mod builder;
mod deployer;

pub use builder::{ApplicationBuilder, BuildRequest};
pub use deployer::{ApplicationDeployer, CodeSource, DeployRequest};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ApplicationConfig, DeckhandConfig};
use crate::error::{ConfigError, Result};
use crate::planner::{PlanKind, RawPlan};
use crate::runner::{Capabilities, PlanRunner, RunOptions, StepDispatcher, StepRegistry};
use crate::shell::LocalShell;

/// Format of generated build identifiers.
pub const BUILD_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// Generates a build identifier from the current time.
#[must_use]
pub fn generate_build_id() -> String {
    Utc::now().format(BUILD_ID_FORMAT).to_string()
}

/// Capabilities available when running on the local host.
///
/// The bag holds the application configuration and a [`LocalShell`] set up
/// from the shell configuration.
#[must_use]
pub fn local_capabilities(config: &DeckhandConfig) -> Capabilities {
    let shell = LocalShell::new()
        .with_shell(config.shell.program.clone())
        .with_env(config.shell.env.clone());

    Capabilities::new()
        .with_application_config(Arc::new(config.application.clone()))
        .with_shell(Arc::new(shell))
}

/// Creates a runner that executes commands on the local host.
#[must_use]
pub fn local_runner(config: &DeckhandConfig, registry: Arc<StepRegistry>) -> PlanRunner {
    let dispatcher = StepDispatcher::new(registry, local_capabilities(config))
        .with_default_timeout(config.shell.timeout_secs.map(Duration::from_secs));

    PlanRunner::new(dispatcher)
}

/// Option bag shared by builds and deploys of `app`.
fn base_options(app: &ApplicationConfig) -> RunOptions {
    let mut options = RunOptions::new(app.code_root.clone());
    options.extra.clone_from(&app.options);
    options
        .extra
        .insert(String::from("environment"), app.environment.clone());
    options
        .extra
        .insert(String::from("strategy"), app.strategy.to_string());
    options
}

/// Returns the configured plan of `kind`.
fn required_plan(config: &DeckhandConfig, kind: PlanKind) -> Result<RawPlan> {
    config.plan(kind).cloned().ok_or_else(|| {
        ConfigError::validation(format!("No {kind} plan configured"), kind.to_string()).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Capability;

    #[test]
    fn test_build_id_format() {
        let id = generate_build_id();
        assert_eq!(id.len(), 14);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_local_capabilities() {
        let config = crate::config::ConfigParser::new()
            .parse_yaml("application:\n  name: shop\n  code_root: /srv/shop\n", None)
            .expect("config should parse");

        let available = local_capabilities(&config).available();
        assert!(available.contains(&Capability::Shell));
        assert!(available.contains(&Capability::ApplicationConfig));
        assert!(!available.contains(&Capability::MaintenanceStrategy));
    }
}
