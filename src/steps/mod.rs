//! Built-in step types and callables.
//!
//! These cover the generic parts of a build or deploy: preparing
//! directories, stamping builds, running project scripts, and toggling
//! maintenance mode. Application-specific steps are registered by embedders
//! on top of these.

mod directories;
mod maintenance;
mod script;
mod stamp;

pub use directories::EnsureDirectories;
pub use maintenance::ToggleMaintenance;
pub use script::RunScript;
pub use stamp::{BUILD_ID_FILE, RecordBuildId};

use crate::error::Result;
use crate::planner::{Condition, PlanKind};
use crate::runner::{RunOptions, StepRegistry};

/// Both plan kinds.
const ANY_KIND: &[PlanKind] = &[PlanKind::Build, PlanKind::Deploy];

/// Registers every built-in step type and callable.
pub fn register_builtins(registry: &mut StepRegistry) {
    registry
        .register_step("EnsureDirectories", ANY_KIND, EnsureDirectories::boxed)
        .register_step("RunScript", ANY_KIND, RunScript::boxed)
        .register_step_with_triggers(
            "RecordBuildId",
            &[PlanKind::Build],
            &[Condition::Code],
            RecordBuildId::boxed,
        )
        .register_step(
            "ToggleMaintenance",
            &[PlanKind::Deploy],
            ToggleMaintenance::boxed,
        )
        .register_callable("deckhand::describe_run", describe_run);
}

/// Summarizes the run options on one line.
///
/// # Errors
///
/// Never fails.
pub fn describe_run(options: &RunOptions) -> Result<Option<String>> {
    let mut parts = vec![format!("code root {}", options.code_root.display())];

    if let Some(build_id) = &options.build_id {
        parts.push(format!("build {build_id}"));
    }
    if let Some(reference) = &options.repo_reference {
        parts.push(format!("ref {reference}"));
    }
    if let Some(snapshot) = &options.snapshot_path {
        parts.push(format!("snapshot {}", snapshot.display()));
    }
    if options.include_assets {
        parts.push(String::from("assets"));
    }
    if options.include_databases {
        parts.push(String::from("databases"));
    }

    Ok(Some(parts.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registration() {
        let registry = StepRegistry::with_builtins();

        assert_eq!(
            registry.step_type_names(),
            vec!["EnsureDirectories", "RecordBuildId", "RunScript", "ToggleMaintenance"]
        );
        assert_eq!(registry.callable_names(), vec!["deckhand::describe_run"]);

        let stamp = registry.step_type("RecordBuildId").expect("registered");
        assert!(stamp.supports(PlanKind::Build));
        assert!(!stamp.supports(PlanKind::Deploy));
        assert_eq!(stamp.default_triggers, vec![Condition::Code]);
    }

    #[test]
    fn test_describe_run() {
        let mut options = RunOptions::new("/srv/shop");
        options.build_id = Some(String::from("20240101120000"));
        options.include_assets = true;

        let summary = describe_run(&options).expect("never fails");
        assert_eq!(
            summary.as_deref(),
            Some("code root /srv/shop, build 20240101120000, assets")
        );
    }
}
