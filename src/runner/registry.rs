//! Registry of step types and callables.
//!
//! Populated once at startup. Normalization consults it to classify bare
//! strings and to reject unknown names before anything runs; the dispatcher
//! uses it to instantiate steps and look up functions.

use std::collections::HashMap;

use crate::error::Result;
use crate::planner::{Condition, PlanKind};

use super::action::StepAction;
use super::capability::Capability;
use super::context::RunOptions;

/// Builds a fresh step instance.
pub type StepFactory = fn() -> Box<dyn StepAction>;

/// A registered callable. Plain function pointers only, so plans stay data.
pub type CallableFn = fn(&RunOptions) -> Result<Option<String>>;

/// A registered step type.
#[derive(Debug, Clone)]
pub struct StepType {
    /// Plan kinds whose step contract this type satisfies.
    pub kinds: Vec<PlanKind>,
    /// Triggers applied when a definition declares none.
    pub default_triggers: Vec<Condition>,
    /// Constructor.
    pub factory: StepFactory,
}

/// Step type and callable registry.
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    types: HashMap<String, StepType>,
    callables: HashMap<String, CallableFn>,
}

impl StepType {
    /// Returns true if the type can be used in a plan of `kind`.
    #[must_use]
    pub fn supports(&self, kind: PlanKind) -> bool {
        self.kinds.contains(&kind)
    }
}

impl StepRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in steps and callables.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::steps::register_builtins(&mut registry);
        registry
    }

    /// Registers a step type for the given plan kinds.
    pub fn register_step(
        &mut self,
        name: impl Into<String>,
        kinds: &[PlanKind],
        factory: StepFactory,
    ) -> &mut Self {
        self.register_step_with_triggers(name, kinds, &[], factory)
    }

    /// Registers a step type that carries default triggers.
    pub fn register_step_with_triggers(
        &mut self,
        name: impl Into<String>,
        kinds: &[PlanKind],
        default_triggers: &[Condition],
        factory: StepFactory,
    ) -> &mut Self {
        self.types.insert(
            name.into(),
            StepType {
                kinds: kinds.to_vec(),
                default_triggers: default_triggers.to_vec(),
                factory,
            },
        );
        self
    }

    /// Registers a callable under `reference`.
    pub fn register_callable(
        &mut self,
        reference: impl Into<String>,
        function: CallableFn,
    ) -> &mut Self {
        self.callables.insert(reference.into(), function);
        self
    }

    /// Looks up a step type.
    #[must_use]
    pub fn step_type(&self, name: &str) -> Option<&StepType> {
        self.types.get(name)
    }

    /// Looks up a callable.
    #[must_use]
    pub fn callable(&self, reference: &str) -> Option<CallableFn> {
        self.callables.get(reference).copied()
    }

    /// Instantiates a step type.
    #[must_use]
    pub fn instantiate(&self, name: &str) -> Option<Box<dyn StepAction>> {
        self.types.get(name).map(|t| (t.factory)())
    }

    /// Capabilities a step type asks to have injected.
    ///
    /// Reads a fresh instance's `as_*_aware` accessors, the same ones the
    /// dispatcher consults before running it.
    #[must_use]
    pub fn requested_capabilities(&self, name: &str) -> Option<Vec<Capability>> {
        let mut action = self.instantiate(name)?;
        let mut requested = Vec::new();
        if action.as_logger_aware().is_some() {
            requested.push(Capability::Logger);
        }
        if action.as_config_aware().is_some() {
            requested.push(Capability::ApplicationConfig);
        }
        if action.as_shell_aware().is_some() {
            requested.push(Capability::Shell);
        }
        if action.as_mount_aware().is_some() {
            requested.push(Capability::MountManager);
        }
        if action.as_repository_aware().is_some() {
            requested.push(Capability::Repository);
        }
        if action.as_maintenance_aware().is_some() {
            requested.push(Capability::MaintenanceStrategy);
        }
        if action.as_database_aware().is_some() {
            requested.push(Capability::DatabaseManager);
        }
        Some(requested)
    }

    /// Registered step type names, sorted.
    #[must_use]
    pub fn step_type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Registered callable references, sorted.
    #[must_use]
    pub fn callable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.callables.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::NoopStep;

    fn ok_callable(_: &RunOptions) -> Result<Option<String>> {
        Ok(Some(String::from("ok")))
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = StepRegistry::new();
        registry
            .register_step("Noop", &[PlanKind::Build, PlanKind::Deploy], NoopStep::boxed)
            .register_callable("app::ok", ok_callable);

        let step_type = registry.step_type("Noop").expect("Noop should be registered");
        assert!(step_type.supports(PlanKind::Deploy));
        assert!(step_type.default_triggers.is_empty());
        assert!(registry.instantiate("Noop").is_some());
        assert!(registry.instantiate("Missing").is_none());

        let callable = registry.callable("app::ok").expect("callable should be registered");
        let output = callable(&RunOptions::default()).expect("callable should succeed");
        assert_eq!(output.as_deref(), Some("ok"));
    }

    #[test]
    fn test_default_triggers_and_kinds() {
        let mut registry = StepRegistry::new();
        registry.register_step_with_triggers(
            "DeployCode",
            &[PlanKind::Deploy],
            &[Condition::Code],
            NoopStep::boxed,
        );

        let step_type = registry.step_type("DeployCode").expect("registered");
        assert!(!step_type.supports(PlanKind::Build));
        assert_eq!(step_type.default_triggers, vec![Condition::Code]);
        assert_eq!(registry.step_type_names(), vec!["DeployCode"]);
    }

    #[test]
    fn test_builtins_are_registered() {
        let registry = StepRegistry::with_builtins();
        assert!(!registry.step_type_names().is_empty());
        assert!(!registry.callable_names().is_empty());
    }

    #[test]
    fn test_requested_capabilities() {
        let registry = StepRegistry::with_builtins();

        assert_eq!(
            registry.requested_capabilities("ToggleMaintenance"),
            Some(vec![Capability::Logger, Capability::MaintenanceStrategy])
        );
        assert_eq!(
            registry.requested_capabilities("RunScript"),
            Some(vec![Capability::Logger, Capability::Shell])
        );
        assert!(registry.requested_capabilities("Missing").is_none());
    }
}
