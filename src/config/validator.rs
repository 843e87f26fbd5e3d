//! Configuration validation.
//!
//! Checks everything that can be checked without touching the target
//! application: names, paths, shell defaults, and, when a registry is
//! supplied, that every configured plan normalizes. When the runner's
//! capabilities are known, steps that ask for a missing collaborator are
//! rejected here instead of failing mid-run.

use std::sync::Arc;
use tracing::debug;

use crate::error::{ConfigError, DeckhandError, Result};
use crate::planner::{Phase, Plan, PlanKind, PlanNormalizer, Step, StepVariant};
use crate::runner::{Capability, StepRegistry};

use super::spec::{ApplicationConfig, DeckhandConfig, ShellConfig};

/// Validator for Deckhand configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    /// Registry used to normalize plans, if any.
    registry: Option<Arc<StepRegistry>>,
    /// Capabilities the runner will supply, if known.
    capabilities: Option<Vec<Capability>>,
}

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a validator that does not check plans.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            registry: None,
            capabilities: None,
        }
    }

    /// Also normalizes every configured plan against `registry`.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<StepRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Also checks that every step's requested capabilities are in
    /// `available`. Only takes effect together with a registry.
    #[must_use]
    pub fn with_capabilities(mut self, available: Vec<Capability>) -> Self {
        self.capabilities = Some(available);
        self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any were found.
    pub fn validate(&self, config: &DeckhandConfig) -> Result<ValidationResult> {
        let result = self.check(config);

        if let Some(first_error) = result.errors.first() {
            return Err(DeckhandError::Config(ConfigError::validation(
                first_error.message.clone(),
                first_error.field.clone(),
            )));
        }

        debug!("Configuration validation passed");
        Ok(result)
    }

    /// Collects every error and warning without failing.
    #[must_use]
    pub fn check(&self, config: &DeckhandConfig) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_application(&config.application, &mut result);
        Self::validate_shell(&config.shell, &mut result);
        self.validate_plans(config, &mut result);

        result
    }

    fn validate_application(app: &ApplicationConfig, result: &mut ValidationResult) {
        if app.name.is_empty() {
            result.error("application.name", "Application name cannot be empty");
        } else if !is_valid_name(&app.name) {
            result.error(
                "application.name",
                format!(
                    "Application name '{}' is invalid. Must be lowercase alphanumeric with hyphens.",
                    app.name
                ),
            );
        }

        if app.environment.is_empty() {
            result.error("application.environment", "Environment cannot be empty");
        }

        if app.code_root.as_os_str().is_empty() {
            result.error("application.code_root", "Code root cannot be empty");
        } else if !app.code_root.exists() {
            result.warnings.push(format!(
                "Code root {} does not exist yet",
                app.code_root.display()
            ));
        }

        if app.build_dir == app.snapshot_dir {
            result.error(
                "application.snapshot_dir",
                "Snapshot directory must differ from the build directory",
            );
        }
    }

    fn validate_shell(shell: &ShellConfig, result: &mut ValidationResult) {
        if shell.program.trim().is_empty() {
            result.error("shell.program", "Shell program cannot be empty");
        }

        if shell.timeout_secs == Some(0) {
            result.error("shell.timeout_secs", "Timeout must be at least one second");
        }
    }

    fn validate_plans(&self, config: &DeckhandConfig, result: &mut ValidationResult) {
        if config.build.is_none() && config.deploy.is_none() {
            result.error("deploy", "At least one of build or deploy must be configured");
            return;
        }

        for kind in [PlanKind::Build, PlanKind::Deploy] {
            let Some(raw) = config.plan(kind) else {
                result.warnings.push(format!("No {kind} plan configured"));
                continue;
            };

            let Some(registry) = &self.registry else {
                continue;
            };

            match PlanNormalizer::new(registry, kind).normalize(raw) {
                Ok(plan) => {
                    if !plan.has_rollback() {
                        result
                            .warnings
                            .push(format!("The {kind} plan has no rollback steps"));
                    }
                    if let Some(available) = &self.capabilities {
                        Self::validate_capabilities(registry, &plan, available, result);
                    }
                }
                Err(e) => result.error(kind.to_string(), e.to_string()),
            }
        }
    }
}

impl ConfigValidator {
    fn validate_capabilities(
        registry: &StepRegistry,
        plan: &Plan,
        available: &[Capability],
        result: &mut ValidationResult,
    ) {
        for phase in Phase::ALL {
            for step in plan.phase(phase) {
                match step.children() {
                    Some(children) => {
                        for child in children {
                            Self::check_step(registry, plan.kind(), child, available, result);
                        }
                    }
                    None => Self::check_step(registry, plan.kind(), step, available, result),
                }
            }
        }
    }

    fn check_step(
        registry: &StepRegistry,
        kind: PlanKind,
        step: &Step,
        available: &[Capability],
        result: &mut ValidationResult,
    ) {
        let requested = match &step.variant {
            StepVariant::Command(_) => vec![Capability::Shell],
            StepVariant::Class(class) => registry
                .requested_capabilities(&class.type_name)
                .unwrap_or_default(),
            StepVariant::Callable { .. } | StepVariant::Parallel(_) => Vec::new(),
        };

        for capability in requested {
            if !available.contains(&capability) {
                result.error(
                    kind.to_string(),
                    format!(
                        "Step '{}' needs a {capability}, which is not available to this runner",
                        step.name
                    ),
                );
            }
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_lowercase() {
        return false;
    }

    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::testing::test_registry;

    fn config(yaml: &str) -> DeckhandConfig {
        ConfigParser::new()
            .parse_yaml(yaml, None)
            .expect("config should parse")
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("shop"));
        assert!(is_valid_name("my-shop-2"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Shop")); // uppercase
        assert!(!is_valid_name("2shop")); // starts with number
        assert!(!is_valid_name("my_shop")); // underscore
        assert!(!is_valid_name("shop-")); // ends with hyphen
        assert!(!is_valid_name("my--shop")); // consecutive hyphens
    }

    #[test]
    fn test_valid_config_with_warnings() {
        let cfg = config(
            "application:\n  name: shop\n  code_root: /nonexistent/shop\ndeploy:\n  steps: [DeployCode]\n",
        );
        let result = ConfigValidator::new()
            .with_registry(Arc::new(test_registry()))
            .validate(&cfg)
            .expect("config should be valid");

        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.contains("does not exist")));
        assert!(result.warnings.iter().any(|w| w.contains("No build plan")));
        assert!(result.warnings.iter().any(|w| w.contains("no rollback")));
    }

    #[test]
    fn test_collects_every_error() {
        let cfg = config(
            "application:\n  name: My Shop\n  code_root: /srv\nshell:\n  timeout_secs: 0\n",
        );
        let result = ConfigValidator::new().check(&cfg);

        let fields: Vec<&str> = result.errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["application.name", "shell.timeout_secs", "deploy"]);
        assert_eq!(result.error_count(), 3);
    }

    #[test]
    fn test_plan_errors_are_reported_per_kind() {
        let cfg = config(
            "application:\n  name: shop\n  code_root: /srv\nbuild:\n  steps: [DeployCode]\n",
        );
        let err = ConfigValidator::new()
            .with_registry(Arc::new(test_registry()))
            .validate(&cfg)
            .expect_err("DeployCode is not a build step");

        match err {
            DeckhandError::Config(ConfigError::ValidationError { field, message }) => {
                assert_eq!(field.as_deref(), Some("build"));
                assert!(message.contains("DeployCode"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_capability_is_reported() {
        let cfg = config(
            "application:\n  name: shop\n  code_root: /srv\ndeploy:\n  preflight_steps: [echo ready]\n  steps: [ToggleMaintenance]\n",
        );
        let available = vec![
            Capability::Logger,
            Capability::ApplicationConfig,
            Capability::Shell,
        ];
        let result = ConfigValidator::new()
            .with_registry(Arc::new(StepRegistry::with_builtins()))
            .with_capabilities(available)
            .check(&cfg);

        assert_eq!(result.error_count(), 1);
        let error = &result.errors[0];
        assert_eq!(error.field, "deploy");
        assert!(error.message.contains("ToggleMaintenance"));
        assert!(error.message.contains(&Capability::MaintenanceStrategy.to_string()));
    }

    #[test]
    fn test_capabilities_checked_inside_groups() {
        let cfg = config(
            "application:\n  name: shop\n  code_root: /srv\ndeploy:\n  steps:\n    - steps: [echo a, ToggleMaintenance]\n",
        );
        let result = ConfigValidator::new()
            .with_registry(Arc::new(StepRegistry::with_builtins()))
            .with_capabilities(vec![Capability::Logger])
            .check(&cfg);

        let messages: Vec<&str> = result.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages.len(), 2, "errors: {messages:?}");
        assert!(messages[0].contains("'echo a'"));
        assert!(messages[1].contains("ToggleMaintenance"));
    }

    #[test]
    fn test_init_template_is_valid() {
        let cfg = config(include_str!("../../templates/deckhand.yaml"));
        let available = vec![
            Capability::Logger,
            Capability::ApplicationConfig,
            Capability::Shell,
        ];
        let result = ConfigValidator::new()
            .with_registry(Arc::new(StepRegistry::with_builtins()))
            .with_capabilities(available)
            .check(&cfg);

        assert!(result.is_valid(), "template errors: {:?}", result.errors);
    }
}
