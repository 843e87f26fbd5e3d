//! Step dispatch.
//!
//! The dispatcher executes one normalized step: it runs commands through the
//! shell executor, calls registered functions, instantiates step types and
//! injects the collaborators they ask for, and fans parallel groups out
//! concurrently.

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::error::StepError;
use crate::planner::{ClassStep, CommandStep, ParallelGroup, Phase, Step, StepVariant};
use crate::shell::ShellRequest;

use super::action::StepAction;
use super::capability::{Capabilities, Capability};
use super::context::{RunOptions, StepContext};
use super::registry::StepRegistry;

/// Output of a single step.
pub type StepResult = Result<Option<String>, StepError>;

/// Executes normalized steps.
#[derive(Debug, Clone)]
pub struct StepDispatcher {
    /// Step types and callables.
    registry: Arc<StepRegistry>,
    /// Collaborators injected into step types.
    capabilities: Capabilities,
    /// Timeout applied to commands that declare none.
    default_timeout: Option<Duration>,
}

impl StepDispatcher {
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(registry: Arc<StepRegistry>, capabilities: Capabilities) -> Self {
        Self {
            registry,
            capabilities,
            default_timeout: None,
        }
    }

    /// Sets the timeout for commands that declare none.
    #[must_use]
    pub const fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// The registry used for lookups.
    #[must_use]
    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    /// The collaborators supplied to steps.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Executes `step`.
    ///
    /// A parallel group completes only once every child has finished; its
    /// result is an error if any child failed.
    ///
    /// # Errors
    ///
    /// Returns the step failure, or a [`StepError::ParallelGroupFailed`]
    /// carrying every child failure.
    pub async fn dispatch(&self, step: &Step, phase: Phase, options: &RunOptions) -> StepResult {
        match &step.variant {
            StepVariant::Parallel(group) => self.run_group(step, group, phase, options).await,
            _ => self.dispatch_leaf(step, phase, options).await,
        }
    }

    async fn dispatch_leaf(&self, step: &Step, phase: Phase, options: &RunOptions) -> StepResult {
        info!("[{phase}] Running step {step}");

        match &step.variant {
            StepVariant::Command(command) => self.run_command(step, command, options).await,
            StepVariant::Callable { reference } => self.run_callable(step, reference, options),
            StepVariant::Class(class) => self.run_class(step, class, phase, options).await,
            StepVariant::Parallel(_) => Err(StepError::ActionFailed {
                step: step.name.clone(),
                message: String::from("parallel groups cannot be nested"),
            }),
        }
    }

    async fn run_command(
        &self,
        step: &Step,
        command: &CommandStep,
        options: &RunOptions,
    ) -> StepResult {
        let shell = require(&step.name, Capability::Shell, self.capabilities.shell())?;

        let working_dir = command
            .working_dir
            .as_deref()
            .map_or_else(|| options.code_root.clone(), |dir| options.resolve(dir));

        let mut env = options.to_env();
        env.extend(command.env.clone());

        let request = ShellRequest {
            line: command.line.clone(),
            working_dir,
            env,
            priority: command.priority,
        };

        debug!("Executing `{}` in {}", request.line, request.working_dir.display());

        let timeout = command
            .timeout_secs
            .map(Duration::from_secs)
            .or(self.default_timeout);

        let executed = match timeout {
            Some(limit) => tokio::time::timeout(limit, shell.execute(&request))
                .await
                .map_err(|_| StepError::Timeout {
                    step: step.name.clone(),
                    timeout_secs: limit.as_secs(),
                })?,
            None => shell.execute(&request).await,
        };

        let output = executed.map_err(|e| StepError::CommandSpawn {
            step: step.name.clone(),
            message: e.to_string(),
        })?;

        if !output.success() {
            return Err(StepError::CommandFailed {
                step: step.name.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let text = output.combined();
        Ok((!text.is_empty()).then_some(text))
    }

    fn run_callable(&self, step: &Step, reference: &str, options: &RunOptions) -> StepResult {
        let function = self
            .registry
            .callable(reference)
            .ok_or_else(|| StepError::CallableFailed {
                step: step.name.clone(),
                message: format!("callable '{reference}' is not registered"),
            })?;

        function(options).map_err(|e| StepError::CallableFailed {
            step: step.name.clone(),
            message: e.to_string(),
        })
    }

    async fn run_class(
        &self,
        step: &Step,
        class: &ClassStep,
        phase: Phase,
        options: &RunOptions,
    ) -> StepResult {
        let mut action =
            self.registry
                .instantiate(&class.type_name)
                .ok_or_else(|| StepError::ActionFailed {
                    step: step.name.clone(),
                    message: format!("step type '{}' is not registered", class.type_name),
                })?;

        self.inject(&step.name, action.as_mut())?;

        let ctx = StepContext {
            options,
            step_options: &class.options,
            step_name: &step.name,
            phase,
        };

        action.run(&ctx).await.map_err(|e| StepError::ActionFailed {
            step: step.name.clone(),
            message: e.to_string(),
        })
    }

    async fn run_group(
        &self,
        step: &Step,
        group: &ParallelGroup,
        phase: Phase,
        options: &RunOptions,
    ) -> StepResult {
        info!(
            "[{phase}] Running parallel group {} with {} steps",
            step.name,
            group.children.len()
        );

        let results = join_all(
            group
                .children
                .iter()
                .map(|child| self.dispatch_leaf(child, phase, options)),
        )
        .await;

        let mut outputs = Vec::new();
        let mut failures = Vec::new();

        for (child, result) in group.children.iter().zip(results) {
            match result {
                Ok(Some(output)) => outputs.push(format!("[{}] {output}", child.name)),
                Ok(None) => {}
                Err(e) => {
                    error!("Step {} of group {} failed: {e}", child.name, step.name);
                    failures.push(e);
                }
            }
        }

        if !failures.is_empty() {
            return Err(StepError::ParallelGroupFailed {
                group: step.name.clone(),
                failures,
            });
        }

        Ok((!outputs.is_empty()).then(|| outputs.join("\n")))
    }

    /// Hands `action` every collaborator it asks for.
    fn inject(&self, step: &str, action: &mut dyn StepAction) -> Result<(), StepError> {
        let caps = &self.capabilities;

        if let Some(aware) = action.as_logger_aware() {
            aware.set_logger(caps.logger().for_step(step));
        }
        if let Some(aware) = action.as_config_aware() {
            aware.set_application_config(require(
                step,
                Capability::ApplicationConfig,
                caps.application_config(),
            )?);
        }
        if let Some(aware) = action.as_shell_aware() {
            aware.set_shell(require(step, Capability::Shell, caps.shell())?);
        }
        if let Some(aware) = action.as_mount_aware() {
            aware.set_mount_manager(require(step, Capability::MountManager, caps.mount_manager())?);
        }
        if let Some(aware) = action.as_repository_aware() {
            aware.set_repository(require(step, Capability::Repository, caps.repository())?);
        }
        if let Some(aware) = action.as_maintenance_aware() {
            aware.set_maintenance_strategy(require(
                step,
                Capability::MaintenanceStrategy,
                caps.maintenance_strategy(),
            )?);
        }
        if let Some(aware) = action.as_database_aware() {
            aware.set_database_manager(require(
                step,
                Capability::DatabaseManager,
                caps.database_manager(),
            )?);
        }

        Ok(())
    }
}

fn require<T>(step: &str, capability: Capability, value: Option<T>) -> Result<T, StepError> {
    value.ok_or_else(|| StepError::MissingCapability {
        step: step.to_string(),
        capability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::planner::{Condition, PlanKind};
    use crate::runner::{LoggerAware, MountManager, MountManagerAware, StepLogger};
    use crate::testing::{NoopStep, RecordingShell, test_registry};
    use async_trait::async_trait;
    use mockall::mock;
    use std::path::Path;

    mock! {
        pub Mounts {}

        #[async_trait]
        impl MountManager for Mounts {
            async fn sync(&self, source: &Path, destination: &Path) -> Result<()>;
        }
    }

    /// Syncs the build into the code root through the mount manager.
    #[derive(Default)]
    struct SyncBuild {
        logger: Option<StepLogger>,
        mounts: Option<Arc<dyn MountManager>>,
    }

    impl LoggerAware for SyncBuild {
        fn set_logger(&mut self, logger: StepLogger) {
            self.logger = Some(logger);
        }
    }

    impl MountManagerAware for SyncBuild {
        fn set_mount_manager(&mut self, mounts: Arc<dyn MountManager>) {
            self.mounts = Some(mounts);
        }
    }

    #[async_trait]
    impl StepAction for SyncBuild {
        async fn run(&self, ctx: &StepContext<'_>) -> Result<Option<String>> {
            let logger = self.logger.as_ref().expect("logger injected");
            assert_eq!(logger.step(), Some(ctx.step_name));

            let mounts = self.mounts.as_ref().expect("mount manager injected");
            let source = ctx.options.build_path.clone().unwrap_or_default();
            mounts.sync(&source, &ctx.options.code_root).await?;
            Ok(Some(String::from("synced")))
        }

        fn as_logger_aware(&mut self) -> Option<&mut dyn LoggerAware> {
            Some(self)
        }

        fn as_mount_aware(&mut self) -> Option<&mut dyn MountManagerAware> {
            Some(self)
        }
    }

    fn sync_build() -> Box<dyn StepAction> {
        Box::new(SyncBuild::default())
    }

    fn registry() -> Arc<StepRegistry> {
        let mut registry = test_registry();
        registry.register_step("SyncBuild", &[PlanKind::Deploy], sync_build);
        Arc::new(registry)
    }

    fn class_step(type_name: &str) -> Step {
        Step::new(
            type_name,
            StepVariant::Class(ClassStep {
                type_name: type_name.to_string(),
                options: std::collections::BTreeMap::new(),
            }),
        )
    }

    fn command(line: &str) -> Step {
        Step::new(line, StepVariant::Command(CommandStep::new(line)))
    }

    fn group(name: &str, children: Vec<Step>) -> Step {
        Step::new(name, StepVariant::Parallel(ParallelGroup { children }))
    }

    #[tokio::test]
    async fn test_injects_requested_capabilities() {
        let mut mounts = MockMounts::new();
        mounts
            .expect_sync()
            .withf(|source, destination| {
                source.as_os_str() == "/builds/42" && destination.as_os_str() == "/srv/shop"
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let caps = Capabilities::new().with_mount_manager(Arc::new(mounts));
        let dispatcher = StepDispatcher::new(registry(), caps);

        let mut options = RunOptions::new("/srv/shop");
        options.build_path = Some("/builds/42".into());

        let output = dispatcher
            .dispatch(&class_step("SyncBuild"), Phase::Steps, &options)
            .await
            .expect("step should succeed");
        assert_eq!(output.as_deref(), Some("synced"));
    }

    #[tokio::test]
    async fn test_missing_capability_fails_before_running() {
        let dispatcher = StepDispatcher::new(registry(), Capabilities::new());

        let err = dispatcher
            .dispatch(&class_step("SyncBuild"), Phase::Steps, &RunOptions::new("/srv"))
            .await
            .expect_err("mount manager is missing");

        assert!(matches!(
            err,
            StepError::MissingCapability {
                capability: Capability::MountManager,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_step_without_capabilities_needs_none() {
        let mut registry = StepRegistry::new();
        registry.register_step("Noop", &[PlanKind::Deploy], NoopStep::boxed);
        let dispatcher = StepDispatcher::new(Arc::new(registry), Capabilities::new());

        let output = dispatcher
            .dispatch(&class_step("Noop"), Phase::Steps, &RunOptions::new("/srv"))
            .await
            .expect("noop should succeed");
        assert!(output.is_none());
    }

    #[tokio::test]
    async fn test_command_environment_and_directory() {
        let shell = RecordingShell::new();
        let dispatcher =
            StepDispatcher::new(registry(), Capabilities::new().with_shell(shell.clone()));

        let mut options = RunOptions::new("/srv/shop");
        options.build_id = Some(String::from("42"));
        options
            .extra
            .insert(String::from("stage"), String::from("from-options"));

        let mut cmd = CommandStep::new("bin/console cache:clear");
        cmd.working_dir = Some("app".into());
        cmd.env
            .insert(String::from("STAGE"), String::from("from-step"));
        let step = Step::new("cache", StepVariant::Command(cmd));

        let output = dispatcher
            .dispatch(&step, Phase::Steps, &options)
            .await
            .expect("command should succeed");
        assert_eq!(output.as_deref(), Some("ran bin/console cache:clear"));

        let request = shell.requests().pop().expect("one request");
        assert_eq!(request.working_dir, std::path::PathBuf::from("/srv/shop/app"));
        assert_eq!(request.env["BUILD_ID"], "42");
        assert_eq!(request.env["CODE_ROOT"], "/srv/shop");
        assert_eq!(request.env["STAGE"], "from-step");
    }

    #[tokio::test]
    async fn test_command_failure_carries_exit_code() {
        let shell = RecordingShell::new();
        let dispatcher = StepDispatcher::new(registry(), Capabilities::new().with_shell(shell));

        let err = dispatcher
            .dispatch(&command("fail migrate"), Phase::Steps, &RunOptions::new("/srv"))
            .await
            .expect_err("command should fail");

        match err {
            StepError::CommandFailed {
                step,
                exit_code,
                stderr,
            } => {
                assert_eq!(step, "fail migrate");
                assert_eq!(exit_code, 1);
                assert_eq!(stderr, "fail migrate failed");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_command_without_shell_capability() {
        let dispatcher = StepDispatcher::new(registry(), Capabilities::new());

        let err = dispatcher
            .dispatch(&command("echo hi"), Phase::Preflight, &RunOptions::new("/srv"))
            .await
            .expect_err("shell is missing");
        assert!(matches!(
            err,
            StepError::MissingCapability {
                capability: Capability::Shell,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let shell = RecordingShell::new();
        let dispatcher = StepDispatcher::new(registry(), Capabilities::new().with_shell(shell))
            .with_default_timeout(Some(Duration::from_millis(5)));

        let err = dispatcher
            .dispatch(&command("slow import"), Phase::Steps, &RunOptions::new("/srv"))
            .await
            .expect_err("command should time out");
        assert!(matches!(err, StepError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_callables() {
        let dispatcher = StepDispatcher::new(registry(), Capabilities::new());
        let options = RunOptions::new("/srv");

        let warm = Step::new(
            "warm",
            StepVariant::Callable {
                reference: String::from("app::warm_cache"),
            },
        );
        let output = dispatcher
            .dispatch(&warm, Phase::Steps, &options)
            .await
            .expect("callable should succeed");
        assert_eq!(output.as_deref(), Some("warmed"));

        let failing = Step::new(
            "fail",
            StepVariant::Callable {
                reference: String::from("app::fail_cache"),
            },
        );
        let err = dispatcher
            .dispatch(&failing, Phase::Steps, &options)
            .await
            .expect_err("callable should fail");
        assert!(err.to_string().contains("cache offline"));
    }

    #[tokio::test]
    async fn test_group_runs_every_child_and_collects_failures() {
        let shell = RecordingShell::new();
        let dispatcher =
            StepDispatcher::new(registry(), Capabilities::new().with_shell(shell.clone()));

        let step = group(
            "assets",
            vec![command("fail css"), command("slow js"), command("fail fonts")],
        )
        .with_triggers(vec![Condition::Assets]);

        let err = dispatcher
            .dispatch(&step, Phase::Steps, &RunOptions::new("/srv"))
            .await
            .expect_err("group should fail");

        let StepError::ParallelGroupFailed { group, failures } = err else {
            panic!("expected a group failure");
        };
        assert_eq!(group, "assets");
        let failed: Vec<&str> = failures.iter().map(StepError::step_name).collect();
        assert_eq!(failed, vec!["fail css", "fail fonts"]);
        assert!(shell.events().contains(&String::from("end:slow js")));
    }

    #[tokio::test]
    async fn test_group_children_run_concurrently() {
        let shell = RecordingShell::new();
        let dispatcher =
            StepDispatcher::new(registry(), Capabilities::new().with_shell(shell.clone()));

        let step = group("pair", vec![command("slow a"), command("slow b")]);
        let output = dispatcher
            .dispatch(&step, Phase::Steps, &RunOptions::new("/srv"))
            .await
            .expect("group should succeed");

        let events = shell.events();
        let position = |event: &str| {
            events
                .iter()
                .position(|e| e == event)
                .expect("event recorded")
        };
        assert!(position("start:slow b") < position("end:slow a"));
        assert_eq!(
            output.as_deref(),
            Some("[slow a] ran slow a\n[slow b] ran slow b")
        );
    }
}
