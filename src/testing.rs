//! Shared fixtures for unit tests.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::{DeckhandError, Result};
use crate::planner::{Condition, PlanKind};
use crate::runner::{
    Capabilities, PlanRunner, RunOptions, StepAction, StepContext, StepDispatcher, StepRegistry,
};
use crate::shell::{ShellExecutor, ShellOutput, ShellRequest};

/// A step that does nothing.
pub struct NoopStep;

#[async_trait]
impl StepAction for NoopStep {
    async fn run(&self, _ctx: &StepContext<'_>) -> Result<Option<String>> {
        Ok(None)
    }
}

impl NoopStep {
    pub fn boxed() -> Box<dyn StepAction> {
        Box::new(Self)
    }
}

fn warm_cache(_: &RunOptions) -> Result<Option<String>> {
    Ok(Some(String::from("warmed")))
}

fn fail_cache(_: &RunOptions) -> Result<Option<String>> {
    Err(DeckhandError::internal("cache offline"))
}

/// Registry with `DeployCode` (deploy, triggered by `code`) and two callables.
pub fn test_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry
        .register_step_with_triggers(
            "DeployCode",
            &[PlanKind::Deploy],
            &[Condition::Code],
            NoopStep::boxed,
        )
        .register_callable("app::warm_cache", warm_cache)
        .register_callable("app::fail_cache", fail_cache);
    registry
}

/// Shell fake that records every command instead of running it.
///
/// Lines starting with `fail` exit with status 1. Lines starting with `slow`
/// wait before finishing. Every command logs `start:<line>` and
/// `end:<line>`.
#[derive(Default)]
pub struct RecordingShell {
    events: Mutex<Vec<String>>,
    requests: Mutex<Vec<ShellRequest>>,
}

impl RecordingShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    /// Lines of every command started, in start order.
    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix("start:").map(str::to_string))
            .collect()
    }

    pub fn requests(&self) -> Vec<ShellRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn record(&self, event: String) {
        self.events.lock().expect("events lock").push(event);
    }
}

#[async_trait]
impl ShellExecutor for RecordingShell {
    async fn execute(&self, request: &ShellRequest) -> Result<ShellOutput> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.record(format!("start:{}", request.line));

        if request.line.starts_with("slow") {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        self.record(format!("end:{}", request.line));

        if request.line.starts_with("fail") {
            return Ok(ShellOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("{} failed", request.line),
            });
        }

        Ok(ShellOutput {
            exit_code: 0,
            stdout: format!("ran {}", request.line),
            stderr: String::new(),
        })
    }
}

/// Runner over [`test_registry`] using `shell`.
pub fn test_runner(shell: &Arc<RecordingShell>) -> PlanRunner {
    let capabilities = Capabilities::new().with_shell(shell.clone());
    PlanRunner::new(StepDispatcher::new(Arc::new(test_registry()), capabilities))
}
