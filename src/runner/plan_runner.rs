//! Plan execution.
//!
//! The runner drives one plan through its phases:
//!
//! ```text
//! [clean] -> preflight -> steps -> done
//!                           |
//!                        failure -> rollback-preflight -> rollback-steps -> failed
//! ```
//!
//! The first failing step stops the forward phases. Rollback lists run once,
//! top to bottom, and the original failure is returned afterwards. A
//! rollback-only run skips straight to the rollback lists.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::borrow::Cow;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::error::{DeckhandError, Result, RollbackError, StepError};
use crate::planner::{
    ConditionSet, ParallelGroup, Phase, Plan, PlanHasher, PlanKind, PlanNormalizer, RawPlan, Step,
    StepVariant, should_run,
};

use super::context::{RunMode, RunOptions};
use super::dispatcher::StepDispatcher;

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Not started.
    Pending,
    /// Running the clean list.
    Clean,
    /// Running the preflight list.
    Preflight,
    /// Running the main list.
    Steps,
    /// Running the rollback preflight list.
    RollbackPreflight,
    /// Running the rollback list.
    RollbackSteps,
    /// Every forward step succeeded.
    Done,
    /// A rollback-only run completed.
    RolledBack,
    /// A step failed.
    Failed,
}

/// Outcome of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step ran and succeeded.
    Succeeded,
    /// The step was filtered out by the run conditions.
    Skipped,
    /// The step ran and failed.
    Failed,
}

/// Record of one step of a run.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// Phase the step belongs to.
    pub phase: Phase,
    /// Step name.
    pub name: String,
    /// Step variant label.
    pub kind: &'static str,
    /// Outcome.
    pub status: StepStatus,
    /// Output text, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Failure message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Report of a plan run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Unique run identifier.
    pub run_id: String,
    /// Host the run executed on.
    pub host: String,
    /// Plan kind.
    pub kind: PlanKind,
    /// Plan fingerprint.
    pub fingerprint: String,
    /// Active conditions.
    pub conditions: ConditionSet,
    /// Final (or current) state.
    pub state: RunState,
    /// Per-step records, in execution order.
    pub records: Vec<StepRecord>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// Drives plans through their phases.
#[derive(Debug, Clone)]
pub struct PlanRunner {
    /// Executes individual steps.
    dispatcher: StepDispatcher,
}

impl PlanRunner {
    /// Creates a runner.
    #[must_use]
    pub const fn new(dispatcher: StepDispatcher) -> Self {
        Self { dispatcher }
    }

    /// The dispatcher used for steps.
    #[must_use]
    pub const fn dispatcher(&self) -> &StepDispatcher {
        &self.dispatcher
    }

    /// Normalizes `raw` against this runner's registry.
    ///
    /// # Errors
    ///
    /// Returns a plan error if any definition is invalid.
    pub fn normalize(&self, raw: &RawPlan, kind: PlanKind) -> Result<Plan> {
        let plan = PlanNormalizer::new(self.dispatcher.registry(), kind).normalize(raw)?;
        debug!("Normalized {kind} plan with {} steps", plan.step_count());
        Ok(plan)
    }

    /// Normalizes `raw` and runs it.
    ///
    /// Nothing executes if normalization fails.
    ///
    /// # Errors
    ///
    /// Returns a plan error, or the failure of the run.
    pub async fn run_raw(
        &self,
        raw: &RawPlan,
        kind: PlanKind,
        conditions: &ConditionSet,
        options: &RunOptions,
        mode: RunMode,
    ) -> Result<RunReport> {
        let plan = self.normalize(raw, kind)?;
        self.run_plan(&plan, conditions, options, mode).await
    }

    /// Runs `plan`.
    ///
    /// # Errors
    ///
    /// - a clean step failure, unchanged, without rollback
    /// - the first failing forward step, after the rollback lists ran
    /// - a [`RollbackError`] if a rollback step failed
    pub async fn run_plan(
        &self,
        plan: &Plan,
        conditions: &ConditionSet,
        options: &RunOptions,
        mode: RunMode,
    ) -> Result<RunReport> {
        let mut report = RunReport::new(plan, conditions);
        info!(
            "Starting {} run {} with conditions: {}",
            plan.kind(),
            report.run_id,
            conditions
        );

        if mode.rollback {
            return match self.run_rollback(plan, options, &mut report).await {
                Ok(()) => {
                    report.finish(RunState::RolledBack);
                    info!("Rollback completed: {report}");
                    Ok(report)
                }
                Err(source) => {
                    report.finish(RunState::Failed);
                    error!("Rollback failed: {source}");
                    Err(RollbackError {
                        source,
                        original: None,
                    }
                    .into())
                }
            };
        }

        if mode.clean {
            report.state = RunState::Clean;
            if let Err(e) = self
                .run_phase(plan, Phase::Clean, None, options, &mut report)
                .await
            {
                report.finish(RunState::Failed);
                error!("Clean failed: {e}");
                return Err(e.into());
            }
        }

        let Err(original) = self.run_forward(plan, conditions, options, &mut report).await else {
            report.finish(RunState::Done);
            info!("Run completed: {report}");
            return Ok(report);
        };

        warn!(
            "Step {} failed, rolling back: {original}",
            original.step_name()
        );

        let rollback = self.run_rollback(plan, options, &mut report).await;
        report.finish(RunState::Failed);

        match rollback {
            Ok(()) => {
                error!("Run failed after rollback: {report}");
                Err(DeckhandError::Step(original))
            }
            Err(source) => {
                error!("Rollback failed: {source}");
                Err(RollbackError {
                    source,
                    original: Some(original),
                }
                .into())
            }
        }
    }

    async fn run_forward(
        &self,
        plan: &Plan,
        conditions: &ConditionSet,
        options: &RunOptions,
        report: &mut RunReport,
    ) -> std::result::Result<(), StepError> {
        report.state = RunState::Preflight;
        self.run_phase(plan, Phase::Preflight, None, options, report)
            .await?;

        report.state = RunState::Steps;
        self.run_phase(plan, Phase::Steps, Some(conditions), options, report)
            .await
    }

    async fn run_rollback(
        &self,
        plan: &Plan,
        options: &RunOptions,
        report: &mut RunReport,
    ) -> std::result::Result<(), StepError> {
        report.state = RunState::RollbackPreflight;
        self.run_phase(plan, Phase::RollbackPreflight, None, options, report)
            .await?;

        report.state = RunState::RollbackSteps;
        self.run_phase(plan, Phase::RollbackSteps, None, options, report)
            .await
    }

    /// Runs the steps of `phase` in order, stopping at the first failure.
    ///
    /// Only the main list is filtered by conditions.
    async fn run_phase(
        &self,
        plan: &Plan,
        phase: Phase,
        filter: Option<&ConditionSet>,
        options: &RunOptions,
        report: &mut RunReport,
    ) -> std::result::Result<(), StepError> {
        let steps = plan.phase(phase);
        if steps.is_empty() {
            debug!("[{phase}] No steps");
            return Ok(());
        }

        for step in steps {
            let selected = match filter {
                Some(conditions) => select(step, conditions),
                None => Some(Cow::Borrowed(step)),
            };

            let Some(selected) = selected else {
                debug!("[{phase}] Skipping step {step}");
                report.record(phase, step, StepStatus::Skipped, None, None, Duration::ZERO);
                continue;
            };

            let started = Instant::now();
            match self.dispatcher.dispatch(&selected, phase, options).await {
                Ok(output) => {
                    report.record(
                        phase,
                        step,
                        StepStatus::Succeeded,
                        output,
                        None,
                        started.elapsed(),
                    );
                }
                Err(e) => {
                    error!("[{phase}] Step {step} failed: {e}");
                    report.record(
                        phase,
                        step,
                        StepStatus::Failed,
                        None,
                        Some(e.to_string()),
                        started.elapsed(),
                    );
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}

/// Applies trigger filtering to a main-list step.
///
/// Group members are filtered by their own triggers; a group left with no
/// members is skipped.
fn select<'s>(step: &'s Step, conditions: &ConditionSet) -> Option<Cow<'s, Step>> {
    if !should_run(&step.triggers, conditions) {
        return None;
    }

    let Some(children) = step.children() else {
        return Some(Cow::Borrowed(step));
    };

    if children.iter().all(|c| should_run(&c.triggers, conditions)) {
        return Some(Cow::Borrowed(step));
    }

    let kept: Vec<Step> = children
        .iter()
        .filter(|c| should_run(&c.triggers, conditions))
        .cloned()
        .collect();

    if kept.is_empty() {
        return None;
    }

    Some(Cow::Owned(Step {
        name: step.name.clone(),
        variant: StepVariant::Parallel(ParallelGroup { children: kept }),
        triggers: step.triggers.clone(),
    }))
}

impl RunReport {
    /// Creates an empty report for `plan`.
    #[must_use]
    pub fn new(plan: &Plan, conditions: &ConditionSet) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            host: local_hostname(),
            kind: plan.kind(),
            fingerprint: PlanHasher::new().hash_plan(plan),
            conditions: conditions.clone(),
            state: RunState::Pending,
            records: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn record(
        &mut self,
        phase: Phase,
        step: &Step,
        status: StepStatus,
        output: Option<String>,
        error: Option<String>,
        elapsed: Duration,
    ) {
        self.records.push(StepRecord {
            phase,
            name: step.name.clone(),
            kind: step.variant.kind_label(),
            status,
            output,
            error,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        });
    }

    fn finish(&mut self, state: RunState) {
        self.state = state;
        self.finished_at = Some(Utc::now());
    }

    /// Records of `phase`, in execution order.
    pub fn phase_records(&self, phase: Phase) -> impl Iterator<Item = &StepRecord> {
        self.records.iter().filter(move |r| r.phase == phase)
    }

    /// Names of the steps that ran in `phase`, in execution order.
    #[must_use]
    pub fn executed(&self, phase: Phase) -> Vec<&str> {
        self.phase_records(phase)
            .filter(|r| r.status != StepStatus::Skipped)
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Number of records with `status`.
    #[must_use]
    pub fn count(&self, status: StepStatus) -> usize {
        self.records.iter().filter(|r| r.status == status).count()
    }

    /// Returns true if the run completed without failure.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.state, RunState::Done | RunState::RolledBack)
    }

    /// Total run time, once finished.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_at.map(|end| end - self.started_at)
    }
}

fn local_hostname() -> String {
    hostname::get().map_or_else(
        |_| String::from("unknown"),
        |h| h.to_string_lossy().to_string(),
    )
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Clean => "clean",
            Self::Preflight => "preflight",
            Self::Steps => "steps",
            Self::RollbackPreflight => "rollback-preflight",
            Self::RollbackSteps => "rollback-steps",
            Self::Done => "done",
            Self::RolledBack => "rolled back",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Succeeded => "ok",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for RunReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} run {}: {} succeeded, {} failed, {} skipped",
            self.kind,
            self.state,
            self.count(StepStatus::Succeeded),
            self.count(StepStatus::Failed),
            self.count(StepStatus::Skipped)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Condition;
    use crate::testing::{RecordingShell, test_runner};

    fn conditions(list: &[Condition]) -> ConditionSet {
        list.iter().copied().collect()
    }

    fn raw(yaml: &str) -> RawPlan {
        RawPlan::from_yaml(yaml).expect("valid raw plan")
    }

    async fn run(
        yaml: &str,
        active: &[Condition],
        mode: RunMode,
    ) -> (std::sync::Arc<RecordingShell>, Result<RunReport>) {
        let shell = RecordingShell::new();
        let runner = test_runner(&shell);
        let result = runner
            .run_raw(
                &raw(yaml),
                PlanKind::Deploy,
                &conditions(active),
                &RunOptions::new("/srv/shop"),
                mode,
            )
            .await;
        (shell, result)
    }

    const BUILD_AND_DEPLOY: &str = r"
steps:
  - command: echo build
    name: build
    triggers: [code]
  - DeployCode
";

    #[tokio::test]
    async fn test_code_condition_runs_triggered_steps() {
        let (shell, result) = run(BUILD_AND_DEPLOY, &[Condition::Code], RunMode::forward()).await;
        let report = result.expect("run should succeed");

        assert_eq!(report.state, RunState::Done);
        assert_eq!(report.executed(Phase::Steps), vec!["build", "DeployCode"]);
        assert_eq!(shell.lines(), vec!["echo build"]);
        assert!(report.is_success());
        assert!(report.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_unrelated_condition_skips_triggered_steps() {
        let (shell, result) =
            run(BUILD_AND_DEPLOY, &[Condition::Assets], RunMode::forward()).await;
        let report = result.expect("run should succeed");

        assert!(report.executed(Phase::Steps).is_empty());
        assert_eq!(report.count(StepStatus::Skipped), 2);
        assert!(shell.lines().is_empty());
    }

    const NAMED_STEPS: &str = r"
steps:
  build: make build
  deploy:
    class: DeployCode
";

    #[tokio::test]
    async fn test_default_triggers_skip_class_step() {
        let (shell, result) = run(NAMED_STEPS, &[Condition::Assets], RunMode::forward()).await;
        let report = result.expect("run should succeed");

        assert_eq!(report.executed(Phase::Steps), vec!["build"]);
        let deploy = report
            .records
            .iter()
            .find(|r| r.phase == Phase::Steps && r.name == "deploy")
            .expect("deploy should be recorded");
        assert_eq!(deploy.status, StepStatus::Skipped);
        assert_eq!(shell.lines(), vec!["make build"]);
    }

    #[tokio::test]
    async fn test_default_triggers_run_class_step() {
        let (shell, result) = run(NAMED_STEPS, &[Condition::Code], RunMode::forward()).await;
        let report = result.expect("run should succeed");

        assert_eq!(report.executed(Phase::Steps), vec!["build", "deploy"]);
        assert_eq!(report.count(StepStatus::Skipped), 0);
        assert_eq!(shell.lines(), vec!["make build"]);
    }

    #[tokio::test]
    async fn test_untriggered_steps_always_run() {
        let yaml = "steps:\n  - echo always\n  - command: echo assets\n    triggers: [assets]\n";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;
        result.expect("run should succeed");

        assert_eq!(shell.lines(), vec!["echo always"]);
    }

    #[tokio::test]
    async fn test_failure_stops_and_rolls_back_once() {
        let yaml = r"
preflight_steps:
  - echo pre
steps:
  - echo a
  - fail b
  - echo c
rollback_preflight_steps:
  - echo rollback-pre
rollback_steps:
  - echo undo
";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;
        let err = result.expect_err("run should fail");

        match err {
            DeckhandError::Step(StepError::CommandFailed { step, .. }) => assert_eq!(step, "fail b"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            shell.lines(),
            vec!["echo pre", "echo a", "fail b", "echo rollback-pre", "echo undo"]
        );
    }

    #[tokio::test]
    async fn test_first_step_failure_with_empty_rollback_preflight() {
        let yaml = "steps:\n  - fail a\n  - echo b\nrollback_steps:\n  - echo undo\n";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;

        let err = result.expect_err("run should fail");
        assert_eq!(err.step_error().map(StepError::step_name), Some("fail a"));
        assert_eq!(shell.lines(), vec!["fail a", "echo undo"]);
    }

    #[tokio::test]
    async fn test_preflight_failure_triggers_rollback() {
        let yaml = "preflight_steps:\n  - fail check\nsteps:\n  - echo a\nrollback_steps:\n  - echo undo\n";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;

        assert!(result.is_err());
        assert_eq!(shell.lines(), vec!["fail check", "echo undo"]);
    }

    #[tokio::test]
    async fn test_preflight_ignores_conditions() {
        let yaml = "preflight_steps:\n  - command: echo pre\n    triggers: [databases]\nsteps:\n  - echo a\n";
        let (shell, result) = run(yaml, &[Condition::Code], RunMode::forward()).await;

        result.expect("run should succeed");
        assert_eq!(shell.lines(), vec!["echo pre", "echo a"]);
    }

    #[tokio::test]
    async fn test_rollback_failure_keeps_original_error() {
        let yaml = "steps:\n  - fail deploy\nrollback_steps:\n  - fail undo\n  - echo never\n";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;

        let err = result.expect_err("run should fail");
        let DeckhandError::Rollback(RollbackError { source, original }) = err else {
            panic!("expected a rollback error");
        };
        assert_eq!(source.step_name(), "fail undo");
        assert_eq!(original.as_ref().map(StepError::step_name), Some("fail deploy"));
        assert_eq!(shell.lines(), vec!["fail deploy", "fail undo"]);
    }

    #[tokio::test]
    async fn test_parallel_group_is_a_barrier() {
        let yaml = r"
steps:
  - x: slow x
    y: slow y
  - echo d
";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;
        result.expect("run should succeed");

        let events = shell.events();
        let position = |event: &str| {
            events
                .iter()
                .position(|e| e == event)
                .expect("event recorded")
        };
        assert!(position("start:slow y") < position("end:slow x"));
        assert!(position("end:slow x") < position("start:echo d"));
        assert!(position("end:slow y") < position("start:echo d"));
    }

    #[tokio::test]
    async fn test_parallel_failure_lets_siblings_finish() {
        let yaml = r"
steps:
  - x: fail x
    y: slow y
  - echo after
rollback_steps:
  - echo undo
";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;

        let err = result.expect_err("run should fail");
        assert!(matches!(
            err,
            DeckhandError::Step(StepError::ParallelGroupFailed { .. })
        ));
        let events = shell.events();
        assert!(events.contains(&String::from("end:slow y")));
        assert!(!events.contains(&String::from("start:echo after")));
        assert!(events.contains(&String::from("start:echo undo")));
    }

    #[tokio::test]
    async fn test_group_members_are_filtered() {
        let yaml = r"
steps:
  - css:
      command: echo css
      triggers: [assets]
    migrate:
      command: echo migrate
      triggers: [databases]
";
        let (shell, result) = run(yaml, &[Condition::Assets], RunMode::forward()).await;
        result.expect("run should succeed");

        assert_eq!(shell.lines(), vec!["echo css"]);
    }

    #[tokio::test]
    async fn test_rollback_only_mode() {
        let yaml = r"
preflight_steps:
  - echo pre
clean_steps:
  - echo clean
steps:
  - echo a
rollback_preflight_steps:
  - echo rollback-pre
rollback_steps:
  - echo undo
";
        let (shell, result) = run(yaml, &[Condition::Code], RunMode::rollback_only()).await;
        let report = result.expect("rollback should succeed");

        assert_eq!(report.state, RunState::RolledBack);
        assert_eq!(shell.lines(), vec!["echo rollback-pre", "echo undo"]);
    }

    #[tokio::test]
    async fn test_rollback_only_failure() {
        let yaml = "steps:\n  - echo a\nrollback_steps:\n  - fail undo\n";
        let (_, result) = run(yaml, &[], RunMode::rollback_only()).await;

        let err = result.expect_err("rollback should fail");
        assert!(matches!(
            err,
            DeckhandError::Rollback(RollbackError { original: None, .. })
        ));
    }

    #[tokio::test]
    async fn test_clean_runs_only_when_requested() {
        let yaml = "clean_steps:\n  - echo clean\npreflight_steps:\n  - echo pre\nsteps:\n  - echo a\n";

        let (shell, result) = run(yaml, &[], RunMode::forward()).await;
        result.expect("run should succeed");
        assert_eq!(shell.lines(), vec!["echo pre", "echo a"]);

        let (shell, result) = run(yaml, &[], RunMode::forward().with_clean(true)).await;
        result.expect("run should succeed");
        assert_eq!(shell.lines(), vec!["echo clean", "echo pre", "echo a"]);
    }

    #[tokio::test]
    async fn test_clean_failure_skips_rollback() {
        let yaml = "clean_steps:\n  - fail clean\nsteps:\n  - echo a\nrollback_steps:\n  - echo undo\n";
        let (shell, result) = run(yaml, &[], RunMode::forward().with_clean(true)).await;

        assert!(result.is_err());
        assert_eq!(shell.lines(), vec!["fail clean"]);
    }

    #[tokio::test]
    async fn test_invalid_plan_runs_nothing() {
        let yaml = "preflight_steps:\n  - echo pre\nsteps:\n  - command: echo a\n    callable: app::warm_cache\n";
        let (shell, result) = run(yaml, &[], RunMode::forward()).await;

        let err = result.expect_err("plan should be rejected");
        assert!(err.is_configuration_error());
        assert!(shell.events().is_empty());
    }

    #[tokio::test]
    async fn test_report_contents() {
        let yaml = "steps:\n  - echo a\n  - callable: app::warm_cache\n    name: warm\n";
        let (_, result) = run(yaml, &[Condition::Code], RunMode::forward()).await;
        let report = result.expect("run should succeed");

        assert_eq!(report.kind, PlanKind::Deploy);
        assert_eq!(report.fingerprint.len(), 64);
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[1].output.as_deref(), Some("warmed"));
        assert_eq!(
            report.to_string(),
            "deploy run done: 2 succeeded, 0 failed, 0 skipped"
        );

        let json = serde_json::to_value(&report).expect("report serializes");
        assert_eq!(json["state"], "done");
        assert_eq!(json["records"][0]["status"], "succeeded");
    }
}
