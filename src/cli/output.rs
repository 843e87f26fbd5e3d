//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans, run
//! reports and validation results in text or JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::planner::{Phase, Plan, PlanHasher, Step};
use crate::runner::{RunReport, StepStatus};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan step row for table display.
#[derive(Tabled)]
struct PlanStepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Triggers")]
    triggers: String,
    #[tabled(rename = "Does")]
    description: String,
}

/// Run record row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Step")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Time")]
    duration: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a normalized plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    fn format_plan_text(plan: &Plan) -> String {
        let fingerprint = PlanHasher::new().hash_plan(plan);
        let mut output = String::new();

        let _ = writeln!(output, "\nPlan: {}", plan.kind().to_string().bold());
        let _ = writeln!(output, "   Fingerprint: {}", PlanHasher::short(&fingerprint));

        for phase in Phase::ALL {
            let steps = plan.phase(phase);
            if steps.is_empty() {
                continue;
            }

            let _ = writeln!(output, "\n{} ({})", phase.to_string().cyan(), steps.len());

            let rows: Vec<PlanStepRow> = steps
                .iter()
                .enumerate()
                .map(|(i, step)| PlanStepRow {
                    index: i + 1,
                    name: Self::truncate(&step.name, 30),
                    kind: step.variant.kind_label().to_string(),
                    triggers: Self::format_triggers(step),
                    description: Self::truncate(&step.description(), 50),
                })
                .collect();

            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    /// Formats a run report.
    #[must_use]
    pub fn format_report(&self, report: &RunReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    fn format_report_text(report: &RunReport) -> String {
        let mut output = String::new();

        let status = if report.is_success() {
            format!("{} {report}", "✓".green())
        } else {
            format!("{} {report}", "✗".red())
        };
        let _ = writeln!(output, "\n{status}");
        let _ = writeln!(output, "   Run: {} on {}", report.run_id, report.host);
        let _ = writeln!(output, "   Conditions: {}", report.conditions);

        if !report.records.is_empty() {
            let rows: Vec<RecordRow> = report
                .records
                .iter()
                .map(|r| RecordRow {
                    phase: r.phase.to_string(),
                    name: Self::truncate(&r.name, 40),
                    status: Self::format_status(r.status),
                    duration: format!("{}ms", r.duration_ms),
                })
                .collect();
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        output
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(
        &self,
        result: &ValidationResult,
        fingerprints: &[(String, String)],
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result.errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": result.warnings,
                    "fingerprints": fingerprints
                        .iter()
                        .map(|(kind, hash)| (kind.clone(), hash.clone()))
                        .collect::<std::collections::BTreeMap<_, _>>(),
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    format!(
                        "{} Configuration has {} error(s)\n",
                        "✗".red(),
                        result.error_count()
                    )
                };

                for error in &result.errors {
                    let _ = writeln!(output, "   - {error}");
                }

                for (kind, hash) in fingerprints {
                    let _ = writeln!(output, "   {kind} plan: {}", PlanHasher::short(hash));
                }

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                output
            }
        }
    }

    fn format_triggers(step: &Step) -> String {
        if step.triggers.is_empty() {
            return "always".dimmed().to_string();
        }
        step.triggers
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn format_status(status: StepStatus) -> String {
        match status {
            StepStatus::Succeeded => "ok".green().to_string(),
            StepStatus::Skipped => "skipped".dimmed().to_string(),
            StepStatus::Failed => "failed".red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

#[derive(Serialize)]
struct PlanJson<'a> {
    fingerprint: String,
    step_count: usize,
    #[serde(flatten)]
    plan: &'a Plan,
}

impl<'a> From<&'a Plan> for PlanJson<'a> {
    fn from(plan: &'a Plan) -> Self {
        Self {
            fingerprint: PlanHasher::new().hash_plan(plan),
            step_count: plan.step_count(),
            plan,
        }
    }
}
