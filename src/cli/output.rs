//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::ValidationResult;
use crate::error::PlanError;
use crate::executor::{
    ExecutionRecord, ExecutionStatus, ExecutionSummary, RollbackRecord, RollbackStatus, RollbackStepStatus,
    StepStatus,
};
use crate::planner::{Action, Plan, PlanHasher};
use crate::state::LockInfo;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Per-type summary row for table display.
#[derive(Tabled)]
struct SummaryRow {
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Create")]
    create: usize,
    #[tabled(rename = "Skip")]
    skip: usize,
}

/// Planned object row for table display.
#[derive(Tabled)]
struct ObjectRow {
    #[tabled(rename = "Site")]
    site: String,
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Depends on")]
    depends_on: String,
}

/// Step result row for table display.
#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "Site")]
    site: String,
    #[tabled(rename = "Type")]
    object_type: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Execution listing row for table display.
#[derive(Tabled)]
struct ExecutionRow {
    #[tabled(rename = "Plan")]
    plan_id: String,
    #[tabled(rename = "Env")]
    env_name: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Started")]
    started_at: String,
    #[tabled(rename = "Steps")]
    steps: String,
    #[tabled(rename = "Status")]
    status: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        let mut output = String::new();
        let hasher = PlanHasher::new();

        let _ = writeln!(output, "\nPlan {}", plan.plan_id.bold());
        let _ = writeln!(output, "   Org: {}  Environment: {}", plan.org, plan.env_name);
        let _ = writeln!(output, "   Sites: {}", plan.site_count);
        let _ = writeln!(
            output,
            "   Fingerprint: {}\n",
            hasher.short_hash(&hasher.hash_plan(plan))
        );

        if plan.summary.is_empty() {
            output.push_str("   No objects planned.\n");
            return output;
        }

        let rows: Vec<SummaryRow> = plan
            .summary
            .iter()
            .map(|(object_type, counts)| SummaryRow {
                object_type: object_type.friendly().to_string(),
                create: counts.create,
                skip: counts.skip,
            })
            .collect();
        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed {
            let rows: Vec<ObjectRow> = plan
                .sites
                .iter()
                .flat_map(|site| site.objects.iter().map(move |o| (site, o)))
                .map(|(site, object)| ObjectRow {
                    site: site.site_code.clone(),
                    object_type: object.object_type.to_string(),
                    name: Self::truncate(&object.name, 40),
                    action: Self::format_action(object.action),
                    depends_on: object
                        .depends_on
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let skip = plan.object_count() - plan.create_count();
        let _ = write!(
            output,
            "\nPlan: {} to create, {} already present\n",
            plan.create_count().to_string().green(),
            skip.to_string().dimmed()
        );

        output
    }

    /// Formats the row problems and lookup warnings of a planning run.
    #[must_use]
    pub fn format_plan_problems(&self, errors: &[PlanError], warnings: &[String]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "errors": errors.iter().map(ToString::to_string).collect::<Vec<_>>(),
                    "warnings": warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = String::new();
                if !errors.is_empty() {
                    let _ = writeln!(output, "\n{} Rejected rows:", "✗".red());
                    for error in errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                }
                if !warnings.is_empty() {
                    let _ = writeln!(output, "\n{} Warnings:", "⚠".yellow());
                    for warning in warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }
                output
            }
        }
    }

    /// Formats an execution record.
    #[must_use]
    pub fn format_execution(&self, record: &ExecutionRecord) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(record).unwrap_or_default(),
            OutputFormat::Text => {
                let mode = if record.apply { "apply" } else { "dry run" };
                let mut output = format!(
                    "\nExecution of {} ({mode}): {}\n",
                    record.plan_id,
                    Self::format_execution_status(record.status)
                );
                let _ = writeln!(
                    output,
                    "   Steps: {}/{}",
                    record.completed_steps, record.total_steps
                );
                if let Some(step) = &record.current_step
                    && !record.is_finished()
                {
                    let _ = writeln!(
                        output,
                        "   Current: {} {} {} (#{})",
                        step.site_code, step.object_type, step.name, step.order
                    );
                }
                let _ = writeln!(output, "   Started: {}", record.started_at.format("%Y-%m-%d %H:%M:%S"));
                if let Some(finished) = record.finished_at {
                    let _ = writeln!(output, "   Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
                }

                if !record.results.is_empty() {
                    let rows: Vec<StepRow> = record
                        .results
                        .iter()
                        .map(|r| StepRow {
                            site: r.site_code.clone(),
                            object_type: r.object_type.to_string(),
                            name: Self::truncate(&r.name, 40),
                            status: Self::format_step_status(r.status),
                            message: Self::truncate(r.message.as_deref().unwrap_or(""), 50),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }

                let _ = write!(
                    output,
                    "\n{} created, {} existing, {} planned, {} failed, {} skipped\n",
                    record.count(StepStatus::Created).to_string().green(),
                    record.count(StepStatus::Exists),
                    record.count(StepStatus::Planned).to_string().yellow(),
                    record.count(StepStatus::Failed).to_string().red(),
                    record.count(StepStatus::Skipped).to_string().dimmed()
                );
                output
            }
        }
    }

    /// Formats a rollback record.
    #[must_use]
    pub fn format_rollback(&self, record: &RollbackRecord) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(record).unwrap_or_default(),
            OutputFormat::Text => {
                let mode = if record.apply { "apply" } else { "dry run" };
                let mut output = format!(
                    "\nRollback of {} ({mode}): {}\n",
                    record.plan_id,
                    Self::format_rollback_status(record.status)
                );
                let _ = writeln!(
                    output,
                    "   Steps: {}/{}",
                    record.completed_steps, record.total_steps
                );

                if !record.results.is_empty() {
                    let rows: Vec<StepRow> = record
                        .results
                        .iter()
                        .map(|r| StepRow {
                            site: r.site_code.clone(),
                            object_type: r.object_type.to_string(),
                            name: Self::truncate(&r.name, 40),
                            status: Self::format_rollback_step_status(r.status),
                            message: Self::truncate(r.message.as_deref().unwrap_or(""), 50),
                        })
                        .collect();
                    output.push('\n');
                    output.push_str(&Table::new(rows).to_string());
                    output.push('\n');
                }
                output
            }
        }
    }

    /// Formats the execution listing.
    #[must_use]
    pub fn format_executions(&self, executions: &[ExecutionSummary]) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(executions).unwrap_or_default(),
            OutputFormat::Text => {
                if executions.is_empty() {
                    return String::from("No executions recorded.\n");
                }

                let rows: Vec<ExecutionRow> = executions
                    .iter()
                    .map(|e| ExecutionRow {
                        plan_id: e.plan_id.clone(),
                        env_name: e.env_name.clone(),
                        mode: if e.apply { "apply" } else { "dry run" }.to_string(),
                        started_at: e.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                        steps: format!("{}/{}", e.completed_steps, e.total_steps),
                        status: Self::format_execution_status(e.status),
                    })
                    .collect();
                format!("{}\n", Table::new(rows))
            }
        }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(&self, result: &ValidationResult, show_warnings: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "errors": result
                        .errors
                        .iter()
                        .map(|e| serde_json::json!({ "field": e.field, "message": e.message }))
                        .collect::<Vec<_>>(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Configuration is valid\n", "✓".green())
                } else {
                    let mut out = format!("{} Configuration is invalid:\n", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(out, "   - {}: {}", error.field, error.message);
                    }
                    out
                };

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

    /// Formats lock information.
    #[must_use]
    pub fn format_lock(&self, plan_id: &str, lock: Option<&LockInfo>) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&lock).unwrap_or_default(),
            OutputFormat::Text => lock.map_or_else(
                || format!("Plan {plan_id} is not locked.\n"),
                |lock| {
                    let expiry = if lock.is_expired() {
                        "expired".red().to_string()
                    } else {
                        format!("{}s remaining", lock.remaining_secs())
                    };
                    format!(
                        "Plan {plan_id} is locked for {} by {} since {} ({expiry})\n",
                        lock.operation,
                        lock.holder,
                        lock.acquired_at.format("%Y-%m-%d %H:%M:%S")
                    )
                },
            ),
        }
    }

    fn format_action(action: Action) -> String {
        match action {
            Action::Create => "+create".green().to_string(),
            Action::Skip => "skip".dimmed().to_string(),
        }
    }

    fn format_step_status(status: StepStatus) -> String {
        let text = status.to_string();
        match status {
            StepStatus::Created => text.green().to_string(),
            StepStatus::Planned => text.yellow().to_string(),
            StepStatus::Failed => text.red().to_string(),
            StepStatus::Exists | StepStatus::Skipped => text.dimmed().to_string(),
        }
    }

    fn format_execution_status(status: ExecutionStatus) -> String {
        let text = status.to_string();
        match status {
            ExecutionStatus::Success => text.green().to_string(),
            ExecutionStatus::PartialSuccess | ExecutionStatus::InProgress => text.yellow().to_string(),
            ExecutionStatus::Failed => text.red().to_string(),
        }
    }

    fn format_rollback_step_status(status: RollbackStepStatus) -> String {
        let text = status.to_string();
        match status {
            RollbackStepStatus::RolledBack => text.green().to_string(),
            RollbackStepStatus::Planned => text.yellow().to_string(),
            RollbackStepStatus::Failed => text.red().to_string(),
        }
    }

    fn format_rollback_status(status: RollbackStatus) -> String {
        let text = status.to_string();
        match status {
            RollbackStatus::Success => text.green().to_string(),
            RollbackStatus::InProgress => text.yellow().to_string(),
            RollbackStatus::Failed => text.red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{head}...")
        }
    }
}
