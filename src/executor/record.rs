//! Durable execution and rollback records.
//!
//! Records are replaced wholesale on every checkpoint; a reader always sees
//! a complete, parseable snapshot of progress.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::planner::{Action, ObjectType, Plan, PlanHasher, PlanObject};
use crate::remote::render_call;

/// Outcome of one execution step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    /// The object was already present.
    Exists,
    /// The object would be created, or its type has no implementation.
    Planned,
    /// The object was created.
    Created,
    /// The object was not attempted.
    Skipped,
    /// The attempt failed.
    Failed,
}

/// Overall status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// Steps are still being processed.
    InProgress,
    /// No step failed.
    Success,
    /// Some steps failed and some objects were created.
    PartialSuccess,
    /// Some steps failed and nothing was created.
    Failed,
}

/// Outcome of one rollback step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackStepStatus {
    /// Dry run; the inverse call was not made.
    Planned,
    /// The object was removed.
    RolledBack,
    /// The inverse call failed.
    Failed,
}

/// Overall status of a rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollbackStatus {
    /// Steps are still being processed.
    InProgress,
    /// No step failed.
    Success,
    /// At least one step failed.
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exists => f.write_str("EXISTS"),
            Self::Planned => f.write_str("PLANNED"),
            Self::Created => f.write_str("CREATED"),
            Self::Skipped => f.write_str("SKIPPED"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => f.write_str("IN_PROGRESS"),
            Self::Success => f.write_str("SUCCESS"),
            Self::PartialSuccess => f.write_str("PARTIAL_SUCCESS"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

impl fmt::Display for RollbackStepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planned => f.write_str("PLANNED"),
            Self::RolledBack => f.write_str("ROLLED_BACK"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => f.write_str("IN_PROGRESS"),
            Self::Success => f.write_str("SUCCESS"),
            Self::Failed => f.write_str("FAILED"),
        }
    }
}

/// The inverse call that undoes a created object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackDescriptor {
    /// Remote operation name.
    pub operation: String,
    /// Named arguments.
    pub args: BTreeMap<String, String>,
}

impl RollbackDescriptor {
    /// Builds the descriptor that removes `object`.
    #[must_use]
    pub fn for_object(object: &PlanObject) -> Self {
        let mut args = BTreeMap::new();
        args.insert(String::from("name"), object.name.clone());
        Self {
            operation: object.object_type.inverse_operation().to_string(),
            args,
        }
    }

    /// The `name` argument, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.args.get("name").map(String::as_str)
    }
}

impl fmt::Display for RollbackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render_call(&self.operation, &self.args))
    }
}

/// The step an engine is working on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentStep {
    /// Site of the object.
    pub site_code: String,
    /// Object type.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Object name.
    pub name: String,
    /// 1-based position among counted steps.
    pub order: usize,
}

/// Result of one execution step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    /// Site of the object.
    pub site_code: String,
    /// Object type.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Object name.
    pub name: String,
    /// Planned action.
    pub action: Action,
    /// Step outcome.
    pub status: StepStatus,
    /// Detail message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Inverse call, present only when the object was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackDescriptor>,
    /// When the step finished.
    pub timestamp: DateTime<Utc>,
}

impl StepResult {
    /// Creates a result for an object.
    #[must_use]
    pub fn new(site_code: &str, object: &PlanObject, status: StepStatus, message: Option<String>) -> Self {
        let rollback = (status == StepStatus::Created).then(|| RollbackDescriptor::for_object(object));
        Self {
            site_code: site_code.to_string(),
            object_type: object.object_type,
            name: object.name.clone(),
            action: object.action,
            status,
            message,
            rollback,
            timestamp: Utc::now(),
        }
    }
}

/// Durable progress of one plan execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The executed plan.
    pub plan_id: String,
    /// Target environment name.
    pub env_name: String,
    /// Whether objects were actually created.
    pub apply: bool,
    /// Fingerprint of the executed plan.
    pub plan_hash: String,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Overall status.
    pub status: ExecutionStatus,
    /// Steps that will be attempted.
    pub total_steps: usize,
    /// Steps processed so far.
    pub completed_steps: usize,
    /// Step in flight.
    pub current_step: Option<CurrentStep>,
    /// Every processed object, in plan order.
    pub results: Vec<StepResult>,
}

impl ExecutionRecord {
    /// Starts a record for a plan.
    #[must_use]
    pub fn start(plan: &Plan, apply: bool, plan_hash: String, total_steps: usize) -> Self {
        Self {
            plan_id: plan.plan_id.clone(),
            env_name: plan.env_name.clone(),
            apply,
            plan_hash,
            started_at: Utc::now(),
            finished_at: None,
            status: ExecutionStatus::InProgress,
            total_steps,
            completed_steps: 0,
            current_step: None,
            results: Vec::new(),
        }
    }

    /// Number of results with a status.
    #[must_use]
    pub fn count(&self, status: StepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Created steps that can be rolled back, in execution order.
    pub fn rollback_candidates(&self) -> impl DoubleEndedIterator<Item = &StepResult> {
        self.results
            .iter()
            .filter(|r| r.status == StepStatus::Created && r.rollback.is_some())
    }

    /// Computes the terminal status from the results.
    #[must_use]
    pub fn terminal_status(&self) -> ExecutionStatus {
        let failed = self.results.iter().any(|r| r.status == StepStatus::Failed);
        let created = self.results.iter().any(|r| r.status == StepStatus::Created);
        match (failed, created) {
            (false, _) => ExecutionStatus::Success,
            (true, true) => ExecutionStatus::PartialSuccess,
            (true, false) => ExecutionStatus::Failed,
        }
    }

    /// Marks the record finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.current_step = None;
        self.status = self.terminal_status();
    }

    /// Returns true once the execution has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.status != ExecutionStatus::InProgress
    }

    /// Returns true if the record created objects on the remote system.
    #[must_use]
    pub fn has_created(&self) -> bool {
        self.apply && self.rollback_candidates().next().is_some()
    }

    /// Returns true if a rollback has undone everything this record created.
    #[must_use]
    pub fn is_rolled_back_by(&self, rollback: &RollbackRecord) -> bool {
        rollback.apply
            && rollback.status == RollbackStatus::Success
            && rollback.started_at >= self.started_at
    }

    /// Returns true if `plan` is the plan this record executed.
    #[must_use]
    pub fn matches_plan(&self, plan: &Plan) -> bool {
        PlanHasher::hashes_match(&self.plan_hash, &PlanHasher::new().hash_plan(plan))
    }
}

/// One line of the execution listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// The executed plan.
    pub plan_id: String,
    /// Target environment name.
    pub env_name: String,
    /// Whether objects were actually created.
    pub apply: bool,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// Overall status.
    pub status: ExecutionStatus,
    /// Steps processed so far.
    pub completed_steps: usize,
    /// Steps that will be attempted.
    pub total_steps: usize,
}

impl From<&ExecutionRecord> for ExecutionSummary {
    fn from(record: &ExecutionRecord) -> Self {
        Self {
            plan_id: record.plan_id.clone(),
            env_name: record.env_name.clone(),
            apply: record.apply,
            started_at: record.started_at,
            status: record.status,
            completed_steps: record.completed_steps,
            total_steps: record.total_steps,
        }
    }
}

/// Result of one rollback step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackStepResult {
    /// Site of the object.
    pub site_code: String,
    /// Object type.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Object name.
    pub name: String,
    /// Step outcome.
    pub status: RollbackStepStatus,
    /// Detail message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The inverse call.
    pub rollback: RollbackDescriptor,
    /// When the step finished.
    pub timestamp: DateTime<Utc>,
}

/// Durable progress of one rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackRecord {
    /// The plan being rolled back.
    pub plan_id: String,
    /// Target environment name.
    pub env_name: String,
    /// Whether inverse calls were actually made.
    pub apply: bool,
    /// When the rollback started.
    pub started_at: DateTime<Utc>,
    /// When the rollback finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Overall status.
    pub status: RollbackStatus,
    /// Steps that will be attempted.
    pub total_steps: usize,
    /// Steps processed so far.
    pub completed_steps: usize,
    /// Step in flight.
    pub current_step: Option<CurrentStep>,
    /// Processed steps, in rollback order.
    pub results: Vec<RollbackStepResult>,
}

impl RollbackRecord {
    /// Starts a rollback record for an execution.
    #[must_use]
    pub fn start(execution: &ExecutionRecord, apply: bool, total_steps: usize) -> Self {
        Self {
            plan_id: execution.plan_id.clone(),
            env_name: execution.env_name.clone(),
            apply,
            started_at: Utc::now(),
            finished_at: None,
            status: RollbackStatus::InProgress,
            total_steps,
            completed_steps: 0,
            current_step: None,
            results: Vec::new(),
        }
    }

    /// Number of results with a status.
    #[must_use]
    pub fn count(&self, status: RollbackStepStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Marks the record finished.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
        self.current_step = None;
        self.status = if self.count(RollbackStepStatus::Failed) > 0 {
            RollbackStatus::Failed
        } else {
            RollbackStatus::Success
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::ObjectInputs;

    fn record_with(statuses: &[StepStatus]) -> ExecutionRecord {
        let object = PlanObject::new("PT_ELM", "", Action::Create, ObjectInputs::Partition);
        ExecutionRecord {
            plan_id: String::from("p"),
            env_name: String::from("dev"),
            apply: true,
            plan_hash: String::new(),
            started_at: Utc::now(),
            finished_at: None,
            status: ExecutionStatus::InProgress,
            total_steps: statuses.len(),
            completed_steps: statuses.len(),
            current_step: None,
            results: statuses
                .iter()
                .map(|s| StepResult::new("ELM", &object, *s, None))
                .collect(),
        }
    }

    #[test]
    fn test_terminal_status_table() {
        use StepStatus::{Created, Exists, Failed, Planned, Skipped};

        assert_eq!(record_with(&[]).terminal_status(), ExecutionStatus::Success);
        assert_eq!(
            record_with(&[Created, Exists, Planned, Skipped]).terminal_status(),
            ExecutionStatus::Success
        );
        assert_eq!(
            record_with(&[Created, Failed]).terminal_status(),
            ExecutionStatus::PartialSuccess
        );
        assert_eq!(
            record_with(&[Exists, Planned, Failed]).terminal_status(),
            ExecutionStatus::Failed
        );
    }

    #[test]
    fn test_rollback_descriptor_only_when_created() {
        let record = record_with(&[StepStatus::Created, StepStatus::Exists]);
        assert_eq!(
            record.results[0].rollback.as_ref().map(ToString::to_string),
            Some(String::from("removeRoutePartition(name=PT_ELM)"))
        );
        assert!(record.results[1].rollback.is_none());
        assert_eq!(record.rollback_candidates().count(), 1);
    }

    #[test]
    fn test_rolled_back_only_by_later_applied_success() {
        let record = record_with(&[StepStatus::Created]);
        assert!(record.has_created());

        let mut rollback = RollbackRecord::start(&record, true, 1);
        rollback.finish();
        assert!(record.is_rolled_back_by(&rollback));

        let mut dry = RollbackRecord::start(&record, false, 1);
        dry.finish();
        assert!(!record.is_rolled_back_by(&dry));

        let mut older = rollback.clone();
        older.started_at = record.started_at - chrono::Duration::seconds(60);
        assert!(!record.is_rolled_back_by(&older));

        let mut rehearsal = record_with(&[StepStatus::Created]);
        rehearsal.apply = false;
        assert!(!rehearsal.has_created());
    }

    #[test]
    fn test_matches_plan_by_hash() {
        use crate::planner::PlanSummary;

        let plan = Plan {
            plan_id: String::from("p"),
            env_name: String::from("dev"),
            org: String::from("ACME"),
            created_at: Utc::now(),
            site_count: 0,
            sites: Vec::new(),
            summary: PlanSummary::new(),
        };
        let mut record = ExecutionRecord::start(&plan, true, PlanHasher::new().hash_plan(&plan), 0);
        assert!(record.matches_plan(&plan));

        record.plan_hash = String::from("0000");
        assert!(!record.matches_plan(&plan));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&ExecutionStatus::PartialSuccess).unwrap();
        assert_eq!(json, "\"PARTIAL_SUCCESS\"");
        let json = serde_json::to_string(&RollbackStepStatus::RolledBack).unwrap();
        assert_eq!(json, "\"ROLLED_BACK\"");
        assert_eq!(StepStatus::Created.to_string(), "CREATED");
    }
}
