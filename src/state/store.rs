//! Snapshot store trait definition.
//!
//! This module defines the common interface for durable plan, execution
//! and rollback snapshots, keyed by plan id.

use async_trait::async_trait;

use crate::error::Result;
use crate::executor::{ExecutionRecord, ExecutionSummary, RollbackRecord};
use crate::planner::Plan;

use super::lock::{LockInfo, LockOperation};

/// Trait for snapshot storage backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Saves a plan document.
    async fn save_plan(&self, plan: &Plan) -> Result<()>;

    /// Loads a plan document.
    ///
    /// Returns `None` if no plan was saved under this id.
    async fn load_plan(&self, plan_id: &str) -> Result<Option<Plan>>;

    /// Lists saved plan ids, newest first.
    async fn list_plans(&self) -> Result<Vec<String>>;

    /// Replaces the execution snapshot of a plan.
    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()>;

    /// Loads the execution snapshot of a plan.
    async fn load_execution(&self, plan_id: &str) -> Result<Option<ExecutionRecord>>;

    /// Summarizes every execution snapshot, most recently started first.
    async fn list_executions(&self) -> Result<Vec<ExecutionSummary>>;

    /// Replaces the rollback snapshot of a plan.
    async fn save_rollback(&self, record: &RollbackRecord) -> Result<()>;

    /// Loads the rollback snapshot of a plan.
    async fn load_rollback(&self, plan_id: &str) -> Result<Option<RollbackRecord>>;

    /// Acquires the plan lock.
    ///
    /// Fails with a lock conflict if another unexpired lock is held.
    async fn acquire_lock(&self, plan_id: &str, holder: &str, operation: LockOperation) -> Result<LockInfo>;

    /// Pushes back the expiry of a held lock.
    ///
    /// Fails with `LockLost` if `lock_id` no longer owns the plan lock.
    async fn renew_lock(&self, plan_id: &str, lock_id: &str) -> Result<LockInfo>;

    /// Releases the plan lock if `lock_id` still owns it.
    async fn release_lock(&self, plan_id: &str, lock_id: &str) -> Result<()>;

    /// Gets current lock information if locked.
    async fn get_lock_info(&self, plan_id: &str) -> Result<Option<LockInfo>>;

    /// Removes the plan lock regardless of holder.
    ///
    /// Returns true if a lock was removed.
    async fn force_unlock(&self, plan_id: &str) -> Result<bool>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;
}
