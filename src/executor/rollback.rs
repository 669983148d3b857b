//! Rollback engine.
//!
//! Reverses what an execution created, reading only the persisted
//! execution record. Created steps are undone in exact reverse order; every
//! other step is left alone.

use tracing::{error, info, warn};

use crate::error::{Result, SiteplanError};
use crate::planner::ObjectType;
use crate::remote::{RemoteClient, RemoteResult};
use crate::state::{LockOperation, SnapshotStore, generate_holder_id};

use super::record::{
    CurrentStep, RollbackDescriptor, RollbackRecord, RollbackStepResult, RollbackStepStatus, StepResult,
};

/// Rolls back executed plans.
pub struct RollbackEngine<'a> {
    store: &'a dyn SnapshotStore,
    holder: String,
}

impl std::fmt::Debug for RollbackEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollbackEngine")
            .field("store", &self.store.backend_type())
            .field("holder", &self.holder)
            .finish()
    }
}

impl<'a> RollbackEngine<'a> {
    /// Creates a rollback engine.
    #[must_use]
    pub fn new(store: &'a dyn SnapshotStore) -> Self {
        Self {
            store,
            holder: generate_holder_id(),
        }
    }

    /// Rolls back the execution of a plan.
    ///
    /// With `apply` unset, inverse calls are only described.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionNotFound` if the plan was never executed, in which
    /// case no rollback record is written. Also fails if the plan is locked,
    /// the lock is lost mid-run, or a snapshot cannot be written.
    pub async fn rollback(&self, plan_id: &str, remote: &dyn RemoteClient, apply: bool) -> Result<RollbackRecord> {
        let execution = self
            .store
            .load_execution(plan_id)
            .await?
            .ok_or_else(|| SiteplanError::ExecutionNotFound {
                plan_id: plan_id.to_string(),
            })?;

        if !execution.is_finished() {
            warn!("Execution of plan {plan_id} did not finish; rolling back what it recorded");
        }

        let lock = self
            .store
            .acquire_lock(plan_id, &self.holder, LockOperation::Rollback)
            .await?;

        let steps: Vec<(&StepResult, &RollbackDescriptor)> = execution
            .rollback_candidates()
            .rev()
            .filter_map(|step| step.rollback.as_ref().map(|rb| (step, rb)))
            .collect();

        let mut record = RollbackRecord::start(&execution, apply, steps.len());
        let result = self.run(&mut record, &steps, remote, &lock.lock_id).await;

        if let Err(e) = self.store.release_lock(plan_id, &lock.lock_id).await {
            warn!("Failed to release lock on plan {plan_id}: {e}");
        }

        result.map(|()| record)
    }

    async fn run(
        &self,
        record: &mut RollbackRecord,
        steps: &[(&StepResult, &RollbackDescriptor)],
        remote: &dyn RemoteClient,
        lock_id: &str,
    ) -> Result<()> {
        info!(
            "Rolling back plan {} against {} ({} steps, apply: {})",
            record.plan_id,
            remote.name(),
            steps.len(),
            record.apply
        );
        self.store.save_rollback(record).await?;

        for (index, (step, descriptor)) in steps.iter().enumerate() {
            let order = index + 1;
            record.current_step = Some(CurrentStep {
                site_code: step.site_code.clone(),
                object_type: step.object_type,
                name: step.name.clone(),
                order,
            });
            self.store.renew_lock(&record.plan_id, lock_id).await?;

            let (status, message) = if record.apply {
                match Self::invoke_inverse(step.object_type, descriptor, remote).await {
                    Ok(()) => {
                        info!("{}: {} '{}' rolled back", step.site_code, step.object_type, step.name);
                        (RollbackStepStatus::RolledBack, format!("{} succeeded", descriptor.operation))
                    }
                    Err(e) => {
                        error!("{}: rollback of {} '{}' failed: {e}", step.site_code, step.object_type, step.name);
                        (RollbackStepStatus::Failed, e.to_string())
                    }
                }
            } else {
                (RollbackStepStatus::Planned, format!("Would call {descriptor}"))
            };

            record.results.push(RollbackStepResult {
                site_code: step.site_code.clone(),
                object_type: step.object_type,
                name: step.name.clone(),
                status,
                message: Some(message),
                rollback: (*descriptor).clone(),
                timestamp: chrono::Utc::now(),
            });
            record.completed_steps = order;
            self.store.save_rollback(record).await?;
        }

        record.finish();
        self.store.save_rollback(record).await?;

        info!(
            "Rollback of plan {} finished: {} ({} rolled back, {} failed)",
            record.plan_id,
            record.status,
            record.count(RollbackStepStatus::RolledBack),
            record.count(RollbackStepStatus::Failed)
        );
        Ok(())
    }

    /// Calls the bound inverse capability, or the generic named operation.
    async fn invoke_inverse(
        object_type: ObjectType,
        descriptor: &RollbackDescriptor,
        remote: &dyn RemoteClient,
    ) -> RemoteResult<()> {
        let bound = ObjectType::from_inverse_operation(&descriptor.operation) == Some(object_type);
        match (bound, remote.capability(object_type), descriptor.name()) {
            (true, Some(api), Some(name)) => api.remove(name).await,
            _ => remote.invoke(&descriptor.operation, &descriptor.args).await,
        }
    }
}
