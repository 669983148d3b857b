//! Plan execution engine.
//!
//! Applies a plan against a remote client one object at a time, in plan
//! order, checkpointing the execution record after every executed step.
//! A failing step never stops the batch.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, error, info, warn};

use crate::error::{Result, SiteplanError};
use crate::planner::{Action, ObjectType, Plan, PlanHasher, PlanObject};
use crate::remote::RemoteClient;
use crate::state::{LockOperation, SnapshotStore, generate_holder_id};

use super::handlers::{HandlerOutcome, HandlerRegistry};
use super::record::{CurrentStep, ExecutionRecord, StepResult, StepStatus};

/// Message recorded for objects outside the executable set.
pub const NOT_EXECUTABLE: &str = "Not executable";

/// Message recorded when no handler is bound to the type.
pub const NO_HANDLER: &str = "No handler registered";

/// Message recorded for objects skipped after a dependency failed.
pub const DEPENDENCY_FAILED: &str = "Skipped due to dependency failure";

/// What to do with an object whose dependency failed earlier in its site.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyPolicy {
    /// Attempt it anyway.
    #[default]
    Continue,
    /// Record it as skipped.
    Skip,
}

/// Executes plans and checkpoints their progress.
pub struct ExecutionEngine<'a> {
    store: &'a dyn SnapshotStore,
    registry: &'a HandlerRegistry,
    executable: BTreeSet<ObjectType>,
    dependency_policy: DependencyPolicy,
    holder: String,
}

impl std::fmt::Debug for ExecutionEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("store", &self.store.backend_type())
            .field("registry", self.registry)
            .field("executable", &self.executable)
            .field("dependency_policy", &self.dependency_policy)
            .field("holder", &self.holder)
            .finish()
    }
}

impl<'a> ExecutionEngine<'a> {
    /// Creates an engine that executes every object type.
    #[must_use]
    pub fn new(store: &'a dyn SnapshotStore, registry: &'a HandlerRegistry) -> Self {
        Self {
            store,
            registry,
            executable: ObjectType::ALL.into_iter().collect(),
            dependency_policy: DependencyPolicy::default(),
            holder: generate_holder_id(),
        }
    }

    /// Restricts execution to a set of types.
    #[must_use]
    pub fn with_executable_types(mut self, types: impl IntoIterator<Item = ObjectType>) -> Self {
        self.executable = types.into_iter().collect();
        self
    }

    /// Sets the dependency failure policy.
    #[must_use]
    pub const fn with_dependency_policy(mut self, policy: DependencyPolicy) -> Self {
        self.dependency_policy = policy;
        self
    }

    /// Returns true if the object will be attempted.
    fn is_counted(&self, object: &PlanObject) -> bool {
        object.action == Action::Create && self.executable.contains(&object.object_type)
    }

    /// Executes a plan.
    ///
    /// With `apply` unset, nothing is created on the remote system.
    ///
    /// # Errors
    ///
    /// Returns an error if the plan is locked by another run, the lock is
    /// lost mid-run, or a snapshot cannot be written. Returns
    /// `RollbackPending` if an earlier applied execution created objects
    /// that were never rolled back. Remote failures are recorded per step
    /// instead.
    pub async fn execute(&self, plan: &Plan, remote: &dyn RemoteClient, apply: bool) -> Result<ExecutionRecord> {
        let lock = self
            .store
            .acquire_lock(&plan.plan_id, &self.holder, LockOperation::Execute)
            .await?;

        let result = match self.ensure_replaceable(plan).await {
            Ok(()) => self.run(plan, remote, apply, &lock.lock_id).await,
            Err(e) => Err(e),
        };

        if let Err(e) = self.store.release_lock(&plan.plan_id, &lock.lock_id).await {
            warn!("Failed to release lock on plan {}: {e}", plan.plan_id);
        }

        result
    }

    /// Refuses to replace an applied record until its created objects have
    /// been rolled back.
    async fn ensure_replaceable(&self, plan: &Plan) -> Result<()> {
        let Some(previous) = self.store.load_execution(&plan.plan_id).await? else {
            return Ok(());
        };

        if !previous.matches_plan(plan) {
            warn!("Plan {} changed since it was last executed", plan.plan_id);
        }

        if !previous.has_created() {
            return Ok(());
        }

        let rolled_back = self
            .store
            .load_rollback(&plan.plan_id)
            .await?
            .is_some_and(|rollback| previous.is_rolled_back_by(&rollback));
        if rolled_back {
            debug!("Previous execution of plan {} was rolled back", plan.plan_id);
            return Ok(());
        }

        Err(SiteplanError::RollbackPending {
            plan_id: plan.plan_id.clone(),
            created: previous.rollback_candidates().count(),
        })
    }

    async fn run(
        &self,
        plan: &Plan,
        remote: &dyn RemoteClient,
        apply: bool,
        lock_id: &str,
    ) -> Result<ExecutionRecord> {
        let total_steps = plan
            .sites
            .iter()
            .flat_map(|s| &s.objects)
            .filter(|o| self.is_counted(o))
            .count();
        let plan_hash = PlanHasher::new().hash_plan(plan);

        info!(
            "Executing plan {} against {} ({} steps, apply: {apply})",
            plan.plan_id,
            remote.name(),
            total_steps
        );

        let mut record = ExecutionRecord::start(plan, apply, plan_hash, total_steps);
        self.store.save_execution(&record).await?;

        for site in &plan.sites {
            let mut failed_types: HashSet<ObjectType> = HashSet::new();

            for object in &site.objects {
                if !self.is_counted(object) {
                    debug!("{}: {} '{}' not executed", site.site_code, object.object_type, object.name);
                    record.results.push(StepResult::new(
                        &site.site_code,
                        object,
                        StepStatus::Skipped,
                        Some(String::from(NOT_EXECUTABLE)),
                    ));
                    continue;
                }

                record.current_step = Some(CurrentStep {
                    site_code: site.site_code.clone(),
                    object_type: object.object_type,
                    name: object.name.clone(),
                    order: record.completed_steps + 1,
                });
                self.store.renew_lock(&plan.plan_id, lock_id).await?;
                self.store.save_execution(&record).await?;

                let blocked = self.dependency_policy == DependencyPolicy::Skip
                    && object.depends_on.iter().any(|d| failed_types.contains(d));

                let result = if blocked {
                    warn!(
                        "{}: skipping {} '{}' after a dependency failed",
                        site.site_code, object.object_type, object.name
                    );
                    StepResult::new(
                        &site.site_code,
                        object,
                        StepStatus::Skipped,
                        Some(String::from(DEPENDENCY_FAILED)),
                    )
                } else {
                    self.execute_step(&site.site_code, object, remote, apply).await
                };

                if matches!(result.status, StepStatus::Failed | StepStatus::Skipped) {
                    failed_types.insert(object.object_type);
                }

                record.results.push(result);
                record.completed_steps += 1;
                self.store.save_execution(&record).await?;
            }
        }

        record.finish();
        self.store.save_execution(&record).await?;

        info!(
            "Plan {} finished: {} ({} created, {} exists, {} planned, {} failed)",
            record.plan_id,
            record.status,
            record.count(StepStatus::Created),
            record.count(StepStatus::Exists),
            record.count(StepStatus::Planned),
            record.count(StepStatus::Failed)
        );

        Ok(record)
    }

    /// Executes a single object.
    async fn execute_step(
        &self,
        site_code: &str,
        object: &PlanObject,
        remote: &dyn RemoteClient,
        apply: bool,
    ) -> StepResult {
        let Some(handler) = self.registry.get(object.object_type) else {
            debug!("{site_code}: no handler for {}", object.object_type);
            return StepResult::new(site_code, object, StepStatus::Planned, Some(String::from(NO_HANDLER)));
        };

        match handler.handle(object, remote, apply).await {
            Ok(HandlerOutcome::Exists) => {
                info!("{site_code}: {} '{}' exists", object.object_type, object.name);
                StepResult::new(site_code, object, StepStatus::Exists, None)
            }
            Ok(HandlerOutcome::Planned(message)) => {
                info!("{site_code}: {} '{}' planned: {message}", object.object_type, object.name);
                StepResult::new(site_code, object, StepStatus::Planned, Some(message))
            }
            Ok(HandlerOutcome::Created(message)) => {
                info!("{site_code}: {} '{}' created", object.object_type, object.name);
                StepResult::new(site_code, object, StepStatus::Created, Some(message))
            }
            Err(e) => {
                error!("{site_code}: failed to execute {} '{}': {e}", object.object_type, object.name);
                StepResult::new(site_code, object, StepStatus::Failed, Some(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SiteRow;
    use crate::executor::ExecutionStatus;
    use crate::naming::NamingProfile;
    use crate::planner::PlanBuilder;
    use crate::remote::testing::ScriptedRemote;
    use crate::state::LocalSnapshotStore;
    use tempfile::TempDir;

    fn profile() -> NamingProfile {
        ObjectType::ALL.into_iter().fold(NamingProfile::default(), |p, t| {
            p.with_template(t, format!("{}_{{site_code}}", t.as_str().to_uppercase()), "")
        })
    }

    fn row(code: &str) -> SiteRow {
        SiteRow {
            site_code: code.to_string(),
            site_detail: format!("{code} office"),
            state: String::from("IL"),
            city: String::from("Elmhurst"),
            srst_ip: Some(String::from("10.0.0.1")),
            css_members: Some(String::from("SITE_PARTITION")),
            mrg_members: Some(String::from("ANN_1")),
            mrgl_members: Some(String::from("SITE_MRG")),
            mobility_subnet: Some(String::from("10.0.0.0")),
            mobility_mask: Some(String::from("24")),
            ..SiteRow::default()
        }
    }

    fn plan(codes: &[&str]) -> Plan {
        let rows: Vec<SiteRow> = codes.iter().map(|c| row(c)).collect();
        PlanBuilder::new(&profile(), "ACME", "dev").build(&rows).plan
    }

    fn store() -> (LocalSnapshotStore, TempDir) {
        let temp = TempDir::new().unwrap();
        (LocalSnapshotStore::with_base_dir(temp.path()), temp)
    }

    #[tokio::test]
    async fn test_apply_creates_everything() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new();
        let plan = plan(&["ELM"]);

        let record = ExecutionEngine::new(&store, &registry)
            .execute(&plan, &remote, true)
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(record.total_steps, 10);
        assert_eq!(record.completed_steps, record.total_steps);
        assert_eq!(record.count(StepStatus::Created), 10);
        assert!(record.current_step.is_none());
        assert!(record.finished_at.is_some());
        assert!(record.results.iter().all(|r| r.rollback.is_some()));

        let created: Vec<String> = remote.calls_of("create");
        assert_eq!(created.first().map(String::as_str), Some("create:region:REGION_ELM"));
        assert_eq!(created.last().map(String::as_str), Some("create:device_mobility:DEVICE_MOBILITY_ELM"));

        let persisted = store.load_execution(&plan.plan_id).await.unwrap().unwrap();
        assert_eq!(persisted, record);
        assert!(store.get_lock_info(&plan.plan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_dry_run_never_creates() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new().with_existing(ObjectType::Region, "REGION_ELM");
        let plan = plan(&["ELM"]);

        let record = ExecutionEngine::new(&store, &registry)
            .execute(&plan, &remote, false)
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(record.count(StepStatus::Created), 0);
        assert_eq!(record.count(StepStatus::Exists), 1);
        assert_eq!(record.count(StepStatus::Planned), 9);
        assert!(remote.calls_of("create").is_empty());
        assert!(record.results.iter().all(|r| r.rollback.is_none()));
    }

    #[tokio::test]
    async fn test_failure_continues_and_yields_partial_success() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new().failing_create("LOCATION_ELM");
        let plan = plan(&["ELM"]);

        let record = ExecutionEngine::new(&store, &registry)
            .execute(&plan, &remote, true)
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::PartialSuccess);
        assert_eq!(record.count(StepStatus::Failed), 1);
        assert_eq!(record.count(StepStatus::Created), 9);
        assert_eq!(record.completed_steps, 10);

        let failed = record.results.iter().find(|r| r.status == StepStatus::Failed).unwrap();
        assert!(failed.message.as_deref().unwrap().contains("refused"));
        assert!(failed.rollback.is_none());
    }

    #[tokio::test]
    async fn test_all_failures_yield_failed() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new().failing_exists("REGION_ELM");
        let plan = plan(&["ELM"]);

        let record = ExecutionEngine::new(&store, &registry)
            .with_executable_types([ObjectType::Region])
            .execute(&plan, &remote, true)
            .await
            .unwrap();

        assert_eq!(record.status, ExecutionStatus::Failed);
        assert_eq!(record.total_steps, 1);
        assert_eq!(record.count(StepStatus::Skipped), 9);
        assert!(record
            .results
            .iter()
            .filter(|r| r.status == StepStatus::Skipped)
            .all(|r| r.message.as_deref() == Some(NOT_EXECUTABLE)));
    }

    #[tokio::test]
    async fn test_skip_actions_not_counted() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new();
        let mut plan = plan(&["ELM"]);
        plan.sites[0].objects[0].action = Action::Skip;

        let record = ExecutionEngine::new(&store, &registry)
            .execute(&plan, &remote, true)
            .await
            .unwrap();

        assert_eq!(record.total_steps, 9);
        assert_eq!(record.completed_steps, 9);
        assert_eq!(record.results[0].status, StepStatus::Skipped);
    }

    #[tokio::test]
    async fn test_missing_handler_and_capability_are_planned() {
        let (store, _temp) = store();
        let mut registry = HandlerRegistry::with_defaults();
        registry.unregister(ObjectType::Mrg);
        let remote = ScriptedRemote::supporting(ObjectType::ALL.into_iter().filter(|t| *t != ObjectType::Srst));
        let plan = plan(&["ELM"]);

        let record = ExecutionEngine::new(&store, &registry)
            .execute(&plan, &remote, true)
            .await
            .unwrap();

        let by_type = |t: ObjectType| record.results.iter().find(|r| r.object_type == t).unwrap();
        assert_eq!(by_type(ObjectType::Mrg).status, StepStatus::Planned);
        assert_eq!(by_type(ObjectType::Mrg).message.as_deref(), Some(NO_HANDLER));
        assert_eq!(by_type(ObjectType::Srst).status, StepStatus::Planned);
        assert_eq!(
            by_type(ObjectType::Srst).message.as_deref(),
            Some("SRST handler not implemented yet")
        );
        assert_eq!(record.status, ExecutionStatus::Success);
        assert_eq!(record.completed_steps, record.total_steps);
    }

    #[tokio::test]
    async fn test_dependency_skip_policy() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new().failing_create("REGION_ELM");
        let plan = plan(&["ELM", "OAK"]);

        let record = ExecutionEngine::new(&store, &registry)
            .with_dependency_policy(DependencyPolicy::Skip)
            .execute(&plan, &remote, true)
            .await
            .unwrap();

        let elm: Vec<&StepResult> = record.results.iter().filter(|r| r.site_code == "ELM").collect();
        let status_of = |t: ObjectType| elm.iter().find(|r| r.object_type == t).unwrap().status;
        assert_eq!(status_of(ObjectType::Region), StepStatus::Failed);
        assert_eq!(status_of(ObjectType::Location), StepStatus::Skipped);
        assert_eq!(status_of(ObjectType::DevicePool), StepStatus::Skipped);
        assert_eq!(status_of(ObjectType::DeviceMobility), StepStatus::Skipped);
        assert_eq!(status_of(ObjectType::Partition), StepStatus::Created);

        // Other sites are unaffected.
        assert!(record
            .results
            .iter()
            .filter(|r| r.site_code == "OAK")
            .all(|r| r.status == StepStatus::Created));
        assert_eq!(record.status, ExecutionStatus::PartialSuccess);
    }

    #[tokio::test]
    async fn test_applied_record_kept_until_rolled_back() {
        use crate::executor::RollbackEngine;
        use crate::error::SiteplanError;

        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new();
        let plan = plan(&["ELM"]);
        let engine = ExecutionEngine::new(&store, &registry);

        let applied = engine.execute(&plan, &remote, true).await.unwrap();
        assert_eq!(applied.count(StepStatus::Created), 10);

        for apply in [false, true] {
            let err = engine.execute(&plan, &remote, apply).await.unwrap_err();
            assert!(matches!(err, SiteplanError::RollbackPending { created: 10, .. }));
        }
        assert_eq!(store.load_execution(&plan.plan_id).await.unwrap().unwrap(), applied);
        assert!(store.get_lock_info(&plan.plan_id).await.unwrap().is_none());

        // A rehearsal rollback leaves the objects in place.
        RollbackEngine::new(&store).rollback(&plan.plan_id, &remote, false).await.unwrap();
        assert!(engine.execute(&plan, &remote, false).await.is_err());

        let rollback = RollbackEngine::new(&store).rollback(&plan.plan_id, &remote, true).await.unwrap();
        assert_eq!(rollback.completed_steps, 10);
        assert!(!remote.contains(ObjectType::Region, "REGION_ELM"));

        let rehearsal = engine.execute(&plan, &remote, false).await.unwrap();
        assert_eq!(rehearsal.count(StepStatus::Planned), 10);
    }

    #[tokio::test]
    async fn test_rehearsals_replace_each_other() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new();
        let plan = plan(&["ELM"]);
        let engine = ExecutionEngine::new(&store, &registry);

        engine.execute(&plan, &remote, false).await.unwrap();
        let applied = engine.execute(&plan, &remote, true).await.unwrap();
        assert_eq!(applied.status, ExecutionStatus::Success);
        assert!(applied.apply);
    }

    /// Hands the plan lock to another holder while a step runs.
    struct LockThief {
        store: LocalSnapshotStore,
    }

    #[async_trait::async_trait]
    impl crate::executor::ObjectHandler for LockThief {
        async fn handle(
            &self,
            object: &PlanObject,
            _remote: &dyn RemoteClient,
            _apply: bool,
        ) -> crate::remote::RemoteResult<HandlerOutcome> {
            let plan_id = self.store.list_plans().await.unwrap_or_default();
            let plan_id = plan_id.first().cloned().unwrap_or_default();
            self.store.force_unlock(&plan_id).await.unwrap();
            self.store
                .acquire_lock(&plan_id, "intruder", LockOperation::Rollback)
                .await
                .unwrap();
            Ok(HandlerOutcome::Created(format!("{} created", object.name)))
        }
    }

    #[tokio::test]
    async fn test_lost_lock_stops_execution() {
        use crate::error::{SiteplanError, StateError};

        let (store, _temp) = store();
        let plan = plan(&["ELM"]);
        store.save_plan(&plan).await.unwrap();

        let mut registry = HandlerRegistry::with_defaults();
        registry.register(
            ObjectType::Location,
            std::sync::Arc::new(LockThief { store: store.clone() }),
        );
        let remote = ScriptedRemote::new();

        let err = ExecutionEngine::new(&store, &registry)
            .execute(&plan, &remote, true)
            .await
            .unwrap_err();
        assert!(matches!(err, SiteplanError::State(StateError::LockLost { .. })));

        // Nothing after the stolen step ran, and the intruder keeps its lock.
        assert_eq!(remote.calls_of("create"), vec!["create:region:REGION_ELM"]);
        let lock = store.get_lock_info(&plan.plan_id).await.unwrap().unwrap();
        assert_eq!(lock.holder, "intruder");

        let record = store.load_execution(&plan.plan_id).await.unwrap().unwrap();
        assert_eq!(record.status, ExecutionStatus::InProgress);
        assert_eq!(record.completed_steps, 2);
    }

    #[tokio::test]
    async fn test_locked_plan_is_rejected() {
        let (store, _temp) = store();
        let registry = HandlerRegistry::with_defaults();
        let remote = ScriptedRemote::new();
        let plan = plan(&["ELM"]);

        store
            .acquire_lock(&plan.plan_id, "someone-else", LockOperation::Rollback)
            .await
            .unwrap();

        let err = ExecutionEngine::new(&store, &registry)
            .execute(&plan, &remote, true)
            .await
            .unwrap_err();
        assert!(err.is_lock_conflict());
        assert!(remote.calls().is_empty());
        assert!(store.load_execution(&plan.plan_id).await.unwrap().is_none());
    }
}
