//! Local file-based snapshot storage backend.
//!
//! Every plan owns a handful of files in one directory:
//! `<plan_id>.plan.json`, `<plan_id>.execution.json`,
//! `<plan_id>.rollback.json` and, while an engine runs, `<plan_id>.lock`.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Result, SiteplanError, StateError};
use crate::executor::{ExecutionRecord, ExecutionSummary, RollbackRecord};
use crate::planner::Plan;

use super::lock::{LOCK_EXPIRY_SECS, LockInfo, LockOperation, generate_holder_id};
use super::store::SnapshotStore;

/// Default snapshot directory name.
pub const STATE_DIR: &str = ".siteplan";

const PLAN_SUFFIX: &str = "plan.json";
const EXECUTION_SUFFIX: &str = "execution.json";
const ROLLBACK_SUFFIX: &str = "rollback.json";
const LOCK_SUFFIX: &str = "lock";

/// Create attempts before giving up on a contended lock.
const LOCK_ATTEMPTS: usize = 3;

/// Writes a file atomically: temp file, sync, then rename over the target.
///
/// # Errors
///
/// Returns an error if any filesystem step fails.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StateError::write(format!("Failed to create directory {}: {e}", parent.display())))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| StateError::write(format!("Not a file path: {}", path.display())))?;
    let temp_path = path.with_file_name(format!("{file_name}.tmp"));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| StateError::write(format!("Failed to create temp file: {e}")))?;

    file.write_all(content)
        .await
        .map_err(|e| StateError::write(format!("Failed to write temp file: {e}")))?;

    file.sync_all()
        .await
        .map_err(|e| StateError::write(format!("Failed to sync temp file: {e}")))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| StateError::write(format!("Failed to rename temp file: {e}")))?;

    Ok(())
}

/// Local file-based snapshot store.
#[derive(Debug, Clone)]
pub struct LocalSnapshotStore {
    /// Directory holding every snapshot.
    base_dir: PathBuf,
}

impl LocalSnapshotStore {
    /// Creates a store rooted at `.siteplan` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| SiteplanError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STATE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store rooted at a custom directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The directory holding every snapshot.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Path of one of a plan's files.
    fn key_path(&self, plan_id: &str, suffix: &str) -> Result<PathBuf> {
        let valid = !plan_id.is_empty()
            && plan_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(SiteplanError::PlanNotFound {
                plan_id: plan_id.to_string(),
            });
        }
        Ok(self.base_dir.join(format!("{plan_id}.{suffix}")))
    }

    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|e| StateError::serialization(format!("Failed to serialize snapshot: {e}")))?;

        write_atomic(path, &content).await?;
        debug!("Snapshot written: {}", path.display());
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            debug!("Snapshot does not exist: {}", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .await
            .map_err(|e| StateError::corrupted(format!("Failed to read {}: {e}", path.display())))?;

        let value = serde_json::from_str(&content)
            .map_err(|e| StateError::corrupted(format!("Failed to parse {}: {e}", path.display())))?;

        Ok(Some(value))
    }

    /// Creates the lock file, failing if it already exists.
    ///
    /// The content is staged in a private file and published with a hard
    /// link, so readers never see a partially written lock.
    async fn create_lock_file(&self, path: &Path, lock_info: &LockInfo) -> std::io::Result<()> {
        fs::create_dir_all(&self.base_dir).await?;

        let staged = path.with_file_name(format!("{}.{LOCK_SUFFIX}.{}.new", lock_info.plan_id, lock_info.lock_id));
        let content = serde_json::to_vec_pretty(lock_info)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&staged)
            .await?;
        file.write_all(&content).await?;
        file.sync_all().await?;
        drop(file);

        let published = fs::hard_link(&staged, path).await;
        if let Err(e) = fs::remove_file(&staged).await {
            debug!("Failed to remove staged lock {}: {e}", staged.display());
        }
        published
    }

    /// Moves an expired lock out of the way.
    ///
    /// Returns the live lock found instead if a contender replaced the
    /// expired one first; that lock is linked back into place.
    async fn clear_expired_lock(&self, path: &Path, expired: &LockInfo, claim: &str) -> Result<Option<LockInfo>> {
        let aside = path.with_file_name(format!("{}.{LOCK_SUFFIX}.{claim}.stale", expired.plan_id));

        match fs::rename(path, &aside).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StateError::LockFailed {
                    message: format!("Failed to move expired lock aside: {e}"),
                }
                .into());
            }
        }

        let live = match self.read_json::<LockInfo>(&aside).await {
            Ok(Some(moved)) if moved.lock_id != expired.lock_id && !moved.is_expired() => Some(moved),
            _ => None,
        };

        if let Some(live) = &live {
            match fs::hard_link(&aside, path).await {
                Ok(()) => debug!("Restored lock {} on plan {}", live.lock_id, live.plan_id),
                // A third contender created a lock in between; theirs stands.
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => warn!("Failed to restore lock {} on plan {}: {e}", live.lock_id, live.plan_id),
            }
        }

        if let Err(e) = fs::remove_file(&aside).await {
            debug!("Failed to remove {}: {e}", aside.display());
        }
        Ok(live)
    }
}

fn locked_by_other(plan_id: &str, existing: LockInfo) -> SiteplanError {
    StateError::LockedByOther {
        plan_id: plan_id.to_string(),
        holder: existing.holder,
        operation: existing.operation.to_string(),
        since: existing.acquired_at.to_rfc3339(),
    }
    .into()
}

#[async_trait]
impl SnapshotStore for LocalSnapshotStore {
    async fn save_plan(&self, plan: &Plan) -> Result<()> {
        let path = self.key_path(&plan.plan_id, PLAN_SUFFIX)?;
        info!("Saving plan {} to: {}", plan.plan_id, path.display());
        self.write_json(&path, plan).await
    }

    async fn load_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        let path = self.key_path(plan_id, PLAN_SUFFIX)?;
        self.read_json(&path).await
    }

    async fn list_plans(&self) -> Result<Vec<String>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.base_dir).await?;
        let mut plans: Vec<(SystemTime, String)> = Vec::new();
        let suffix = format!(".{PLAN_SUFFIX}");

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let Some(plan_id) = file_name.strip_suffix(&suffix) else {
                continue;
            };
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            plans.push((modified, plan_id.to_string()));
        }

        plans.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        Ok(plans.into_iter().map(|(_, id)| id).collect())
    }

    async fn save_execution(&self, record: &ExecutionRecord) -> Result<()> {
        let path = self.key_path(&record.plan_id, EXECUTION_SUFFIX)?;
        self.write_json(&path, record).await
    }

    async fn load_execution(&self, plan_id: &str) -> Result<Option<ExecutionRecord>> {
        let path = self.key_path(plan_id, EXECUTION_SUFFIX)?;
        self.read_json(&path).await
    }

    async fn list_executions(&self) -> Result<Vec<ExecutionSummary>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&self.base_dir).await?;
        let mut summaries = Vec::new();
        let suffix = format!(".{EXECUTION_SUFFIX}");

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.ends_with(&suffix) {
                continue;
            }

            match self.read_json::<ExecutionRecord>(&entry.path()).await {
                Ok(Some(record)) => summaries.push(ExecutionSummary::from(&record)),
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable execution snapshot {file_name}: {e}"),
            }
        }

        summaries.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.plan_id.cmp(&b.plan_id))
        });
        Ok(summaries)
    }

    async fn save_rollback(&self, record: &RollbackRecord) -> Result<()> {
        let path = self.key_path(&record.plan_id, ROLLBACK_SUFFIX)?;
        self.write_json(&path, record).await
    }

    async fn load_rollback(&self, plan_id: &str) -> Result<Option<RollbackRecord>> {
        let path = self.key_path(plan_id, ROLLBACK_SUFFIX)?;
        self.read_json(&path).await
    }

    async fn acquire_lock(&self, plan_id: &str, holder: &str, operation: LockOperation) -> Result<LockInfo> {
        let path = self.key_path(plan_id, LOCK_SUFFIX)?;

        let holder_id = if holder.is_empty() {
            generate_holder_id()
        } else {
            holder.to_string()
        };
        let lock_info = LockInfo::new(plan_id, &holder_id, operation);

        for _ in 0..LOCK_ATTEMPTS {
            match self.create_lock_file(&path, &lock_info).await {
                Ok(()) => {
                    info!(
                        "Acquired {operation} lock on plan {plan_id}: {} (expires in {}s)",
                        lock_info.lock_id, LOCK_EXPIRY_SECS
                    );
                    return Ok(lock_info);
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    let Some(existing) = self.read_json::<LockInfo>(&path).await? else {
                        continue;
                    };
                    if !existing.is_expired() {
                        return Err(locked_by_other(plan_id, existing));
                    }

                    debug!("Expired lock {} found on plan {plan_id}, taking over", existing.lock_id);
                    if let Some(live) = self
                        .clear_expired_lock(&path, &existing, &lock_info.lock_id)
                        .await?
                    {
                        return Err(locked_by_other(plan_id, live));
                    }
                }
                Err(e) => {
                    return Err(StateError::LockFailed {
                        message: format!("Failed to create lock file: {e}"),
                    }
                    .into());
                }
            }
        }

        Err(StateError::LockFailed {
            message: format!("Lock on plan {plan_id} changed hands while acquiring"),
        }
        .into())
    }

    async fn renew_lock(&self, plan_id: &str, lock_id: &str) -> Result<LockInfo> {
        let path = self.key_path(plan_id, LOCK_SUFFIX)?;

        match self.read_json::<LockInfo>(&path).await? {
            Some(mut lock) if lock.lock_id == lock_id => {
                lock.renew();
                self.write_json(&path, &lock).await?;
                debug!("Renewed lock on plan {plan_id} until {}", lock.expires_at.to_rfc3339());
                Ok(lock)
            }
            Some(other) => Err(StateError::LockLost {
                plan_id: plan_id.to_string(),
                message: format!("now held by {} for {}", other.holder, other.operation),
            }
            .into()),
            None => Err(StateError::LockLost {
                plan_id: plan_id.to_string(),
                message: String::from("lock file was removed"),
            }
            .into()),
        }
    }

    async fn release_lock(&self, plan_id: &str, lock_id: &str) -> Result<()> {
        let path = self.key_path(plan_id, LOCK_SUFFIX)?;
        let existing: Option<LockInfo> = self.read_json(&path).await?;

        if let Some(existing) = existing {
            if existing.lock_id == lock_id {
                fs::remove_file(&path).await.map_err(|e| StateError::LockFailed {
                    message: format!("Failed to delete lock file: {e}"),
                })?;
                info!("Released lock on plan {plan_id}: {lock_id}");
            } else {
                debug!(
                    "Lock ID mismatch on plan {plan_id}: expected {lock_id}, found {}",
                    existing.lock_id
                );
            }
        }
        Ok(())
    }

    async fn get_lock_info(&self, plan_id: &str) -> Result<Option<LockInfo>> {
        let path = self.key_path(plan_id, LOCK_SUFFIX)?;
        self.read_json(&path).await
    }

    async fn force_unlock(&self, plan_id: &str) -> Result<bool> {
        let path = self.key_path(plan_id, LOCK_SUFFIX)?;
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path).await.map_err(|e| StateError::LockFailed {
            message: format!("Failed to delete lock file: {e}"),
        })?;
        info!("Force-released lock on plan {plan_id}");
        Ok(true)
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }
}
