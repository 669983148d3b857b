//! Per-plan advisory locks.
//!
//! At most one execution or rollback may run against a plan at a time.
//! The lock records who holds it and for which operation, and expires so
//! that a crashed process cannot block a plan forever.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lock expiry duration in seconds.
pub const LOCK_EXPIRY_SECS: i64 = 1800; // 30 minutes

/// Operation holding a plan lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockOperation {
    /// Applying or rehearsing a plan.
    Execute,
    /// Reversing an execution.
    Rollback,
}

impl fmt::Display for LockOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execute => write!(f, "execute"),
            Self::Rollback => write!(f, "rollback"),
        }
    }
}

/// Information about a plan lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    /// Unique lock identifier.
    pub lock_id: String,
    /// The locked plan.
    pub plan_id: String,
    /// Who holds the lock.
    pub holder: String,
    /// What the holder is doing.
    pub operation: LockOperation,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the lock expires.
    pub expires_at: DateTime<Utc>,
}

impl LockInfo {
    /// Creates a new lock info.
    #[must_use]
    pub fn new(plan_id: &str, holder: &str, operation: LockOperation) -> Self {
        let now = Utc::now();
        Self {
            lock_id: Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            holder: holder.to_string(),
            operation,
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(LOCK_EXPIRY_SECS),
        }
    }

    /// Checks if the lock has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Restarts the expiry window from now.
    pub fn renew(&mut self) {
        self.expires_at = Utc::now() + chrono::Duration::seconds(LOCK_EXPIRY_SECS);
    }

    /// Returns the remaining time until expiry in seconds.
    #[must_use]
    pub fn remaining_secs(&self) -> i64 {
        let remaining = self.expires_at - Utc::now();
        remaining.num_seconds().max(0)
    }
}

/// Generates a unique holder identifier for the current process.
#[must_use]
pub fn generate_holder_id() -> String {
    let hostname = hostname::get().map_or_else(|_| String::from("unknown"), |h| h.to_string_lossy().to_string());

    let pid = std::process::id();
    let uuid = &Uuid::new_v4().to_string()[..8];

    format!("{hostname}-{pid}-{uuid}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_creation() {
        let lock = LockInfo::new("plan-1", "test-holder", LockOperation::Execute);
        assert_eq!(lock.holder, "test-holder");
        assert_eq!(lock.plan_id, "plan-1");
        assert!(!lock.is_expired());
        assert!(lock.remaining_secs() > LOCK_EXPIRY_SECS - 60);
    }

    #[test]
    fn test_expired_lock() {
        let mut lock = LockInfo::new("plan-1", "test-holder", LockOperation::Rollback);
        lock.expires_at = Utc::now() - chrono::Duration::seconds(1);
        assert!(lock.is_expired());
        assert_eq!(lock.remaining_secs(), 0);
    }

    #[test]
    fn test_renew_restarts_window() {
        let mut lock = LockInfo::new("plan-1", "test-holder", LockOperation::Execute);
        lock.expires_at = Utc::now() + chrono::Duration::seconds(5);

        lock.renew();
        assert!(lock.remaining_secs() > LOCK_EXPIRY_SECS - 60);
    }

    #[test]
    fn test_holder_id_generation() {
        let id1 = generate_holder_id();
        let id2 = generate_holder_id();

        assert_ne!(id1, id2);

        let pid = std::process::id().to_string();
        assert!(id1.contains(&pid));
    }
}
