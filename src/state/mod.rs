//! Snapshot storage for the siteplan engines.
//!
//! Plans, execution records and rollback records are persisted per plan id
//! and are the only source of truth for status queries and rollback.

mod local;
mod lock;
mod store;

pub use local::{LocalSnapshotStore, STATE_DIR, write_atomic};
pub use lock::{LOCK_EXPIRY_SECS, LockInfo, LockOperation, generate_holder_id};
pub use store::SnapshotStore;
