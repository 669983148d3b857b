//! Remote system client contract.
//!
//! The engines never speak a wire protocol. They see a remote system as a
//! set of optional per-type capabilities plus one generic named-operation
//! call. A type without a capability is reported as not implemented, never
//! as a failure.

mod inventory;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use std::collections::BTreeMap;

use crate::error::RemoteError;
use crate::planner::{ObjectType, PlanObject};

pub use inventory::{InventoryEntry, InventoryRemote, InventorySnapshot};

/// Result of a remote call.
pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Operations available for one object type.
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Checks whether an object with this name exists.
    async fn exists(&self, name: &str) -> RemoteResult<bool>;

    /// Creates the object.
    async fn create(&self, object: &PlanObject) -> RemoteResult<()>;

    /// Removes the object with this name.
    async fn remove(&self, name: &str) -> RemoteResult<()>;
}

/// A client for the remote managed system.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Short name of the client, for logs.
    fn name(&self) -> &str;

    /// Returns the operations bound to `object_type`, if any.
    fn capability(&self, object_type: ObjectType) -> Option<&dyn ObjectApi>;

    /// Invokes a named operation with named arguments.
    async fn invoke(&self, operation: &str, args: &BTreeMap<String, String>) -> RemoteResult<()>;
}

/// Renders a named-operation call for display, e.g. `removeRegion(name=R_ELM)`.
#[must_use]
pub fn render_call(operation: &str, args: &BTreeMap<String, String>) -> String {
    let rendered: Vec<String> = args.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{operation}({})", rendered.join(", "))
}
