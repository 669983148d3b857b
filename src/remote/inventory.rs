//! File-backed inventory remote.
//!
//! Keeps the remote system's objects as a JSON document of per-type
//! tables. Used to rehearse plans end to end and as an existence lookup
//! for planning. Only the configured types get a capability; every other
//! type reports as not implemented.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{RemoteError, Result, StateError};
use crate::planner::{ExistenceLookup, ObjectInputs, ObjectType, PlanObject};
use crate::state::write_atomic;

use super::{ObjectApi, RemoteClient, RemoteResult};

/// One object held by the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Object description.
    #[serde(default)]
    pub description: String,
    /// Inputs the object was created with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<ObjectInputs>,
    /// When the object was added.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

type Tables = BTreeMap<ObjectType, BTreeMap<String, InventoryEntry>>;

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    path: Option<PathBuf>,
}

impl Shared {
    async fn persist(&self, tables: &Tables) -> RemoteResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let content = serde_json::to_vec_pretty(tables)
            .map_err(|e| RemoteError::rejected(format!("Failed to serialize inventory: {e}")))?;
        write_atomic(path, &content)
            .await
            .map_err(|e| RemoteError::rejected(e.to_string()))?;

        debug!("Inventory written to {}", path.display());
        Ok(())
    }

    async fn remove(&self, object_type: ObjectType, name: &str) -> RemoteResult<()> {
        let mut tables = self.tables.write().await;
        let Some(removed) = tables
            .get_mut(&object_type)
            .and_then(|table| table.remove(name))
        else {
            return Err(RemoteError::NotFound {
                object_type,
                name: name.to_string(),
            });
        };

        if let Err(e) = self.persist(&tables).await {
            tables.entry(object_type).or_default().insert(name.to_string(), removed);
            return Err(e);
        }
        Ok(())
    }
}

/// Capability for one object type.
#[derive(Debug)]
struct InventoryTable {
    object_type: ObjectType,
    shared: Arc<Shared>,
}

#[async_trait]
impl ObjectApi for InventoryTable {
    async fn exists(&self, name: &str) -> RemoteResult<bool> {
        let tables = self.shared.tables.read().await;
        Ok(tables
            .get(&self.object_type)
            .is_some_and(|table| table.contains_key(name)))
    }

    async fn create(&self, object: &PlanObject) -> RemoteResult<()> {
        if object.object_type != self.object_type {
            return Err(RemoteError::rejected(format!(
                "{} '{}' sent to the {} table",
                object.object_type, object.name, self.object_type
            )));
        }

        let mut tables = self.shared.tables.write().await;
        let table = tables.entry(self.object_type).or_default();
        if table.contains_key(&object.name) {
            return Err(RemoteError::AlreadyExists {
                object_type: self.object_type,
                name: object.name.clone(),
            });
        }

        table.insert(
            object.name.clone(),
            InventoryEntry {
                description: object.description.clone(),
                inputs: Some(object.inputs.clone()),
                created_at: Utc::now(),
            },
        );

        // Undo the insert if the write fails.
        if let Err(e) = self.shared.persist(&tables).await {
            if let Some(table) = tables.get_mut(&self.object_type) {
                table.remove(&object.name);
            }
            return Err(e);
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> RemoteResult<()> {
        self.shared.remove(self.object_type, name).await
    }
}

/// A remote backed by an in-memory or on-disk inventory.
#[derive(Debug)]
pub struct InventoryRemote {
    shared: Arc<Shared>,
    capabilities: BTreeMap<ObjectType, InventoryTable>,
}

impl InventoryRemote {
    fn build(tables: Tables, path: Option<PathBuf>, supported: impl IntoIterator<Item = ObjectType>) -> Self {
        let shared = Arc::new(Shared {
            tables: RwLock::new(tables),
            path,
        });
        let capabilities = supported
            .into_iter()
            .map(|object_type| {
                (
                    object_type,
                    InventoryTable {
                        object_type,
                        shared: Arc::clone(&shared),
                    },
                )
            })
            .collect();

        Self { shared, capabilities }
    }

    /// Creates an empty inventory that is never written to disk.
    #[must_use]
    pub fn in_memory(supported: impl IntoIterator<Item = ObjectType>) -> Self {
        Self::build(Tables::new(), None, supported)
    }

    /// Opens an inventory file, starting empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn open(path: impl AsRef<Path>, supported: impl IntoIterator<Item = ObjectType>) -> Result<Self> {
        let path = path.as_ref();

        let tables = if path.exists() {
            info!("Loading inventory from: {}", path.display());
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| StateError::corrupted(format!("Failed to read inventory: {e}")))?;
            serde_json::from_str(&content)
                .map_err(|e| StateError::corrupted(format!("Failed to parse inventory: {e}")))?
        } else {
            debug!("Inventory {} does not exist, starting empty", path.display());
            Tables::new()
        };

        Ok(Self::build(tables, Some(path.to_path_buf()), supported))
    }

    /// Types this inventory has a capability for.
    #[must_use]
    pub fn supported_types(&self) -> BTreeSet<ObjectType> {
        self.capabilities.keys().copied().collect()
    }

    /// Adds an object directly, bypassing capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory cannot be written.
    pub async fn insert(&self, object_type: ObjectType, name: &str, description: &str) -> RemoteResult<()> {
        let mut tables = self.shared.tables.write().await;
        tables.entry(object_type).or_default().insert(
            name.to_string(),
            InventoryEntry {
                description: description.to_string(),
                inputs: None,
                created_at: Utc::now(),
            },
        );
        self.shared.persist(&tables).await
    }

    /// Number of objects held for a type.
    pub async fn count(&self, object_type: ObjectType) -> usize {
        self.shared
            .tables
            .read()
            .await
            .get(&object_type)
            .map_or(0, BTreeMap::len)
    }

    /// Takes a point-in-time copy usable as a planning lookup.
    pub async fn snapshot(&self) -> InventorySnapshot {
        let tables = self.shared.tables.read().await;
        InventorySnapshot {
            names: tables
                .iter()
                .map(|(t, table)| (*t, table.keys().cloned().collect()))
                .collect(),
            supported: self.supported_types(),
        }
    }
}

#[async_trait]
impl RemoteClient for InventoryRemote {
    fn name(&self) -> &str {
        "inventory"
    }

    fn capability(&self, object_type: ObjectType) -> Option<&dyn ObjectApi> {
        self.capabilities
            .get(&object_type)
            .map(|table| table as &dyn ObjectApi)
    }

    async fn invoke(&self, operation: &str, args: &BTreeMap<String, String>) -> RemoteResult<()> {
        let object_type = ObjectType::from_inverse_operation(operation).ok_or_else(|| {
            RemoteError::UnknownOperation {
                operation: operation.to_string(),
            }
        })?;
        let name = args
            .get("name")
            .ok_or_else(|| RemoteError::rejected(format!("{operation} requires a 'name' argument")))?;

        self.shared.remove(object_type, name).await
    }
}

/// Point-in-time object names, per type.
#[derive(Debug, Clone, Default)]
pub struct InventorySnapshot {
    names: BTreeMap<ObjectType, BTreeSet<String>>,
    supported: BTreeSet<ObjectType>,
}

impl ExistenceLookup for InventorySnapshot {
    fn exists(&self, object_type: ObjectType, name: &str) -> std::result::Result<bool, String> {
        if !self.supported.contains(&object_type) {
            return Err(RemoteError::Unsupported { object_type }.to_string());
        }
        Ok(self
            .names
            .get(&object_type)
            .is_some_and(|names| names.contains(name)))
    }
}
