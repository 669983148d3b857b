//! Configuration types for the siteplan system.
//!
//! This module defines the structs that map to `siteplan.yaml`. Every path
//! in the file is resolved against the directory the file was loaded from.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::executor::DependencyPolicy;
use crate::planner::ObjectType;
use crate::state::STATE_DIR;

/// The root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteplanConfig {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Snapshot storage configuration.
    #[serde(default)]
    pub state: StateConfig,
    /// Template file locations.
    #[serde(default)]
    pub templates: TemplatesConfig,
    /// Remote system configuration.
    #[serde(default)]
    pub remote: RemoteConfig,
    /// Execution behavior.
    #[serde(default)]
    pub execution: ExecutionConfig,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProjectConfig {
    /// Organization name, available to templates as `{org}`.
    pub org: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    pub environment: String,
}

/// Snapshot storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// Directory holding plan, execution and rollback snapshots.
    #[serde(default = "default_state_dir")]
    pub dir: String,
}

/// Template file locations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TemplatesConfig {
    /// Naming profile file.
    #[serde(default = "default_naming")]
    pub naming: String,
    /// Optional dialplan blueprint file.
    #[serde(default)]
    pub dialplan: Option<String>,
}

/// Remote system configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Inventory file backing the remote.
    #[serde(default = "default_inventory")]
    pub inventory: String,
    /// Types the remote has a capability for.
    #[serde(default = "all_types")]
    pub supported_types: Vec<ObjectType>,
}

/// Execution behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionConfig {
    /// Types the execution engine attempts; others are skipped.
    #[serde(default = "all_types")]
    pub executable_types: Vec<ObjectType>,
    /// What to do with objects whose dependency failed.
    #[serde(default)]
    pub on_dependency_failure: DependencyPolicy,
}

fn default_environment() -> String {
    String::from("dev")
}

fn default_state_dir() -> String {
    String::from(STATE_DIR)
}

fn default_naming() -> String {
    String::from("naming.yaml")
}

fn default_inventory() -> String {
    format!("{STATE_DIR}/inventory.json")
}

fn all_types() -> Vec<ObjectType> {
    ObjectType::ALL.to_vec()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

impl Default for TemplatesConfig {
    fn default() -> Self {
        Self {
            naming: default_naming(),
            dialplan: None,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            inventory: default_inventory(),
            supported_types: all_types(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            executable_types: all_types(),
            on_dependency_failure: DependencyPolicy::default(),
        }
    }
}

impl SiteplanConfig {
    /// Resolves a configured path against the config directory.
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Snapshot directory.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        self.resolve(&self.state.dir)
    }

    /// Naming profile path.
    #[must_use]
    pub fn naming_path(&self) -> PathBuf {
        self.resolve(&self.templates.naming)
    }

    /// Dialplan blueprint path, if configured.
    #[must_use]
    pub fn dialplan_path(&self) -> Option<PathBuf> {
        self.templates.dialplan.as_ref().map(|p| self.resolve(p))
    }

    /// Inventory file path.
    #[must_use]
    pub fn inventory_path(&self) -> PathBuf {
        self.resolve(&self.remote.inventory)
    }
}
