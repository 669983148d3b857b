//! Scripted remote for engine tests.
//!
//! Objects are held in memory; failures are injected per object name and
//! every call is recorded in order.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use crate::error::RemoteError;
use crate::planner::{ObjectType, PlanObject};

use super::{ObjectApi, RemoteClient, RemoteResult};

#[derive(Debug, Default)]
struct Script {
    existing: BTreeSet<(ObjectType, String)>,
    fail_exists: BTreeSet<String>,
    fail_create: BTreeSet<String>,
    fail_remove: BTreeSet<String>,
    calls: Vec<String>,
}

#[derive(Debug)]
struct ScriptedApi {
    object_type: ObjectType,
    script: Arc<Mutex<Script>>,
}

#[async_trait]
impl ObjectApi for ScriptedApi {
    async fn exists(&self, name: &str) -> RemoteResult<bool> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("exists:{}:{name}", self.object_type));
        if script.fail_exists.contains(name) {
            return Err(RemoteError::rejected(format!("lookup of {name} timed out")));
        }
        Ok(script.existing.contains(&(self.object_type, name.to_string())))
    }

    async fn create(&self, object: &PlanObject) -> RemoteResult<()> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("create:{}:{}", self.object_type, object.name));
        if script.fail_create.contains(&object.name) {
            return Err(RemoteError::rejected(format!("create of {} refused", object.name)));
        }
        script.existing.insert((self.object_type, object.name.clone()));
        Ok(())
    }

    async fn remove(&self, name: &str) -> RemoteResult<()> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(format!("remove:{}:{name}", self.object_type));
        if script.fail_remove.contains(name) {
            return Err(RemoteError::rejected(format!("{name} is still in use")));
        }
        script.existing.remove(&(self.object_type, name.to_string()));
        Ok(())
    }
}

/// In-memory remote with scripted failures and a call log.
#[derive(Debug)]
pub struct ScriptedRemote {
    script: Arc<Mutex<Script>>,
    apis: BTreeMap<ObjectType, ScriptedApi>,
}

impl ScriptedRemote {
    /// Creates a remote with a capability for every type.
    #[must_use]
    pub fn new() -> Self {
        Self::supporting(ObjectType::ALL)
    }

    /// Creates a remote with capabilities for the given types only.
    #[must_use]
    pub fn supporting(types: impl IntoIterator<Item = ObjectType>) -> Self {
        let script = Arc::new(Mutex::new(Script::default()));
        let apis = types
            .into_iter()
            .map(|object_type| {
                (
                    object_type,
                    ScriptedApi {
                        object_type,
                        script: Arc::clone(&script),
                    },
                )
            })
            .collect();
        Self { script, apis }
    }

    /// Marks an object as already present.
    #[must_use]
    pub fn with_existing(self, object_type: ObjectType, name: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .existing
            .insert((object_type, name.to_string()));
        self
    }

    /// Makes existence checks for `name` fail.
    #[must_use]
    pub fn failing_exists(self, name: &str) -> Self {
        self.script.lock().unwrap().fail_exists.insert(name.to_string());
        self
    }

    /// Makes creation of `name` fail.
    #[must_use]
    pub fn failing_create(self, name: &str) -> Self {
        self.script.lock().unwrap().fail_create.insert(name.to_string());
        self
    }

    /// Makes removal of `name` fail, through capabilities and `invoke`.
    #[must_use]
    pub fn failing_remove(self, name: &str) -> Self {
        self.script.lock().unwrap().fail_remove.insert(name.to_string());
        self
    }

    /// Calls made so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    /// Calls of one kind ("exists", "create", "remove" or "invoke").
    #[must_use]
    pub fn calls_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{kind}:");
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(&prefix))
            .collect()
    }

    /// Returns true if the object is currently present.
    #[must_use]
    pub fn contains(&self, object_type: ObjectType, name: &str) -> bool {
        self.script
            .lock()
            .unwrap()
            .existing
            .contains(&(object_type, name.to_string()))
    }
}

#[async_trait]
impl RemoteClient for ScriptedRemote {
    fn name(&self) -> &str {
        "scripted"
    }

    fn capability(&self, object_type: ObjectType) -> Option<&dyn ObjectApi> {
        self.apis.get(&object_type).map(|api| api as &dyn ObjectApi)
    }

    async fn invoke(&self, operation: &str, args: &BTreeMap<String, String>) -> RemoteResult<()> {
        let mut script = self.script.lock().unwrap();
        let name = args.get("name").cloned().unwrap_or_default();
        script.calls.push(format!("invoke:{operation}:{name}"));

        let Some(object_type) = ObjectType::from_inverse_operation(operation) else {
            return Err(RemoteError::UnknownOperation {
                operation: operation.to_string(),
            });
        };
        if script.fail_remove.contains(&name) {
            return Err(RemoteError::rejected(format!("{name} is still in use")));
        }
        script.existing.remove(&(object_type, name));
        Ok(())
    }
}
