//! Per-type step handlers.
//!
//! The registry maps each object type to the handler that executes it and
//! is the single extension point for new types.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::planner::{ObjectType, PlanObject};
use crate::remote::{RemoteClient, RemoteResult};

/// What a handler did with an object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The object was already present.
    Exists,
    /// Nothing was created; the message says why.
    Planned(String),
    /// The object was created.
    Created(String),
}

/// Executes one object against a remote client.
#[async_trait]
pub trait ObjectHandler: Send + Sync {
    /// Checks existence and, when `apply` is set, creates the object.
    ///
    /// # Errors
    ///
    /// Returns the remote error if any remote call fails.
    async fn handle(
        &self,
        object: &PlanObject,
        remote: &dyn RemoteClient,
        apply: bool,
    ) -> RemoteResult<HandlerOutcome>;
}

/// Handler that drives an object through the remote's capability for its type.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapabilityHandler;

#[async_trait]
impl ObjectHandler for CapabilityHandler {
    async fn handle(
        &self,
        object: &PlanObject,
        remote: &dyn RemoteClient,
        apply: bool,
    ) -> RemoteResult<HandlerOutcome> {
        let object_type = object.object_type;
        let friendly = object_type.friendly();

        let Some(api) = remote.capability(object_type) else {
            return Ok(HandlerOutcome::Planned(format!(
                "{friendly} handler not implemented yet"
            )));
        };

        if api.exists(&object.name).await? {
            debug!("{object_type} '{}' already exists", object.name);
            return Ok(HandlerOutcome::Exists);
        }

        if !apply {
            let message = match object.inputs.members() {
                Some(members) => format!("Would create {friendly} with {} members", members.len()),
                None => format!("Would create {friendly}"),
            };
            return Ok(HandlerOutcome::Planned(message));
        }

        api.create(object).await?;
        Ok(HandlerOutcome::Created(format!("{friendly} created")))
    }
}

/// Mapping from object type to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<ObjectType, Arc<dyn ObjectHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("types", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the capability handler bound to every type.
    #[must_use]
    pub fn with_defaults() -> Self {
        let handler: Arc<dyn ObjectHandler> = Arc::new(CapabilityHandler);
        let mut registry = Self::new();
        for object_type in ObjectType::ALL {
            registry.register(object_type, Arc::clone(&handler));
        }
        registry
    }

    /// Binds a handler to a type, replacing any previous binding.
    pub fn register(&mut self, object_type: ObjectType, handler: Arc<dyn ObjectHandler>) {
        self.handlers.insert(object_type, handler);
    }

    /// Removes the binding for a type.
    pub fn unregister(&mut self, object_type: ObjectType) {
        self.handlers.remove(&object_type);
    }

    /// Returns the handler bound to a type.
    #[must_use]
    pub fn get(&self, object_type: ObjectType) -> Option<&dyn ObjectHandler> {
        self.handlers.get(&object_type).map(AsRef::as_ref)
    }
}
