//! Error types for the siteplan provisioning system.
//!
//! This module provides the error hierarchy for every stage of the
//! lifecycle: configuration, template rendering, planning, snapshot
//! storage, and calls against the remote system.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::ObjectType;

/// The main error type for the siteplan system.
#[derive(Debug, Error)]
pub enum SiteplanError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Template rendering errors.
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Snapshot storage errors.
    #[error("State error: {0}")]
    State(#[from] StateError),

    /// Remote system errors.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// A rollback was requested for a plan that was never executed.
    #[error("No execution record found for plan {plan_id}")]
    ExecutionNotFound {
        /// The requested plan identifier.
        plan_id: String,
    },

    /// The plan's applied execution still has created objects to roll back.
    #[error(
        "Plan {plan_id} has {created} created objects that were not rolled back; run 'siteplan rollback {plan_id}' first"
    )]
    RollbackPending {
        /// The plan identifier.
        plan_id: String,
        /// Number of created objects on record.
        created: usize,
    },

    /// A plan document was requested that does not exist.
    #[error("Plan not found: {plan_id}")]
    PlanNotFound {
        /// The requested plan identifier.
        plan_id: String,
    },

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },
}

/// Template rendering errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    /// No template is registered for the object type.
    #[error("No template registered for {object_type}")]
    MissingTemplate {
        /// The object type without a template.
        object_type: ObjectType,
    },

    /// The template references a field the site context does not provide.
    #[error("Template '{template}' references unknown field '{field}'")]
    UnknownField {
        /// The template text.
        template: String,
        /// The unknown field name.
        field: String,
    },

    /// The template has unbalanced braces.
    #[error("Malformed template '{template}': {reason}")]
    Malformed {
        /// The template text.
        template: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Row-level planning errors.
///
/// These never abort a batch; the planner collects them next to the
/// best-effort plan.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The site code was already planned earlier in the batch.
    #[error("Duplicate site_code '{site_code}' (row {row})")]
    DuplicateSiteCode {
        /// The duplicated site code.
        site_code: String,
        /// 1-based position of the rejected row.
        row: usize,
    },

    /// The row failed schema validation.
    #[error("Invalid row {row} ({site_code}): {message}")]
    InvalidRow {
        /// The row's site code as given.
        site_code: String,
        /// 1-based position of the row.
        row: usize,
        /// Validation details.
        message: String,
    },

    /// A name or description could not be rendered.
    #[error("{site_code}: {source}")]
    Template {
        /// The affected site.
        site_code: String,
        /// The underlying template error.
        source: TemplateError,
    },

    /// A grouping member alias matched neither the site nor the global table.
    #[error("CSS '{group}' references unknown partition '{alias}' for site {site_code}")]
    UnresolvedReference {
        /// The affected site.
        site_code: String,
        /// Blueprint key of the grouping object.
        group: String,
        /// The alias that failed to resolve.
        alias: String,
    },
}

/// Snapshot storage errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// A snapshot is corrupted or unreadable.
    #[error("Snapshot is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Writing a snapshot failed.
    #[error("Failed to write snapshot: {message}")]
    WriteFailed {
        /// Description of the write failure.
        message: String,
    },

    /// Lock acquisition failed.
    #[error("Failed to acquire plan lock: {message}")]
    LockFailed {
        /// Description of the lock failure.
        message: String,
    },

    /// The plan is locked by another execution or rollback.
    #[error("Plan {plan_id} is locked by {holder} for {operation} (since: {since})")]
    LockedByOther {
        /// The locked plan.
        plan_id: String,
        /// Identifier of the lock holder.
        holder: String,
        /// Operation the holder is running.
        operation: String,
        /// When the lock was acquired.
        since: String,
    },

    /// The lock was taken over or removed while an engine held it.
    #[error("Lost the lock on plan {plan_id}: {message}")]
    LockLost {
        /// The locked plan.
        plan_id: String,
        /// What happened to the lock.
        message: String,
    },

    /// Serialization error.
    #[error("Snapshot serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Errors raised by a remote client.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The client has no capability for this object type.
    #[error("{object_type} is not supported by this remote")]
    Unsupported {
        /// The unsupported object type.
        object_type: ObjectType,
    },

    /// A generic invocation named an operation the client does not know.
    #[error("Unknown remote operation: {operation}")]
    UnknownOperation {
        /// The operation name.
        operation: String,
    },

    /// The object does not exist on the remote system.
    #[error("{object_type} '{name}' not found")]
    NotFound {
        /// Type of the missing object.
        object_type: ObjectType,
        /// Name of the missing object.
        name: String,
    },

    /// The object already exists on the remote system.
    #[error("{object_type} '{name}' already exists")]
    AlreadyExists {
        /// Type of the conflicting object.
        object_type: ObjectType,
        /// Name of the conflicting object.
        name: String,
    },

    /// The remote system rejected the request.
    #[error("Remote rejected request: {message}")]
    Rejected {
        /// Message returned by the remote system.
        message: String,
    },
}

/// Result type alias for siteplan operations.
pub type Result<T> = std::result::Result<T, SiteplanError>;

impl SiteplanError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error means another process holds the plan.
    #[must_use]
    pub const fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::State(StateError::LockedByOther { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a parse error for a file.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: Some(location.into()),
        }
    }
}

impl StateError {
    /// Creates a write error with the given message.
    #[must_use]
    pub fn write(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

impl RemoteError {
    /// Creates a rejection error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_names_site_and_row() {
        let err = PlanError::DuplicateSiteCode {
            site_code: String::from("ELM"),
            row: 2,
        };
        assert_eq!(err.to_string(), "Duplicate site_code 'ELM' (row 2)");
    }

    #[test]
    fn test_lock_conflict_detection() {
        let err = SiteplanError::State(StateError::LockedByOther {
            plan_id: String::from("p"),
            holder: String::from("h"),
            operation: String::from("execute"),
            since: String::from("now"),
        });
        assert!(err.is_lock_conflict());
        assert!(!SiteplanError::internal("x").is_lock_conflict());
    }
}
