// ============================================================================
// Linting
// ============================================================================

#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![warn(missing_docs)]                // Public items should be documented
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(nonstandard_style)]           // Non-standard code style is forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]
#![warn(clippy::print_stdout)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::redundant_clone)]
#![warn(clippy::too_many_arguments)]
#![warn(clippy::cognitive_complexity)]

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Siteplan
//!
//! Template-driven provisioning of call-control sites with a plan, apply and
//! rollback workflow.
//!
//! ## Overview
//!
//! - Site records and naming templates are rendered into a **plan**: every
//!   configuration object a site needs, in dependency order, each marked
//!   create or skip.
//! - The **execution engine** walks a plan against a remote system,
//!   checkpointing a durable record after every step.
//! - The **rollback engine** replays the objects an execution created in
//!   reverse order through their inverse operations.
//!
//! ## Modules
//!
//! - [`config`]: Configuration, site records and validation
//! - [`naming`]: Name and description templates
//! - [`planner`]: Plan construction, dialplan blueprints and fingerprints
//! - [`remote`]: Remote system capability contract and the inventory remote
//! - [`executor`]: Execution and rollback engines
//! - [`state`]: Snapshot storage and plan locks
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   org: ACME
//!   environment: prod
//!
//! templates:
//!   naming: naming.yaml
//!   dialplan: dialplan.yaml
//!
//! execution:
//!   on_dependency_failure: skip
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod naming;
pub mod planner;
pub mod remote;
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigParser, ConfigValidator, SiteplanConfig};
pub use error::{Result, SiteplanError};
pub use executor::{ExecutionEngine, ExecutionRecord, HandlerRegistry, RollbackEngine, RollbackRecord};
pub use planner::{Plan, PlanBuilder, PlanHasher};
pub use remote::{InventoryRemote, RemoteClient};
pub use state::{LocalSnapshotStore, SnapshotStore};
