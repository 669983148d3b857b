//! Planning module for site provisioning.
//!
//! This module turns site records into a deterministic, dependency-ordered
//! plan of objects to create or skip.

mod builder;
mod dialplan;
mod hash;
mod lookup;
mod types;

pub use builder::{PlanBuilder, PlanOutcome, SITE_MRG_KEYWORD, SITE_PARTITION_KEYWORD, dependencies};
pub use dialplan::{
    Blueprint, BlueprintGlobals, CssTemplate, DialplanBuilder, DialplanObjects, GlobalsReport, PartitionScope,
    PartitionTemplate,
};
pub use hash::PlanHasher;
pub use lookup::{ExistenceLookup, classify};
pub use types::{Action, ActionCounts, ObjectInputs, ObjectType, Plan, PlanObject, PlanSummary, Site};
