//! Execution and rollback engines.
//!
//! Both engines run strictly sequentially, hold the plan lock for their
//! whole run, and persist a full snapshot after every step.

mod engine;
mod handlers;
mod record;
mod rollback;

pub use engine::{DEPENDENCY_FAILED, DependencyPolicy, ExecutionEngine, NO_HANDLER, NOT_EXECUTABLE};
pub use handlers::{CapabilityHandler, HandlerOutcome, HandlerRegistry, ObjectHandler};
pub use record::{
    CurrentStep, ExecutionRecord, ExecutionStatus, ExecutionSummary, RollbackDescriptor, RollbackRecord, RollbackStatus,
    RollbackStepResult, RollbackStepStatus, StepResult, StepStatus,
};
pub use rollback::RollbackEngine;
