//! Remediation of violating resources.
//!
//! - [`pipeline`]: the per-resource quarantine, capture, destroy, notify walk
//! - [`orchestrator`]: bounded parallel execution across a batch

pub mod orchestrator;
pub mod pipeline;

pub use orchestrator::{remediate_all, OrchestrationReport};
pub use pipeline::{
    notification_message, snapshot_description, PipelineSettings, RemediationPipeline,
    StageTracker, NOTIFICATION_SUBJECT,
};
