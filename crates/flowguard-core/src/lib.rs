//! Flowguard Core: Policy Evaluation and Remediation
//!
//! ## Layer 1 - Decision and Response
//!
//! A delivered batch of flow-log records is decoded, each record is resolved
//! to the instance that owns its network interface, and destinations outside
//! the whitelist trigger the remediation pipeline for that instance.
//!
//! ## Key Components
//!
//! - `Whitelist` / `NetworkException`: prefix and port allow rules
//! - `policy::build_whitelist`: static rules plus provider-published ranges
//! - `Classifier`: concurrent per-record classification
//! - `RemediationPipeline` / `remediate_all`: quarantine, capture, destroy, notify
//! - `IncidentHandler`: the per-batch entry point

pub mod batch;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod handler;
pub mod metrics;
pub mod obs;
pub mod policy;
pub mod remediation;
pub mod telemetry;

pub use batch::{decode_batch, decode_batch_str, encode_envelope, DecodedBatch};
pub use classifier::{classify, ClassifiedBatch, Classifier};
pub use config::{Config, ExceptionConfig};
pub use domain::{
    BatchDecodeError, BatchSummary, ClassifyError, ConfigError, EnrichmentStatus, FlowEvent,
    FlowRecord, HandlerError, NetworkError, NetworkException, PolicyError, RemediationFailure,
    RemediationOutcome, RemediationState, Result, SkippedRecord, Stage, Verdict, Whitelist,
};
pub use handler::IncidentHandler;
pub use policy::{build_whitelist, PolicyBuild};
pub use remediation::{remediate_all, OrchestrationReport, PipelineSettings, RemediationPipeline};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
