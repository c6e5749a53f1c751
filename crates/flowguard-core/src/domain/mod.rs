//! Domain models for flowguard.
//!
//! Canonical definitions for the core entities:
//! - `NetworkException` / `Whitelist`: the allow policy
//! - `FlowRecord` / `FlowEvent`: observed and classified traffic
//! - `RemediationState` / `RemediationOutcome`: per-resource remediation
//! - `BatchSummary`: what one invocation decided and did

pub mod error;
pub mod flow;
pub mod network;
pub mod remediation;
pub mod summary;

// Re-export main types and errors
pub use error::{
    BatchDecodeError, ClassifyError, ConfigError, HandlerError, NetworkError, PolicyError, Result,
};
pub use flow::{Endpoint, FlowEvent, FlowRecord, Verdict};
pub use network::{parse_address, NetworkException, Whitelist};
pub use remediation::{Fatality, RemediationFailure, RemediationOutcome, RemediationState, Stage};
pub use summary::{BatchSummary, EnrichmentStatus, SkippedRecord};
