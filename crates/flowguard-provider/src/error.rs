//! Error types for flowguard-provider

use thiserror::Error;

/// Errors returned by provider calls.
///
/// `DryRunValidated` is not a failure in the usual sense: it is the provider's
/// answer to a simulate-only request that would have succeeded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Simulate-only request validated; nothing was changed
    #[error("request would have succeeded, but simulate-only was set")]
    DryRunValidated,

    /// Target object does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Provider refused the request (bad state, permissions, quota)
    #[error("{operation} rejected: {message}")]
    Rejected { operation: String, message: String },

    /// Connection or protocol failure before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// A response was received but could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Call exceeded its time budget
    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl ProviderError {
    pub fn not_found(kind: &str, id: impl Into<String>) -> Self {
        ProviderError::NotFound {
            kind: kind.to_string(),
            id: id.into(),
        }
    }

    pub fn rejected(operation: &str, message: impl Into<String>) -> Self {
        ProviderError::Rejected {
            operation: operation.to_string(),
            message: message.into(),
        }
    }

    /// True for the provider's "validation-only" reply to a simulated call.
    pub fn is_dry_run_validated(&self) -> bool {
        matches!(self, ProviderError::DryRunValidated)
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::InvalidResponse(err.to_string())
    }
}
