//! Domain-level error taxonomy for flowguard.

use flowguard_provider::ProviderError;

/// Errors produced while parsing network prefixes and addresses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NetworkError {
    #[error("invalid network prefix {input:?}: {reason}")]
    InvalidPrefix { input: String, reason: String },

    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    #[error("invalid port {input:?}")]
    InvalidPort { input: String },
}

/// Errors produced while decoding a delivered batch envelope.
///
/// Any of these aborts the invocation before classification starts.
#[derive(Debug, thiserror::Error)]
pub enum BatchDecodeError {
    #[error("batch envelope missing field: {0}")]
    MissingField(&'static str),

    #[error("batch payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("batch payload is not valid gzip: {0}")]
    Gzip(#[source] std::io::Error),

    #[error("batch payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single record could not be classified. The record is skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("malformed record: {0}")]
    InvalidNetwork(#[from] NetworkError),

    #[error("could not resolve interface {interface_id}: {source}")]
    Resolver {
        interface_id: String,
        #[source]
        source: ProviderError,
    },
}

/// Errors produced while building the whitelist for an invocation.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("static exception rejected: {0}")]
    InvalidNetworkFormat(#[from] NetworkError),

    #[error("range feed unavailable and fail-closed is set: {0}")]
    FeedUnavailable(String),
}

/// Configuration loading and validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Errors that fail a whole invocation.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("batch decode error: {0}")]
    BatchDecode(#[from] BatchDecodeError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for invocation-level operations.
pub type Result<T> = std::result::Result<T, HandlerError>;
