//! Provider contract definitions for flowguard
//!
//! These traits are the only way the core touches infrastructure:
//! - `InstanceResolver`: network interface -> compute instance lookup
//! - `ResourceManager`: stop / volume listing / snapshot / terminate
//! - `Notifier`: publish a human-readable message to a topic
//! - `RangeFeed`: third-party published network ranges
//!
//! All traits are async and backend-agnostic. An in-memory implementation is
//! provided by the `fakes` module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// Result type for provider calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }
    };
}

string_id!(
    /// Stable identifier of a compute instance (e.g. `i-0abc`)
    ResourceId
);
string_id!(
    /// Identifier of a storage volume attached to an instance
    VolumeId
);
string_id!(
    /// Identifier of a point-in-time volume snapshot
    SnapshotId
);

// ---------------------------------------------------------------------------
// InstanceResolver
// ---------------------------------------------------------------------------

/// Outcome of resolving a network interface.
///
/// `NotFound` is ordinary input (load balancer or managed interfaces have no
/// instance attachment) and is never reported through `ProviderError`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "resource_id", rename_all = "snake_case")]
pub enum Resolution {
    Instance(ResourceId),
    NotFound,
}

impl Resolution {
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Resolution::Instance(id) => Some(id),
            Resolution::NotFound => None,
        }
    }
}

#[async_trait]
pub trait InstanceResolver: Send + Sync {
    /// Look up the instance a network interface is attached to.
    async fn resolve_instance(&self, interface_id: &str) -> ProviderResult<Resolution>;
}

// ---------------------------------------------------------------------------
// ResourceManager
// ---------------------------------------------------------------------------

/// Instance lifecycle operations.
///
/// Every mutating call takes `simulate`. When set, the implementation must not
/// change any real state; it may answer with `ProviderError::DryRunValidated`
/// to say the request would have succeeded.
#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Stop (quarantine) the instance.
    async fn quarantine(&self, id: &ResourceId, simulate: bool) -> ProviderResult<()>;

    /// List volumes attached to the instance.
    async fn list_volumes(&self, id: &ResourceId) -> ProviderResult<Vec<VolumeId>>;

    /// Snapshot a single volume.
    async fn snapshot(
        &self,
        volume: &VolumeId,
        description: &str,
        simulate: bool,
    ) -> ProviderResult<SnapshotId>;

    /// Terminate the instance.
    async fn destroy(&self, id: &ResourceId, simulate: bool) -> ProviderResult<()>;
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> ProviderResult<()>;
}

// ---------------------------------------------------------------------------
// RangeFeed
// ---------------------------------------------------------------------------

/// One published network range and the service it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRange {
    pub prefix: String,
    pub service: String,
}

impl ProviderRange {
    pub fn new(prefix: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            service: service.into(),
        }
    }
}

#[async_trait]
pub trait RangeFeed: Send + Sync {
    /// Fetch ranges for `service` from `url`.
    ///
    /// Implementations may return ranges for other services too; callers
    /// filter by service name.
    async fn fetch_ranges(&self, url: &str, service: &str) -> ProviderResult<Vec<ProviderRange>>;
}
