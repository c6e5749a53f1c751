//! Flowguard-Provider: Cloud Provider Contracts for flowguard
//!
//! This crate defines the boundary between incident-response logic and the
//! infrastructure it acts on. The core never talks to a cloud API directly;
//! it only calls the traits defined here.
//!
//! ## Layer 0 - Provider Contracts
//!
//! Focus: explicit result types per external call, so that "not attached" and
//! "provider outage" can never be confused.
//!
//! ## Key Components
//!
//! - `InstanceResolver`, `ResourceManager`, `Notifier`, `RangeFeed`: provider traits
//! - `HttpRangeFeed`: range feed over HTTP
//! - `MemoryCloud`: in-memory implementation of every trait

mod error;
pub mod fakes;
pub mod http_feed;
pub mod provider_traits;

pub use error::ProviderError;
pub use fakes::{Inventory, MemoryCloud};
pub use http_feed::HttpRangeFeed;
pub use provider_traits::{
    InstanceResolver, Notifier, ProviderRange, ProviderResult, RangeFeed, Resolution, ResourceId,
    ResourceManager, SnapshotId, VolumeId,
};
