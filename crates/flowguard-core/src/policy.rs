//! Whitelist construction for one invocation.
//!
//! Static exceptions from configuration always apply; a malformed one fails
//! construction. Provider-published ranges are added on top when enrichment
//! is enabled. If the feed cannot be used, the invocation continues on static
//! rules alone unless `fail_closed` is set.

use std::time::Duration;

use flowguard_provider::{ProviderError, ProviderRange, RangeFeed};
use tracing::{debug, info};

use crate::config::{Config, ExceptionConfig};
use crate::domain::{EnrichmentStatus, NetworkError, NetworkException, PolicyError, Whitelist};
use crate::obs;

/// The whitelist for an invocation and how it was assembled.
#[derive(Debug, Clone)]
pub struct PolicyBuild {
    pub whitelist: Whitelist,
    pub enrichment: EnrichmentStatus,
}

/// Build a whitelist from static configuration only.
pub fn static_whitelist(exceptions: &[ExceptionConfig]) -> Result<Whitelist, NetworkError> {
    exceptions.iter().map(ExceptionConfig::to_exception).collect()
}

/// One exception per (prefix, port) for ranges belonging to `service`.
pub fn exceptions_from_ranges(
    ranges: &[ProviderRange],
    service: &str,
    ports: &[String],
) -> Result<Vec<NetworkException>, NetworkError> {
    let mut exceptions = Vec::new();
    for range in ranges.iter().filter(|r| r.service == service) {
        for port in ports {
            exceptions.push(NetworkException::new(&range.prefix, port)?);
        }
    }
    Ok(exceptions)
}

#[derive(Debug)]
enum FeedFailure {
    Provider(ProviderError),
    BadRange(NetworkError),
}

impl std::fmt::Display for FeedFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedFailure::Provider(e) => write!(f, "{}", e),
            FeedFailure::BadRange(e) => write!(f, "feed returned {}", e),
        }
    }
}

async fn fetch_enrichment(
    config: &Config,
    feed: &dyn RangeFeed,
    timeout: Duration,
) -> Result<(usize, Vec<NetworkException>), FeedFailure> {
    let fetch = feed.fetch_ranges(&config.enrichment_feed_url, &config.enrichment_service_name);
    let ranges = tokio::time::timeout(timeout, fetch)
        .await
        .map_err(|_| {
            FeedFailure::Provider(ProviderError::Timeout {
                operation: "fetch_ranges".to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        })?
        .map_err(FeedFailure::Provider)?;

    let matching = ranges
        .iter()
        .filter(|r| r.service == config.enrichment_service_name)
        .count();
    let exceptions = exceptions_from_ranges(
        &ranges,
        &config.enrichment_service_name,
        &config.enrichment_ports,
    )
    .map_err(FeedFailure::BadRange)?;

    Ok((matching, exceptions))
}

/// Build the invocation's whitelist.
pub async fn build_whitelist(
    config: &Config,
    feed: &dyn RangeFeed,
) -> Result<PolicyBuild, PolicyError> {
    let mut whitelist = static_whitelist(&config.static_exceptions)?;
    debug!(rules = whitelist.len(), "Loaded static exceptions");

    if !config.allow_provider_enrichment {
        return Ok(PolicyBuild {
            whitelist,
            enrichment: EnrichmentStatus::Disabled,
        });
    }

    // Configured ports are validated up front; a bad one is a configuration
    // error, not a feed failure.
    for port in &config.enrichment_ports {
        NetworkException::new("0.0.0.0/0", port)?;
    }

    let enrichment = match fetch_enrichment(config, feed, config.call_timeout()).await {
        Ok((ranges, exceptions)) => {
            info!(
                service = %config.enrichment_service_name,
                ranges = ranges,
                exceptions = exceptions.len(),
                "Adding provider endpoints to exceptions"
            );
            let added = exceptions.len();
            whitelist.add_exceptions(exceptions);
            EnrichmentStatus::Applied {
                ranges,
                exceptions: added,
            }
        }
        Err(failure) if config.fail_closed => {
            return Err(PolicyError::FeedUnavailable(failure.to_string()));
        }
        Err(failure) => {
            obs::emit_enrichment_degraded(&failure);
            EnrichmentStatus::Degraded {
                reason: failure.to_string(),
            }
        }
    };

    Ok(PolicyBuild {
        whitelist,
        enrichment,
    })
}
