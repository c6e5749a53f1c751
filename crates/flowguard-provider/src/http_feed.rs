//! HTTP range feed client
//!
//! Fetches a published ip-ranges document and turns it into
//! [`ProviderRange`] entries for a single service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::provider_traits::{ProviderRange, ProviderResult, RangeFeed};

#[derive(Debug, Deserialize)]
struct RangeDocument {
    #[serde(default)]
    prefixes: Vec<Ipv4Entry>,
    #[serde(default)]
    ipv6_prefixes: Vec<Ipv6Entry>,
}

#[derive(Debug, Deserialize)]
struct Ipv4Entry {
    ip_prefix: String,
    service: String,
}

#[derive(Debug, Deserialize)]
struct Ipv6Entry {
    ipv6_prefix: String,
    service: String,
}

/// Parse a range document body and keep entries for `service`.
pub fn parse_range_document(
    body: &str,
    service: &str,
    include_ipv6: bool,
) -> ProviderResult<Vec<ProviderRange>> {
    let doc: RangeDocument = serde_json::from_str(body)?;

    let mut ranges: Vec<ProviderRange> = doc
        .prefixes
        .into_iter()
        .filter(|entry| entry.service == service)
        .map(|entry| ProviderRange::new(entry.ip_prefix, entry.service))
        .collect();

    if include_ipv6 {
        ranges.extend(
            doc.ipv6_prefixes
                .into_iter()
                .filter(|entry| entry.service == service)
                .map(|entry| ProviderRange::new(entry.ipv6_prefix, entry.service)),
        );
    }

    Ok(ranges)
}

/// Range feed backed by a plain HTTP GET.
pub struct HttpRangeFeed {
    http_client: reqwest::Client,
    include_ipv6: bool,
}

impl HttpRangeFeed {
    /// Create a feed client whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("flowguard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(HttpRangeFeed {
            http_client,
            include_ipv6: false,
        })
    }

    /// Also return `ipv6_prefixes` entries.
    pub fn with_ipv6(mut self, include_ipv6: bool) -> Self {
        self.include_ipv6 = include_ipv6;
        self
    }
}

#[async_trait]
impl RangeFeed for HttpRangeFeed {
    async fn fetch_ranges(&self, url: &str, service: &str) -> ProviderResult<Vec<ProviderRange>> {
        info!(url = %url, service = %service, "Fetching provider ranges");

        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ProviderError::InvalidResponse(format!(
                "range feed returned status {}",
                status
            )));
        }

        let body = response.text().await?;
        let ranges = parse_range_document(&body, service, self.include_ipv6)?;
        debug!(count = ranges.len(), "Parsed provider ranges");
        Ok(ranges)
    }
}
