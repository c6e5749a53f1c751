//! Invocation entry point.
//!
//! `handle_batch` decodes a delivered batch, builds the whitelist, classifies
//! every record, and remediates each violating resource. Batch-level failures
//! (bad envelope, bad static policy) abort before any remediation; anything
//! that goes wrong for a single record or resource is reported in the
//! returned [`BatchSummary`].

use std::sync::Arc;
use std::time::Instant;

use flowguard_provider::{InstanceResolver, Notifier, RangeFeed, ResourceManager};
use serde_json::Value;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

use crate::batch::{decode_batch, DecodedBatch};
use crate::classifier::Classifier;
use crate::config::Config;
use crate::domain::{BatchSummary, EnrichmentStatus, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::policy::build_whitelist;
use crate::remediation::{remediate_all, PipelineSettings, RemediationPipeline};

/// Handles delivered flow-log batches against a set of providers.
#[derive(Clone)]
pub struct IncidentHandler {
    config: Config,
    resolver: Arc<dyn InstanceResolver>,
    manager: Arc<dyn ResourceManager>,
    notifier: Arc<dyn Notifier>,
    feed: Arc<dyn RangeFeed>,
}

impl IncidentHandler {
    pub fn new(
        config: Config,
        resolver: Arc<dyn InstanceResolver>,
        manager: Arc<dyn ResourceManager>,
        notifier: Arc<dyn Notifier>,
        feed: Arc<dyn RangeFeed>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            resolver,
            manager,
            notifier,
            feed,
        })
    }

    /// Use one provider for every role.
    pub fn with_provider<P>(config: Config, provider: Arc<P>) -> Result<Self>
    where
        P: InstanceResolver + ResourceManager + Notifier + RangeFeed + 'static,
    {
        Self::new(
            config,
            provider.clone(),
            provider.clone(),
            provider.clone(),
            provider,
        )
    }

    /// Replace the range feed (builder style).
    pub fn with_range_feed(mut self, feed: Arc<dyn RangeFeed>) -> Self {
        self.feed = feed;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process a raw delivery envelope.
    pub async fn handle_batch(&self, raw_event: &Value) -> Result<BatchSummary> {
        let batch = decode_batch(raw_event)?;
        self.handle_decoded(batch).await
    }

    /// Process a raw delivery envelope given as JSON text.
    pub async fn handle_batch_str(&self, raw_event: &str) -> Result<BatchSummary> {
        let batch = crate::batch::decode_batch_str(raw_event)?;
        self.handle_decoded(batch).await
    }

    /// Process an already-decoded batch.
    pub async fn handle_decoded(&self, batch: DecodedBatch) -> Result<BatchSummary> {
        let invocation_id = Uuid::new_v4();
        self.run_invocation(invocation_id, batch)
            .instrument(obs::invocation_span(&invocation_id))
            .await
    }

    async fn run_invocation(
        &self,
        invocation_id: Uuid,
        batch: DecodedBatch,
    ) -> Result<BatchSummary> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.invocation_deadline();

        obs::emit_batch_started(&invocation_id, batch.log_events.len(), self.config.dry_run);

        if batch.is_control_message() {
            debug!("Control message received, nothing to classify");
            let summary = self.empty_summary(invocation_id);
            obs::emit_batch_finished(&summary, start.elapsed().as_millis() as u64);
            METRICS.flush();
            return Ok(summary);
        }

        let policy = build_whitelist(&self.config, self.feed.as_ref()).await?;
        let fingerprint = policy.whitelist.fingerprint();
        obs::emit_policy_built(&fingerprint, policy.whitelist.len(), &policy.enrichment);

        let classifier = Classifier::new(
            Arc::new(policy.whitelist),
            Arc::clone(&self.resolver),
            self.config.call_timeout(),
            self.config.classify_concurrency,
        );
        let classified = classifier.classify_batch(&batch.log_events).await;
        let violating = classified.violating_resources();
        let unknown_interfaces = classified.unknown_interfaces();
        info!(
            violations = violating.len(),
            unknown = unknown_interfaces.len(),
            skipped = classified.skipped.len(),
            "Classification complete"
        );

        let pipeline = RemediationPipeline::new(
            Arc::clone(&self.manager),
            Arc::clone(&self.notifier),
            PipelineSettings {
                simulate: self.config.dry_run,
                notification_topic: self.config.notification_topic.clone(),
                call_timeout: self.config.call_timeout(),
            },
        );
        let report = remediate_all(
            &pipeline,
            violating,
            self.config.max_concurrent_remediations,
            deadline,
        )
        .await;

        let summary = BatchSummary {
            invocation_id,
            dry_run: self.config.dry_run,
            policy_fingerprint: fingerprint,
            enrichment: policy.enrichment,
            records_seen: batch.log_events.len(),
            remediated: report.remediated(),
            failures: report.failures(),
            unknown_interfaces,
            not_attempted: report.not_attempted,
            skipped_records: classified.skipped,
            outcomes: report.outcomes,
        };

        obs::emit_batch_finished(&summary, start.elapsed().as_millis() as u64);
        METRICS.flush();
        Ok(summary)
    }

    fn empty_summary(&self, invocation_id: Uuid) -> BatchSummary {
        BatchSummary {
            invocation_id,
            dry_run: self.config.dry_run,
            policy_fingerprint: String::new(),
            enrichment: EnrichmentStatus::Disabled,
            records_seen: 0,
            remediated: 0,
            failures: Vec::new(),
            unknown_interfaces: Vec::new(),
            not_attempted: Vec::new(),
            skipped_records: Vec::new(),
            outcomes: Vec::new(),
        }
    }
}
