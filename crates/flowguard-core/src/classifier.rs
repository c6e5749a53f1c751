//! Flow classification.
//!
//! Each record is parsed, its interface resolved to an instance, and the
//! destination checked against the whitelist. Records are independent, so a
//! batch is classified concurrently against a shared read-only whitelist.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use flowguard_provider::{InstanceResolver, ProviderError, Resolution, ResourceId};
use futures::stream::{self, StreamExt};
use serde_json::Value;

use crate::batch::{interface_hint, parse_record};
use crate::domain::{
    parse_address, ClassifyError, FlowEvent, FlowRecord, SkippedRecord, Whitelist,
};
use crate::metrics::METRICS;
use crate::obs;

/// Classify one parsed record.
///
/// An unattached interface yields `Verdict::Unknown`. A resolver failure is an
/// error: it says nothing about whether the interface is attached.
pub async fn classify(
    record: &FlowRecord,
    whitelist: &Whitelist,
    resolver: &dyn InstanceResolver,
    call_timeout: Duration,
) -> Result<FlowEvent, ClassifyError> {
    if record.interface_id.is_empty() {
        return Err(ClassifyError::MalformedRecord(
            "empty interface_id".to_string(),
        ));
    }
    let dst = parse_address(&record.dst_addr)?;

    let lookup = resolver.resolve_instance(&record.interface_id);
    let resolution = tokio::time::timeout(call_timeout, lookup)
        .await
        .map_err(|_| ProviderError::Timeout {
            operation: "resolve_instance".to_string(),
            timeout_ms: call_timeout.as_millis() as u64,
        })
        .and_then(|r| r)
        .map_err(|source| ClassifyError::Resolver {
            interface_id: record.interface_id.clone(),
            source,
        })?;

    let event = match resolution {
        Resolution::NotFound => FlowEvent::unknown(record),
        Resolution::Instance(resource_id) => {
            let allowed = whitelist.contains_addr(dst, &record.dst_port);
            FlowEvent::resolved(record, resource_id, allowed)
        }
    };

    obs::emit_flow_classified(&event);
    METRICS.inc_records_classified();
    if event.is_violation() {
        METRICS.inc_violations();
    }
    Ok(event)
}

/// Events and skipped records from one batch, in batch order.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedBatch {
    pub events: Vec<FlowEvent>,
    pub skipped: Vec<SkippedRecord>,
}

impl ClassifiedBatch {
    /// Violating resources, deduplicated, first-seen order.
    pub fn violating_resources(&self) -> Vec<ResourceId> {
        let mut seen = HashSet::new();
        self.events
            .iter()
            .filter(|e| e.is_violation())
            .filter_map(|e| e.resource_id())
            .filter(|id| seen.insert((*id).clone()))
            .cloned()
            .collect()
    }

    /// Interfaces with no instance attached, deduplicated, first-seen order.
    pub fn unknown_interfaces(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.events
            .iter()
            .filter(|e| e.resource_id().is_none())
            .map(|e| e.interface_id().to_string())
            .filter(|id| seen.insert(id.clone()))
            .collect()
    }
}

/// Classifies batches against a fixed whitelist and resolver.
#[derive(Clone)]
pub struct Classifier {
    whitelist: Arc<Whitelist>,
    resolver: Arc<dyn InstanceResolver>,
    call_timeout: Duration,
    concurrency: usize,
}

impl Classifier {
    pub fn new(
        whitelist: Arc<Whitelist>,
        resolver: Arc<dyn InstanceResolver>,
        call_timeout: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            whitelist,
            resolver,
            call_timeout,
            concurrency: concurrency.max(1),
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    /// Parse and classify one raw log event.
    pub async fn classify_event(&self, event: &Value) -> Result<FlowEvent, ClassifyError> {
        let record = parse_record(event)?;
        classify(&record, &self.whitelist, self.resolver.as_ref(), self.call_timeout).await
    }

    /// Classify every log event; failures are collected, not propagated.
    pub async fn classify_batch(&self, log_events: &[Value]) -> ClassifiedBatch {
        let mut results: Vec<(usize, Result<FlowEvent, ClassifyError>)> =
            stream::iter(log_events.iter().enumerate())
                .map(|(index, event)| async move { (index, self.classify_event(event).await) })
                .buffer_unordered(self.concurrency)
                .collect()
                .await;
        results.sort_by_key(|(index, _)| *index);

        let mut batch = ClassifiedBatch::default();
        for (index, result) in results {
            match result {
                Ok(event) => batch.events.push(event),
                Err(err) => {
                    obs::emit_record_skipped(index, &err);
                    batch.skipped.push(SkippedRecord {
                        index,
                        interface_id: interface_hint(&log_events[index]),
                        reason: err.to_string(),
                    });
                }
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NetworkException, Verdict};
    use flowguard_provider::fakes::{FaultPoint, ProviderCall};
    use flowguard_provider::{Inventory, MemoryCloud};
    use serde_json::json;
    use tracing_test::traced_test;

    fn whitelist() -> Whitelist {
        vec![NetworkException::new("0.0.0.0/0", "123").unwrap()]
            .into_iter()
            .collect()
    }

    fn cloud() -> MemoryCloud {
        MemoryCloud::new(Inventory::new().with_instance("i-100", &["eni-1"], &["vol-1"]))
    }

    fn record(eni: &str, dst: &str, port: &str) -> FlowRecord {
        FlowRecord {
            interface_id: eni.to_string(),
            src_addr: "10.0.0.9".to_string(),
            src_port: "50000".to_string(),
            dst_addr: dst.to_string(),
            dst_port: port.to_string(),
        }
    }

    fn fields(eni: &str, dst: &str, port: &str) -> Value {
        json!({"extractedFields": {
            "interface_id": eni, "srcaddr": "10.0.0.9", "srcport": "50000",
            "dstaddr": dst, "dstport": port
        }})
    }

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn test_disallowed_destination_is_violation() {
        let event = classify(&record("eni-1", "10.0.0.5", "22"), &whitelist(), &cloud(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(event.verdict(), Verdict::Violation);
        assert_eq!(event.resource_id().map(|r| r.as_str()), Some("i-100"));
    }

    #[tokio::test]
    async fn test_allowed_destination() {
        let record = record("eni-1", "129.6.15.28", "123");
        let event = classify(&record, &whitelist(), &cloud(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(event.verdict(), Verdict::Allowed);
    }

    #[tokio::test]
    async fn test_unattached_interface_is_unknown() {
        let event = classify(&record("eni-elb", "10.0.0.5", "22"), &whitelist(), &cloud(), TIMEOUT)
            .await
            .unwrap();
        assert_eq!(event.verdict(), Verdict::Unknown);
        assert!(event.resource_id().is_none());
    }

    #[tokio::test]
    async fn test_resolver_outage_is_not_unknown() {
        let cloud = cloud();
        cloud.fail(
            FaultPoint::Resolve("eni-1".into()),
            ProviderError::Transport("throttled".into()),
        );
        let err = classify(&record("eni-1", "10.0.0.5", "22"), &whitelist(), &cloud, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::Resolver { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolver_timeout_is_error() {
        let cloud = cloud();
        cloud.delay(FaultPoint::Resolve("eni-1".into()), Duration::from_secs(60));
        let err = classify(&record("eni-1", "10.0.0.5", "22"), &whitelist(), &cloud, TIMEOUT)
            .await
            .unwrap_err();
        match err {
            ClassifyError::Resolver { source, .. } => {
                assert!(matches!(source, ProviderError::Timeout { .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_destination_skips_resolver() {
        let cloud = cloud();
        let err = classify(&record("eni-1", "10.0.0.999", "22"), &whitelist(), &cloud, TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidNetwork(_)));
        assert!(cloud.calls().is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_decision_is_logged() {
        classify(&record("eni-1", "10.0.0.5", "22"), &whitelist(), &cloud(), TIMEOUT)
            .await
            .unwrap();
        assert!(logs_contain("flow.classified"));
        assert!(logs_contain("i-100"));
        assert!(logs_contain("violation"));
    }

    #[tokio::test]
    async fn test_batch_partitions_and_dedupes() {
        let cloud = Arc::new(MemoryCloud::new(
            Inventory::new()
                .with_instance("i-100", &["eni-1"], &[])
                .with_instance("i-200", &["eni-2"], &[]),
        ));
        let classifier = Classifier::new(Arc::new(whitelist()), cloud.clone(), TIMEOUT, 4);

        let events = vec![
            fields("eni-1", "10.0.0.5", "22"),
            fields("eni-elb", "10.0.0.5", "443"),
            json!({"extractedFields": {"interface_id": "eni-9"}}),
            fields("eni-1", "10.0.0.6", "3389"),
            fields("eni-2", "8.8.8.8", "123"),
            fields("eni-elb", "10.0.0.7", "443"),
        ];
        let batch = classifier.classify_batch(&events).await;

        assert_eq!(batch.events.len(), 5);
        assert_eq!(batch.violating_resources(), vec![ResourceId::new("i-100")]);
        assert_eq!(batch.unknown_interfaces(), vec!["eni-elb".to_string()]);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].index, 2);
        assert_eq!(batch.skipped[0].interface_id.as_deref(), Some("eni-9"));

        let resolves = cloud
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ProviderCall::ResolveInstance { .. }))
            .count();
        assert_eq!(resolves, 5);
    }
}
