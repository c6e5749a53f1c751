//! End-to-end tests: delivered envelope in, batch summary out.

mod common;

use std::sync::Arc;

use common::{envelope, flow, flow_line, offline_config};
use flowguard_core::{Config, EnrichmentStatus, HandlerError, IncidentHandler, RemediationState};
use flowguard_provider::fakes::{FaultPoint, InstanceState, ProviderCall};
use flowguard_provider::{Inventory, MemoryCloud, ProviderError, ResourceId};
use serde_json::json;

#[tokio::test]
async fn test_single_violation_runs_full_pipeline() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &["vol-a"]),
    ));
    let handler = IncidentHandler::with_provider(offline_config(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![flow("eni-1", "10.0.0.5", "22")]))
        .await
        .unwrap();

    assert_eq!(summary.remediated, 1);
    assert!(summary.failures.is_empty());
    assert!(summary.unknown_interfaces.is_empty());
    assert_eq!(summary.records_seen, 1);
    assert_eq!(summary.enrichment, EnrichmentStatus::Disabled);
    assert_eq!(summary.policy_fingerprint.len(), 64);

    let outcome = &summary.outcomes[0];
    assert_eq!(outcome.resource_id, ResourceId::new("i-100"));
    assert_eq!(outcome.final_state, RemediationState::Notified);
    assert_eq!(outcome.snapshot_ids.len(), 1);

    assert_eq!(cloud.instance_state(&ResourceId::new("i-100")), Some(InstanceState::Terminated));
    assert_eq!(cloud.published().len(), 1);
}

#[tokio::test]
async fn test_allowed_traffic_touches_nothing() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &["vol-a"]),
    ));
    let handler = IncidentHandler::with_provider(offline_config(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![
            flow("eni-1", "129.6.15.28", "123"),
            flow("eni-1", "2.2.2.2", "123"),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.remediated, 0);
    assert!(summary.outcomes.is_empty());
    assert!(cloud.calls().iter().all(|c| !c.is_mutating()));
    assert_eq!(cloud.instance_state(&ResourceId::new("i-100")), Some(InstanceState::Running));
}

#[tokio::test]
async fn test_unknown_interfaces_never_reach_remediation() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &["vol-a"]),
    ));
    let handler = IncidentHandler::with_provider(offline_config(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![
            flow("eni-elb-1", "10.0.0.5", "22"),
            flow("eni-elb-2", "10.0.0.5", "22"),
            flow("eni-elb-1", "10.0.0.6", "3389"),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.unknown_interfaces, vec!["eni-elb-1", "eni-elb-2"]);
    assert_eq!(summary.remediated, 0);
    assert!(cloud
        .calls()
        .iter()
        .all(|c| matches!(c, ProviderCall::ResolveInstance { .. })));
}

#[tokio::test]
async fn test_repeated_violations_remediate_once() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1", "eni-2"], &["vol-a"]),
    ));
    let handler = IncidentHandler::with_provider(offline_config(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![
            flow("eni-1", "10.0.0.5", "22"),
            flow("eni-2", "10.0.0.6", "22"),
            flow("eni-1", "10.0.0.7", "445"),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.outcomes.len(), 1);
    let quarantines = cloud
        .calls()
        .iter()
        .filter(|c| matches!(c, ProviderCall::Quarantine { .. }))
        .count();
    assert_eq!(quarantines, 1);
}

#[tokio::test]
async fn test_raw_message_lines_are_classified() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &[]),
    ));
    let handler = IncidentHandler::with_provider(offline_config(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![flow_line("eni-1", "198.51.100.7", "6667")]))
        .await
        .unwrap();

    assert_eq!(summary.remediated, 1);
}

#[tokio::test]
async fn test_bad_records_are_skipped_not_fatal() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &[]),
    ));
    let handler = IncidentHandler::with_provider(offline_config(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![
            json!({"extractedFields": {"interface_id": "eni-1", "dstaddr": "10.0.0.5"}}),
            flow("eni-1", "not-an-address", "22"),
            flow("eni-1", "10.0.0.5", "22"),
        ]))
        .await
        .unwrap();

    assert_eq!(summary.records_seen, 3);
    let skipped: Vec<usize> = summary.skipped_records.iter().map(|s| s.index).collect();
    assert_eq!(skipped, vec![0, 1]);
    assert_eq!(summary.remediated, 1);
}

#[tokio::test]
async fn test_resolver_outage_skips_record() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &[]),
    ));
    cloud.fail(
        FaultPoint::Resolve("eni-1".into()),
        ProviderError::Transport("connection reset".into()),
    );
    let handler = IncidentHandler::with_provider(offline_config(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![flow("eni-1", "10.0.0.5", "22")]))
        .await
        .unwrap();

    assert!(summary.unknown_interfaces.is_empty());
    assert_eq!(summary.skipped_records.len(), 1);
    assert_eq!(summary.skipped_records[0].interface_id.as_deref(), Some("eni-1"));
    assert!(summary.skipped_records[0].reason.contains("connection reset"));
    assert_eq!(summary.remediated, 0);
}

#[tokio::test]
async fn test_enrichment_allows_provider_ranges() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new()
            .with_instance("i-100", &["eni-1"], &[])
            .with_range("52.94.76.0/22", "AMAZON"),
    ));
    let handler = IncidentHandler::with_provider(Config::default(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![flow("eni-1", "52.94.77.10", "443")]))
        .await
        .unwrap();

    assert_eq!(summary.remediated, 0);
    assert_eq!(
        summary.enrichment,
        EnrichmentStatus::Applied {
            ranges: 1,
            exceptions: 2
        }
    );
}

#[tokio::test]
async fn test_feed_outage_degrades_to_static_rules() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new()
            .with_instance("i-100", &["eni-1"], &[])
            .with_range("52.94.76.0/22", "AMAZON"),
    ));
    cloud.fail(FaultPoint::FetchRanges, ProviderError::Transport("dns".into()));
    let handler = IncidentHandler::with_provider(Config::default(), cloud.clone()).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![flow("eni-1", "52.94.77.10", "443")]))
        .await
        .unwrap();

    assert!(matches!(summary.enrichment, EnrichmentStatus::Degraded { .. }));
    assert_eq!(summary.remediated, 1);
}

#[tokio::test]
async fn test_fail_closed_feed_outage_aborts_before_remediation() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &[]),
    ));
    cloud.fail(FaultPoint::FetchRanges, ProviderError::Transport("dns".into()));
    let config = Config {
        fail_closed: true,
        ..Config::default()
    };
    let handler = IncidentHandler::with_provider(config, cloud.clone()).unwrap();

    let err = handler
        .handle_batch(&envelope(vec![flow("eni-1", "10.0.0.5", "22")]))
        .await
        .unwrap_err();

    assert!(matches!(err, HandlerError::Policy(_)));
    assert!(cloud.calls().iter().all(|c| !c.is_mutating()));
}

#[tokio::test]
async fn test_handle_batch_str_accepts_text() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &[]),
    ));
    let handler = IncidentHandler::with_provider(offline_config(), cloud).unwrap();
    let raw = envelope(vec![flow("eni-1", "10.0.0.5", "22")]).to_string();

    let summary = handler.handle_batch_str(&raw).await.unwrap();
    assert_eq!(summary.remediated, 1);
}

#[tokio::test]
async fn test_summary_serializes_for_the_trigger() {
    let cloud = Arc::new(MemoryCloud::new(
        Inventory::new().with_instance("i-100", &["eni-1"], &[]),
    ));
    cloud.fail(
        FaultPoint::Quarantine(ResourceId::new("i-100")),
        ProviderError::rejected("StopInstances", "IncorrectInstanceState"),
    );
    let handler = IncidentHandler::with_provider(offline_config(), cloud).unwrap();

    let summary = handler
        .handle_batch(&envelope(vec![flow("eni-1", "10.0.0.5", "22")]))
        .await
        .unwrap();
    let value: serde_json::Value =
        serde_json::from_str(&summary.to_json_pretty().unwrap()).unwrap();

    assert_eq!(value["remediated"], 0);
    assert_eq!(value["failures"][0]["resource_id"], "i-100");
    assert_eq!(value["failures"][0]["stage"], "quarantine");
    assert_eq!(value["outcomes"][0]["final_state"]["state"], "failed");
}
