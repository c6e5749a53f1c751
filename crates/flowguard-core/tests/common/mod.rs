//! Shared fixtures for flowguard-core integration tests.

#![allow(dead_code)]

use flowguard_core::{encode_envelope, Config};
use serde_json::{json, Value};

/// A log event carrying `extractedFields`.
pub fn flow(eni: &str, dst: &str, dst_port: &str) -> Value {
    json!({
        "id": format!("{}-{}-{}", eni, dst, dst_port),
        "timestamp": 1_700_000_000_000u64,
        "extractedFields": {
            "version": "2",
            "account_id": "012345678901",
            "interface_id": eni,
            "srcaddr": "10.0.0.9",
            "dstaddr": dst,
            "srcport": "49152",
            "dstport": dst_port,
            "protocol": "6",
            "action": "ACCEPT"
        }
    })
}

/// A log event carrying only the raw flow-log line.
pub fn flow_line(eni: &str, dst: &str, dst_port: &str) -> Value {
    json!({
        "message": format!(
            "2 012345678901 {} 10.0.0.9 {} 49152 {} 6 10 840 1700000000 1700000060 ACCEPT OK",
            eni, dst, dst_port
        )
    })
}

/// Wrap log events in a gzip/base64 delivery envelope.
pub fn envelope(events: Vec<Value>) -> Value {
    encode_envelope(&json!({
        "messageType": "DATA_MESSAGE",
        "owner": "012345678901",
        "logGroup": "vpc-flow-logs",
        "logStream": "eni-stream",
        "subscriptionFilters": ["flowguard"],
        "logEvents": events
    }))
    .expect("gzip into memory")
}

/// Defaults with enrichment off so no feed is consulted.
pub fn offline_config() -> Config {
    Config {
        allow_provider_enrichment: false,
        ..Config::default()
    }
}
