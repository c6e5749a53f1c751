//! Log-delivery envelope decoding.
//!
//! A subscription delivers `{"awslogs": {"data": "<base64 gzip json>"}}`.
//! The decoded JSON carries `logEvents`; each event holds either
//! `extractedFields` or the raw flow-log line in `message`.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{BatchDecodeError, ClassifyError, FlowRecord};

/// Message type the delivery service sends to check the destination is reachable.
pub const CONTROL_MESSAGE: &str = "CONTROL_MESSAGE";

/// Decoded batch. Individual log events stay as raw JSON so that one bad
/// record can be skipped without failing the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedBatch {
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub log_group: Option<String>,
    #[serde(default)]
    pub log_stream: Option<String>,
    pub log_events: Vec<Value>,
}

impl DecodedBatch {
    pub fn is_control_message(&self) -> bool {
        self.message_type.as_deref() == Some(CONTROL_MESSAGE)
    }
}

/// Decode a raw delivery envelope.
pub fn decode_batch(raw: &Value) -> Result<DecodedBatch, BatchDecodeError> {
    let data = raw
        .get("awslogs")
        .ok_or(BatchDecodeError::MissingField("awslogs"))?
        .get("data")
        .and_then(Value::as_str)
        .ok_or(BatchDecodeError::MissingField("awslogs.data"))?;

    let compressed = STANDARD.decode(data.trim())?;

    let mut json = Vec::new();
    GzDecoder::new(compressed.as_slice())
        .read_to_end(&mut json)
        .map_err(BatchDecodeError::Gzip)?;

    Ok(serde_json::from_slice(&json)?)
}

/// Decode a raw delivery envelope given as text.
pub fn decode_batch_str(raw: &str) -> Result<DecodedBatch, BatchDecodeError> {
    let value: Value = serde_json::from_str(raw)?;
    decode_batch(&value)
}

/// Wrap a decoded batch document into a delivery envelope.
pub fn encode_envelope(batch: &Value) -> std::io::Result<Value> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(batch.to_string().as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(serde_json::json!({ "awslogs": { "data": STANDARD.encode(compressed) } }))
}

/// Interface id of a log event, if one can be found. Used for reporting
/// records that fail to parse.
pub fn interface_hint(event: &Value) -> Option<String> {
    if let Some(fields) = event.get("extractedFields") {
        return field(fields, "interface_id");
    }
    event
        .get("message")
        .and_then(Value::as_str)
        .and_then(|m| m.split_whitespace().nth(2))
        .map(str::to_string)
}

/// Parse the mandatory fields of one log event.
pub fn parse_record(event: &Value) -> Result<FlowRecord, ClassifyError> {
    if let Some(fields) = event.get("extractedFields") {
        return Ok(FlowRecord {
            interface_id: required(fields, "interface_id")?,
            src_addr: required(fields, "srcaddr")?,
            src_port: required(fields, "srcport")?,
            dst_addr: required(fields, "dstaddr")?,
            dst_port: required(fields, "dstport")?,
        });
    }

    match event.get("message").and_then(Value::as_str) {
        Some(message) => parse_flow_line(message),
        None => Err(ClassifyError::MalformedRecord(
            "log event has neither extractedFields nor message".to_string(),
        )),
    }
}

/// Parse a default-format flow-log line:
/// `version account-id interface-id srcaddr dstaddr srcport dstport protocol ...`
pub fn parse_flow_line(line: &str) -> Result<FlowRecord, ClassifyError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 7 {
        return Err(ClassifyError::MalformedRecord(format!(
            "flow log line has {} fields, expected at least 7",
            parts.len()
        )));
    }

    let pick = |idx: usize, name: &str| -> Result<String, ClassifyError> {
        match parts[idx] {
            "-" => Err(ClassifyError::MalformedRecord(format!("missing field: {}", name))),
            v => Ok(v.to_string()),
        }
    };

    Ok(FlowRecord {
        interface_id: pick(2, "interface_id")?,
        src_addr: pick(3, "srcaddr")?,
        dst_addr: pick(4, "dstaddr")?,
        src_port: pick(5, "srcport")?,
        dst_port: pick(6, "dstport")?,
    })
}

fn field(fields: &Value, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) if !s.is_empty() && s != "-" => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required(fields: &Value, name: &str) -> Result<String, ClassifyError> {
    field(fields, name)
        .ok_or_else(|| ClassifyError::MalformedRecord(format!("missing field: {}", name)))
}
