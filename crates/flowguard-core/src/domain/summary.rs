//! Invocation summary returned to the trigger.

use flowguard_provider::ResourceId;
use serde::Serialize;
use uuid::Uuid;

use super::remediation::{RemediationFailure, RemediationOutcome};

/// How the provider range feed contributed to the whitelist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnrichmentStatus {
    Disabled,
    Applied { ranges: usize, exceptions: usize },
    /// Feed failed; only static exceptions are in force.
    Degraded { reason: String },
}

/// A batch record that was not classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedRecord {
    /// Position in the batch's `logEvents`.
    pub index: usize,
    pub interface_id: Option<String>,
    pub reason: String,
}

/// Everything an invocation decided and did.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub invocation_id: Uuid,
    pub dry_run: bool,
    pub policy_fingerprint: String,
    pub enrichment: EnrichmentStatus,
    pub records_seen: usize,
    /// Resources that reached `Destroyed` (or `Notified`).
    pub remediated: usize,
    pub failures: Vec<RemediationFailure>,
    /// Interfaces with no instance attached, first-seen order, deduplicated.
    pub unknown_interfaces: Vec<String>,
    /// Violating resources left untouched because the deadline passed.
    pub not_attempted: Vec<ResourceId>,
    pub skipped_records: Vec<SkippedRecord>,
    pub outcomes: Vec<RemediationOutcome>,
}

impl BatchSummary {
    /// One-line human summary.
    pub fn headline(&self) -> String {
        format!(
            "Remediated {} instance(s); {} failure(s); {} unknown interface(s){}",
            self.remediated,
            self.failures.len(),
            self.unknown_interfaces.len(),
            if self.dry_run { " [dry run]" } else { "" }
        )
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty() -> BatchSummary {
        BatchSummary {
            invocation_id: Uuid::new_v4(),
            dry_run: true,
            policy_fingerprint: "ab".repeat(32),
            enrichment: EnrichmentStatus::Disabled,
            records_seen: 0,
            remediated: 0,
            failures: vec![],
            unknown_interfaces: vec![],
            not_attempted: vec![],
            skipped_records: vec![],
            outcomes: vec![],
        }
    }

    #[test]
    fn test_headline_marks_dry_run() {
        let summary = empty();
        assert_eq!(
            summary.headline(),
            "Remediated 0 instance(s); 0 failure(s); 0 unknown interface(s) [dry run]"
        );
    }

    #[test]
    fn test_enrichment_status_serializes_tagged() {
        let json = serde_json::to_value(EnrichmentStatus::Degraded {
            reason: "timeout".to_string(),
        })
        .unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["reason"], "timeout");
    }
}
