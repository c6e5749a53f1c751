//! Remediation stages, states and per-resource outcomes.

use chrono::{DateTime, Utc};
use flowguard_provider::{ResourceId, SnapshotId};
use serde::{Deserialize, Serialize};

/// A step of the remediation pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Stop the instance
    Quarantine,
    /// Snapshot every attached volume
    Capture,
    /// Terminate the instance
    Destroy,
    /// Publish a summary of what was done
    Notify,
}

/// What a stage failure means for the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fatality {
    /// Stop this resource's pipeline and record it as failed.
    FatalToResource,
    /// Log and keep going.
    BestEffort,
}

impl Stage {
    /// Stages in execution order.
    pub const ORDER: [Stage; 4] = [
        Stage::Quarantine,
        Stage::Capture,
        Stage::Destroy,
        Stage::Notify,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Quarantine => "quarantine",
            Stage::Capture => "capture",
            Stage::Destroy => "destroy",
            Stage::Notify => "notify",
        }
    }

    pub fn fatality(&self) -> Fatality {
        match self {
            Stage::Quarantine | Stage::Destroy => Fatality::FatalToResource,
            Stage::Capture | Stage::Notify => Fatality::BestEffort,
        }
    }

    /// State reached when this stage completes.
    pub fn completes_to(&self) -> RemediationState {
        match self {
            Stage::Quarantine => RemediationState::Quarantined,
            Stage::Capture => RemediationState::Captured,
            Stage::Destroy => RemediationState::Destroyed,
            Stage::Notify => RemediationState::Notified,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Position of a resource in the remediation pipeline.
///
/// `Identified -> Quarantined -> Captured -> Destroyed -> Notified`, with
/// `Failed` reachable from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemediationState {
    Identified,
    Quarantined,
    Captured,
    Destroyed,
    Notified,
    Failed { stage: Stage, reason: String },
}

impl RemediationState {
    /// The stage that moves this state forward, if any.
    pub fn next_stage(&self) -> Option<Stage> {
        match self {
            RemediationState::Identified => Some(Stage::Quarantine),
            RemediationState::Quarantined => Some(Stage::Capture),
            RemediationState::Captured => Some(Stage::Destroy),
            RemediationState::Destroyed => Some(Stage::Notify),
            RemediationState::Notified | RemediationState::Failed { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next_stage().is_none()
    }

    /// The resource was destroyed (notification is best-effort).
    pub fn is_remediated(&self) -> bool {
        matches!(
            self,
            RemediationState::Destroyed | RemediationState::Notified
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            RemediationState::Identified => "identified",
            RemediationState::Quarantined => "quarantined",
            RemediationState::Captured => "captured",
            RemediationState::Destroyed => "destroyed",
            RemediationState::Notified => "notified",
            RemediationState::Failed { .. } => "failed",
        }
    }
}

/// A resource whose remediation stopped at a fatal stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationFailure {
    pub resource_id: ResourceId,
    pub stage: Stage,
    pub reason: String,
}

/// Result of running the pipeline against one resource.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationOutcome {
    pub resource_id: ResourceId,
    pub final_state: RemediationState,
    /// Snapshots created during capture, in volume order.
    pub snapshot_ids: Vec<SnapshotId>,
    /// Whether the notification was delivered.
    pub notified: bool,
    /// Whether every mutating call ran simulate-only.
    pub simulated: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RemediationOutcome {
    pub fn succeeded(&self) -> bool {
        self.final_state.is_remediated()
    }

    pub fn failure(&self) -> Option<RemediationFailure> {
        match &self.final_state {
            RemediationState::Failed { stage, reason } => Some(RemediationFailure {
                resource_id: self.resource_id.clone(),
                stage: *stage,
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64
    }
}
