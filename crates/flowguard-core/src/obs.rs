//! Structured observability hooks for flowguard invocations.
//!
//! This module provides:
//! - Invocation-scoped tracing spans via [`invocation_span`]
//! - Emission functions for decision and lifecycle events
//!
//! Every function logs with a stable `event = "..."` field so audit queries
//! do not depend on message wording. `flow.classified` is the per-record
//! decision trail and is always emitted at `info!`.

use flowguard_provider::ResourceId;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{BatchSummary, EnrichmentStatus, FlowEvent, RemediationState, Stage};

/// Span covering one invocation. Attach it with `Instrument::instrument` so
/// every event inside carries `invocation_id`.
///
/// ```ignore
/// async { /* ... */ }.instrument(invocation_span(&invocation_id)).await
/// ```
pub fn invocation_span(invocation_id: &Uuid) -> tracing::Span {
    tracing::info_span!("flowguard.invocation", invocation_id = %invocation_id)
}

pub fn emit_batch_started(invocation_id: &Uuid, records: usize, dry_run: bool) {
    info!(
        event = "batch.started",
        invocation_id = %invocation_id,
        records = records,
        dry_run = dry_run,
    );
}

pub fn emit_policy_built(fingerprint: &str, rules: usize, enrichment: &EnrichmentStatus) {
    let enrichment = match enrichment {
        EnrichmentStatus::Disabled => "disabled",
        EnrichmentStatus::Applied { .. } => "applied",
        EnrichmentStatus::Degraded { .. } => "degraded",
    };
    info!(
        event = "policy.built",
        fingerprint = %fingerprint,
        rules = rules,
        enrichment = enrichment,
    );
}

/// Warn that the range feed failed and only static rules are in force.
pub fn emit_enrichment_degraded(error: &dyn std::fmt::Display) {
    warn!(
        event = "policy.enrichment_degraded",
        error = %error,
        "range feed unavailable, continuing with static exceptions only"
    );
}

/// Audit line for one classification decision.
pub fn emit_flow_classified(flow: &FlowEvent) {
    info!(
        event = "flow.classified",
        resource_id = flow.resource_id().map(|r| r.as_str()).unwrap_or("-"),
        interface_id = %flow.interface_id(),
        src = %flow.source(),
        dst = %flow.destination(),
        verdict = %flow.verdict(),
    );
}

pub fn emit_record_skipped(index: usize, reason: &dyn std::fmt::Display) {
    warn!(event = "flow.skipped", index = index, reason = %reason);
}

pub fn emit_stage_completed(resource_id: &ResourceId, stage: Stage, state: &RemediationState) {
    info!(
        event = "remediation.stage_completed",
        resource_id = %resource_id,
        stage = %stage,
        state = state.name(),
    );
}

/// A stage call failed. `fatal` says whether the resource's pipeline stops.
pub fn emit_stage_failed(
    resource_id: &ResourceId,
    stage: Stage,
    fatal: bool,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "remediation.stage_failed",
        resource_id = %resource_id,
        stage = %stage,
        fatal = fatal,
        error = %error,
    );
}

pub fn emit_not_attempted(resource_id: &ResourceId) {
    warn!(
        event = "remediation.not_attempted",
        resource_id = %resource_id,
        "invocation deadline passed before remediation started"
    );
}

pub fn emit_task_aborted(resource_id: &ResourceId, stage: Stage, error: &dyn std::fmt::Display) {
    error!(
        event = "remediation.task_aborted",
        resource_id = %resource_id,
        stage = %stage,
        error = %error,
        "remediation task aborted"
    );
}

pub fn emit_batch_finished(summary: &BatchSummary, duration_ms: u64) {
    info!(
        event = "batch.finished",
        invocation_id = %summary.invocation_id,
        remediated = summary.remediated,
        failures = summary.failures.len(),
        unknown_interfaces = summary.unknown_interfaces.len(),
        not_attempted = summary.not_attempted.len(),
        skipped_records = summary.skipped_records.len(),
        duration_ms = duration_ms,
    );
}
