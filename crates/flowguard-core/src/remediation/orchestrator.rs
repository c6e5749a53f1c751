//! Bounded parallel remediation across a batch of violating resources.
//!
//! Each resource gets its own task; a semaphore caps how many pipelines run
//! at once. A resource whose pipeline has not started by the invocation
//! deadline is reported as not attempted. Started pipelines always run to a
//! terminal state; a task that dies mid-pipeline is recorded as failed at the
//! stage it was executing.

use std::sync::Arc;

use chrono::Utc;
use flowguard_provider::ResourceId;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{instrument, Instrument};

use crate::domain::{RemediationFailure, RemediationOutcome, RemediationState, Stage};
use crate::metrics::METRICS;
use crate::obs;

use super::pipeline::{RemediationPipeline, StageTracker};

/// Aggregate result of remediating a batch.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationReport {
    /// Outcomes in input order.
    pub outcomes: Vec<RemediationOutcome>,
    pub not_attempted: Vec<ResourceId>,
}

impl OrchestrationReport {
    /// Resources that reached `Destroyed` or `Notified`.
    pub fn remediated(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failures(&self) -> Vec<RemediationFailure> {
        self.outcomes.iter().filter_map(|o| o.failure()).collect()
    }
}

enum Slot {
    Ran(RemediationOutcome),
    NotAttempted(ResourceId),
}

/// Remediate every resource in `resources`, at most `max_concurrent` at a time.
///
/// `resources` should already be deduplicated.
#[instrument(skip_all, fields(resources = resources.len(), max_concurrent = max_concurrent))]
pub async fn remediate_all(
    pipeline: &RemediationPipeline,
    resources: Vec<ResourceId>,
    max_concurrent: usize,
    deadline: Instant,
) -> OrchestrationReport {
    let sem = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut tasks = Vec::with_capacity(resources.len());

    for resource_id in resources {
        let pipeline = pipeline.clone();
        let sem = Arc::clone(&sem);
        let tracker = StageTracker::default();
        let task_tracker = tracker.clone();
        let task_resource = resource_id.clone();

        let task = tokio::spawn(
            async move {
                let _permit = sem.acquire_owned().await.ok();

                if Instant::now() >= deadline {
                    obs::emit_not_attempted(&task_resource);
                    return Slot::NotAttempted(task_resource);
                }
                Slot::Ran(pipeline.run_tracked(&task_resource, &task_tracker).await)
            }
            .in_current_span(),
        );
        tasks.push((resource_id, tracker, task));
    }

    let simulated = pipeline.settings().simulate;
    let mut report = OrchestrationReport::default();
    for (resource_id, tracker, task) in tasks {
        match task.await {
            Ok(Slot::Ran(outcome)) => report.outcomes.push(outcome),
            Ok(Slot::NotAttempted(resource_id)) => report.not_attempted.push(resource_id),
            Err(e) => report
                .outcomes
                .push(aborted_outcome(resource_id, tracker.in_flight(), simulated, &e)),
        }
    }
    report
}

/// Outcome for a resource whose task panicked or was cancelled.
///
/// Dying in notify leaves the resource destroyed; dying in any earlier stage
/// is a failure at that stage.
fn aborted_outcome(
    resource_id: ResourceId,
    in_flight: Option<Stage>,
    simulated: bool,
    err: &JoinError,
) -> RemediationOutcome {
    let stage = in_flight.unwrap_or(Stage::Quarantine);
    obs::emit_task_aborted(&resource_id, stage, err);

    let final_state = if stage == Stage::Notify {
        METRICS.inc_remediated();
        RemediationState::Destroyed
    } else {
        METRICS.inc_failures();
        RemediationState::Failed {
            stage,
            reason: format!("remediation task aborted: {}", err),
        }
    };
    let now = Utc::now();
    RemediationOutcome {
        resource_id,
        final_state,
        snapshot_ids: Vec::new(),
        notified: false,
        simulated,
        started_at: now,
        finished_at: now,
    }
}
