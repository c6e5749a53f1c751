//! Per-resource remediation state machine.
//!
//! Stages run strictly in order. Quarantine and destroy failures stop the
//! resource's pipeline; capture and notify failures are logged and skipped.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use flowguard_provider::{
    Notifier, ProviderError, ProviderResult, ResourceId, ResourceManager, SnapshotId,
};
use tracing::{debug, info};

use crate::domain::{Fatality, RemediationOutcome, RemediationState, Stage};
use crate::metrics::METRICS;
use crate::obs;

/// Subject line of every remediation notification.
pub const NOTIFICATION_SUBJECT: &str = "flowguard has terminated an instance";

/// Settings shared by every resource in a batch.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Pass `simulate = true` to every mutating call.
    pub simulate: bool,
    pub notification_topic: String,
    /// Bound on each provider call.
    pub call_timeout: Duration,
}

/// Records the stage a pipeline is executing, readable after its task dies.
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    in_flight: Arc<Mutex<Option<Stage>>>,
}

impl StageTracker {
    fn enter(&self, stage: Stage) {
        *self.in_flight.lock().unwrap_or_else(|p| p.into_inner()) = Some(stage);
    }

    /// The stage most recently entered, if the pipeline got that far.
    pub fn in_flight(&self) -> Option<Stage> {
        *self.in_flight.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Runs the remediation stages for one resource at a time.
#[derive(Clone)]
pub struct RemediationPipeline {
    manager: Arc<dyn ResourceManager>,
    notifier: Arc<dyn Notifier>,
    settings: PipelineSettings,
}

impl RemediationPipeline {
    pub fn new(
        manager: Arc<dyn ResourceManager>,
        notifier: Arc<dyn Notifier>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            manager,
            notifier,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Drive `resource_id` from `Identified` to a terminal state.
    pub async fn run(&self, resource_id: &ResourceId) -> RemediationOutcome {
        self.run_tracked(resource_id, &StageTracker::default()).await
    }

    /// Like [`run`](Self::run), reporting each stage to `tracker` as it starts.
    pub async fn run_tracked(
        &self,
        resource_id: &ResourceId,
        tracker: &StageTracker,
    ) -> RemediationOutcome {
        let started_at = Utc::now();
        info!(
            resource_id = %resource_id,
            simulate = self.settings.simulate,
            "Remediating instance"
        );

        let mut state = RemediationState::Identified;
        let mut snapshot_ids = Vec::new();
        let mut notified = false;

        while let Some(stage) = state.next_stage() {
            tracker.enter(stage);
            let result = match stage {
                Stage::Quarantine => self.quarantine(resource_id).await,
                Stage::Capture => {
                    snapshot_ids = self.capture(resource_id).await;
                    Ok(())
                }
                Stage::Destroy => self.destroy(resource_id).await,
                Stage::Notify => self.notify(resource_id, &snapshot_ids).await,
            };

            match result {
                Ok(()) => {
                    state = stage.completes_to();
                    notified |= stage == Stage::Notify;
                    obs::emit_stage_completed(resource_id, stage, &state);
                }
                Err(err) => match stage.fatality() {
                    Fatality::FatalToResource => {
                        obs::emit_stage_failed(resource_id, stage, true, &err);
                        state = RemediationState::Failed {
                            stage,
                            reason: err.to_string(),
                        };
                    }
                    Fatality::BestEffort => {
                        obs::emit_stage_failed(resource_id, stage, false, &err);
                        // Notify is the last stage; the resource stays Destroyed.
                        if stage == Stage::Notify {
                            break;
                        }
                        state = stage.completes_to();
                    }
                },
            }
        }

        if state.is_remediated() {
            METRICS.inc_remediated();
        } else {
            METRICS.inc_failures();
        }
        if !self.settings.simulate {
            METRICS.add_snapshots(snapshot_ids.len() as u64);
        }

        RemediationOutcome {
            resource_id: resource_id.clone(),
            final_state: state,
            snapshot_ids,
            notified,
            simulated: self.settings.simulate,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn quarantine(&self, resource_id: &ResourceId) -> ProviderResult<()> {
        let simulate = self.settings.simulate;
        let result = self
            .bounded("quarantine", self.manager.quarantine(resource_id, simulate))
            .await;
        self.accept_dry_run(result, ())
    }

    /// Snapshot every attached volume. Never fails the resource.
    async fn capture(&self, resource_id: &ResourceId) -> Vec<SnapshotId> {
        let volumes = match self
            .bounded("list_volumes", self.manager.list_volumes(resource_id))
            .await
        {
            Ok(volumes) => volumes,
            Err(err) => {
                obs::emit_stage_failed(resource_id, Stage::Capture, false, &err);
                return Vec::new();
            }
        };
        debug!(resource_id = %resource_id, volumes = volumes.len(), "Capturing volumes");

        let description = snapshot_description(resource_id);
        let mut snapshot_ids = Vec::with_capacity(volumes.len());
        for volume in &volumes {
            let result = self
                .bounded(
                    "snapshot",
                    self.manager
                        .snapshot(volume, &description, self.settings.simulate),
                )
                .await;
            let synthetic = SnapshotId::new(format!("dryrun-{}", volume));
            match self.accept_dry_run(result, synthetic) {
                Ok(snapshot_id) => {
                    info!(
                        resource_id = %resource_id,
                        volume_id = %volume,
                        snapshot_id = %snapshot_id,
                        "Snapshot created"
                    );
                    snapshot_ids.push(snapshot_id);
                }
                Err(err) => {
                    let error = format!("volume {}: {}", volume, err);
                    obs::emit_stage_failed(resource_id, Stage::Capture, false, &error);
                }
            }
        }
        snapshot_ids
    }

    async fn destroy(&self, resource_id: &ResourceId) -> ProviderResult<()> {
        let simulate = self.settings.simulate;
        let result = self
            .bounded("destroy", self.manager.destroy(resource_id, simulate))
            .await;
        self.accept_dry_run(result, ())
    }

    async fn notify(
        &self,
        resource_id: &ResourceId,
        snapshot_ids: &[SnapshotId],
    ) -> ProviderResult<()> {
        let message = notification_message(resource_id, snapshot_ids, self.settings.simulate);
        self.bounded(
            "publish",
            self.notifier
                .publish(&self.settings.notification_topic, NOTIFICATION_SUBJECT, &message),
        )
        .await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = ProviderResult<T>>,
    ) -> ProviderResult<T> {
        let timeout = self.settings.call_timeout;
        tokio::time::timeout(timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Timeout {
                    operation: operation.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            })
    }

    /// In simulate mode a validation-only reply counts as success.
    fn accept_dry_run<T>(&self, result: ProviderResult<T>, simulated: T) -> ProviderResult<T> {
        match result {
            Err(err) if self.settings.simulate && err.is_dry_run_validated() => Ok(simulated),
            other => other,
        }
    }
}

pub fn snapshot_description(resource_id: &ResourceId) -> String {
    format!("Snapshot for instance {} made by flowguard", resource_id)
}

/// Human-readable notification body naming the resource and its snapshots.
pub fn notification_message(
    resource_id: &ResourceId,
    snapshot_ids: &[SnapshotId],
    simulated: bool,
) -> String {
    let snapshots = if snapshot_ids.is_empty() {
        "No snapshots created.".to_string()
    } else {
        let ids: Vec<&str> = snapshot_ids.iter().map(|s| s.as_str()).collect();
        format!("Snapshots created: {}.", ids.join(", "))
    };
    let prefix = if simulated { "[dry run] " } else { "" };
    format!("{}Instance {} has been terminated. {}", prefix, resource_id, snapshots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowguard_provider::fakes::{DryRunReply, FaultPoint, InstanceState, ProviderCall};
    use flowguard_provider::{Inventory, MemoryCloud, VolumeId};

    fn settings(simulate: bool) -> PipelineSettings {
        PipelineSettings {
            simulate,
            notification_topic: "topic-1".to_string(),
            call_timeout: Duration::from_secs(10),
        }
    }

    fn setup(simulate: bool) -> (Arc<MemoryCloud>, RemediationPipeline) {
        let cloud = Arc::new(MemoryCloud::new(Inventory::new().with_instance(
            "i-100",
            &["eni-1"],
            &["vol-1", "vol-2", "vol-3"],
        )));
        let pipeline = RemediationPipeline::new(cloud.clone(), cloud.clone(), settings(simulate));
        (cloud, pipeline)
    }

    fn id() -> ResourceId {
        ResourceId::new("i-100")
    }

    #[tokio::test]
    async fn test_full_pipeline_reaches_notified() {
        let (cloud, pipeline) = setup(false);
        let outcome = pipeline.run(&id()).await;

        assert_eq!(outcome.final_state, RemediationState::Notified);
        assert!(outcome.succeeded());
        assert!(outcome.notified);
        assert_eq!(outcome.snapshot_ids.len(), 3);
        assert_eq!(cloud.instance_state(&id()), Some(InstanceState::Terminated));

        let published = cloud.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "topic-1");
        assert_eq!(published[0].subject, NOTIFICATION_SUBJECT);
        assert!(published[0].message.contains("i-100"));
        assert!(published[0].message.contains(outcome.snapshot_ids[2].as_str()));
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let (cloud, pipeline) = setup(false);
        pipeline.run(&id()).await;

        let kinds: Vec<&'static str> = cloud
            .calls()
            .iter()
            .map(|c| match c {
                ProviderCall::Quarantine { .. } => "quarantine",
                ProviderCall::ListVolumes { .. } => "list_volumes",
                ProviderCall::Snapshot { .. } => "snapshot",
                ProviderCall::Destroy { .. } => "destroy",
                ProviderCall::Publish { .. } => "publish",
                _ => "other",
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "quarantine",
                "list_volumes",
                "snapshot",
                "snapshot",
                "snapshot",
                "destroy",
                "publish",
            ]
        );
    }

    #[tokio::test]
    async fn test_quarantine_failure_is_fatal() {
        let (cloud, pipeline) = setup(false);
        cloud.fail(
            FaultPoint::Quarantine(id()),
            ProviderError::rejected("StopInstances", "UnauthorizedOperation"),
        );
        let outcome = pipeline.run(&id()).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Quarantine);
        assert!(failure.reason.contains("UnauthorizedOperation"));
        assert_eq!(cloud.calls().len(), 1);
        assert_eq!(cloud.instance_state(&id()), Some(InstanceState::Running));
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_skipped() {
        let (cloud, pipeline) = setup(false);
        cloud.fail(
            FaultPoint::Snapshot(VolumeId::new("vol-2")),
            ProviderError::rejected("CreateSnapshot", "SnapshotLimitExceeded"),
        );
        let outcome = pipeline.run(&id()).await;

        assert!(outcome.succeeded());
        let volumes: Vec<VolumeId> = cloud.snapshots().into_iter().map(|s| s.volume).collect();
        assert_eq!(volumes, vec![VolumeId::new("vol-1"), VolumeId::new("vol-3")]);
        assert_eq!(outcome.snapshot_ids.len(), 2);
    }

    #[tokio::test]
    async fn test_list_volumes_failure_captures_nothing() {
        let (cloud, pipeline) = setup(false);
        cloud.fail(
            FaultPoint::ListVolumes(id()),
            ProviderError::Transport("reset".into()),
        );
        let outcome = pipeline.run(&id()).await;

        assert!(outcome.succeeded());
        assert!(outcome.snapshot_ids.is_empty());
        assert!(cloud.published()[0].message.contains("No snapshots created"));
    }

    #[tokio::test]
    async fn test_destroy_failure_is_fatal() {
        let (cloud, pipeline) = setup(false);
        cloud.fail(
            FaultPoint::Destroy(id()),
            ProviderError::rejected("TerminateInstances", "OperationNotPermitted"),
        );
        let outcome = pipeline.run(&id()).await;

        assert_eq!(outcome.failure().map(|f| f.stage), Some(Stage::Destroy));
        assert_eq!(outcome.snapshot_ids.len(), 3);
        assert!(cloud.published().is_empty());
    }

    #[tokio::test]
    async fn test_notify_failure_keeps_destroyed() {
        let (cloud, pipeline) = setup(false);
        cloud.fail(FaultPoint::Publish, ProviderError::Transport("sns down".into()));
        let outcome = pipeline.run(&id()).await;

        assert_eq!(outcome.final_state, RemediationState::Destroyed);
        assert!(outcome.succeeded());
        assert!(!outcome.notified);
    }

    #[tokio::test]
    async fn test_simulate_leaves_state_untouched() {
        let (cloud, pipeline) = setup(true);
        let outcome = pipeline.run(&id()).await;

        assert_eq!(outcome.final_state, RemediationState::Notified);
        assert!(outcome.simulated);
        assert_eq!(
            outcome.snapshot_ids,
            vec![
                SnapshotId::new("dryrun-vol-1"),
                SnapshotId::new("dryrun-vol-2"),
                SnapshotId::new("dryrun-vol-3"),
            ]
        );
        assert_eq!(cloud.instance_state(&id()), Some(InstanceState::Running));
        assert!(cloud.snapshots().is_empty());
        assert!(cloud.calls().iter().all(|c| match c {
            ProviderCall::Quarantine { simulate, .. }
            | ProviderCall::Snapshot { simulate, .. }
            | ProviderCall::Destroy { simulate, .. } => *simulate,
            _ => true,
        }));
        assert!(cloud.published()[0].message.starts_with("[dry run]"));
    }

    #[tokio::test]
    async fn test_simulate_accepts_plain_success() {
        let (cloud, pipeline) = setup(true);
        cloud.set_dry_run_reply(DryRunReply::Succeed);
        let outcome = pipeline.run(&id()).await;

        assert!(outcome.succeeded());
        assert_eq!(outcome.snapshot_ids[0], SnapshotId::new("dryrun-vol-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_timeout_fails_stage() {
        let (cloud, pipeline) = setup(false);
        cloud.delay(FaultPoint::Destroy(id()), Duration::from_secs(60));
        let outcome = pipeline.run(&id()).await;

        let failure = outcome.failure().unwrap();
        assert_eq!(failure.stage, Stage::Destroy);
        assert!(failure.reason.contains("timed out"));
    }

    #[test]
    fn test_notification_message() {
        let msg = notification_message(
            &ResourceId::new("i-1"),
            &[SnapshotId::new("snap-1"), SnapshotId::new("snap-2")],
            false,
        );
        assert_eq!(
            msg,
            "Instance i-1 has been terminated. Snapshots created: snap-1, snap-2."
        );
    }
}
