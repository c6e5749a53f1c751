//! In-memory cloud (testing and offline rehearsal)
//!
//! `MemoryCloud` implements every provider trait against an [`Inventory`] of
//! instances, their interfaces and volumes. It records each call it receives,
//! never changes state for simulate-only calls, and supports per-target fault
//! injection (errors or delays).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::provider_traits::*;

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// Declarative description of an instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceSpec {
    pub id: ResourceId,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<VolumeId>,
}

/// Everything the in-memory cloud knows about at start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub instances: Vec<InstanceSpec>,
    /// Ranges served by the `RangeFeed` implementation.
    #[serde(default)]
    pub ranges: Vec<ProviderRange>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an instance with the given interfaces and volumes (builder style).
    pub fn with_instance(mut self, id: &str, interfaces: &[&str], volumes: &[&str]) -> Self {
        self.instances.push(InstanceSpec {
            id: ResourceId::new(id),
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            volumes: volumes.iter().map(|v| VolumeId::new(*v)).collect(),
        });
        self
    }

    pub fn with_range(mut self, prefix: &str, service: &str) -> Self {
        self.ranges.push(ProviderRange::new(prefix, service));
        self
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Recorded state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Running,
    Stopped,
    Terminated,
}

/// A call received by the cloud, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum ProviderCall {
    ResolveInstance { interface_id: String },
    Quarantine { resource: ResourceId, simulate: bool },
    ListVolumes { resource: ResourceId },
    Snapshot { volume: VolumeId, simulate: bool },
    Destroy { resource: ResourceId, simulate: bool },
    Publish { topic: String, subject: String, message: String },
    FetchRanges { url: String, service: String },
}

impl ProviderCall {
    /// True for calls that change infrastructure when not simulated.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            ProviderCall::Quarantine { .. }
                | ProviderCall::Snapshot { .. }
                | ProviderCall::Destroy { .. }
        )
    }

    /// The instance this call targets, if any.
    pub fn resource(&self) -> Option<&ResourceId> {
        match self {
            ProviderCall::Quarantine { resource, .. }
            | ProviderCall::ListVolumes { resource }
            | ProviderCall::Destroy { resource, .. } => Some(resource),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRecord {
    pub id: SnapshotId,
    pub volume: VolumeId,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedMessage {
    pub topic: String,
    pub subject: String,
    pub message: String,
}

/// Where a fault is injected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Resolve(String),
    Quarantine(ResourceId),
    ListVolumes(ResourceId),
    Snapshot(VolumeId),
    Destroy(ResourceId),
    Publish,
    FetchRanges,
}

#[derive(Debug, Clone)]
enum Fault {
    Fail(ProviderError),
    Delay(Duration),
}

/// How simulate-only mutating calls are answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DryRunReply {
    /// Answer with `ProviderError::DryRunValidated`, as real providers do.
    #[default]
    Validated,
    /// Answer with a plain success (and a synthetic snapshot id).
    Succeed,
}

#[derive(Debug)]
struct InstanceRecord {
    state: InstanceState,
    volumes: Vec<VolumeId>,
}

#[derive(Debug, Default)]
struct CloudState {
    instances: BTreeMap<ResourceId, InstanceRecord>,
    interfaces: HashMap<String, ResourceId>,
    ranges: Vec<ProviderRange>,
    snapshots: Vec<SnapshotRecord>,
    published: Vec<PublishedMessage>,
    calls: Vec<ProviderCall>,
    faults: HashMap<FaultPoint, Fault>,
    dry_run_reply: DryRunReply,
    next_snapshot: u64,
}

// ---------------------------------------------------------------------------
// MemoryCloud
// ---------------------------------------------------------------------------

/// In-memory provider backed by a `Mutex<CloudState>`.
#[derive(Debug, Default)]
pub struct MemoryCloud {
    state: Mutex<CloudState>,
}

impl MemoryCloud {
    pub fn new(inventory: Inventory) -> Self {
        let mut state = CloudState {
            ranges: inventory.ranges,
            ..CloudState::default()
        };
        for instance in inventory.instances {
            for eni in instance.interfaces {
                state.interfaces.insert(eni, instance.id.clone());
            }
            state.instances.insert(
                instance.id,
                InstanceRecord {
                    state: InstanceState::Running,
                    volumes: instance.volumes,
                },
            );
        }
        Self {
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every call at `point` fail with `error`.
    pub fn fail(&self, point: FaultPoint, error: ProviderError) {
        self.lock().faults.insert(point, Fault::Fail(error));
    }

    /// Make every call at `point` sleep for `delay` before being served.
    pub fn delay(&self, point: FaultPoint, delay: Duration) {
        self.lock().faults.insert(point, Fault::Delay(delay));
    }

    pub fn set_dry_run_reply(&self, reply: DryRunReply) {
        self.lock().dry_run_reply = reply;
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    /// Calls that targeted `resource`.
    pub fn calls_for(&self, resource: &ResourceId) -> Vec<ProviderCall> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.resource() == Some(resource))
            .cloned()
            .collect()
    }

    pub fn instance_state(&self, id: &ResourceId) -> Option<InstanceState> {
        self.lock().instances.get(id).map(|r| r.state)
    }

    pub fn snapshots(&self) -> Vec<SnapshotRecord> {
        self.lock().snapshots.clone()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// Record `call` and apply any fault registered at `point`.
    async fn enter(&self, call: ProviderCall, point: FaultPoint) -> ProviderResult<()> {
        let fault = {
            let mut state = self.lock();
            state.calls.push(call);
            state.faults.get(&point).cloned()
        };
        match fault {
            Some(Fault::Fail(err)) => Err(err),
            Some(Fault::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn simulated_reply<T>(&self, ok: T) -> ProviderResult<T> {
        match self.lock().dry_run_reply {
            DryRunReply::Validated => Err(ProviderError::DryRunValidated),
            DryRunReply::Succeed => Ok(ok),
        }
    }
}

#[async_trait]
impl InstanceResolver for MemoryCloud {
    async fn resolve_instance(&self, interface_id: &str) -> ProviderResult<Resolution> {
        self.enter(
            ProviderCall::ResolveInstance {
                interface_id: interface_id.to_string(),
            },
            FaultPoint::Resolve(interface_id.to_string()),
        )
        .await?;

        Ok(match self.lock().interfaces.get(interface_id) {
            Some(id) => Resolution::Instance(id.clone()),
            None => Resolution::NotFound,
        })
    }
}

#[async_trait]
impl ResourceManager for MemoryCloud {
    async fn quarantine(&self, id: &ResourceId, simulate: bool) -> ProviderResult<()> {
        self.enter(
            ProviderCall::Quarantine {
                resource: id.clone(),
                simulate,
            },
            FaultPoint::Quarantine(id.clone()),
        )
        .await?;

        {
            let state = self.lock();
            let record = state
                .instances
                .get(id)
                .ok_or_else(|| ProviderError::not_found("instance", id.as_str()))?;
            if record.state == InstanceState::Terminated {
                return Err(ProviderError::rejected(
                    "StopInstances",
                    format!("instance {} is terminated", id),
                ));
            }
        }

        if simulate {
            return self.simulated_reply(());
        }

        if let Some(record) = self.lock().instances.get_mut(id) {
            record.state = InstanceState::Stopped;
        }
        Ok(())
    }

    async fn list_volumes(&self, id: &ResourceId) -> ProviderResult<Vec<VolumeId>> {
        self.enter(
            ProviderCall::ListVolumes {
                resource: id.clone(),
            },
            FaultPoint::ListVolumes(id.clone()),
        )
        .await?;

        self.lock()
            .instances
            .get(id)
            .map(|r| r.volumes.clone())
            .ok_or_else(|| ProviderError::not_found("instance", id.as_str()))
    }

    async fn snapshot(
        &self,
        volume: &VolumeId,
        description: &str,
        simulate: bool,
    ) -> ProviderResult<SnapshotId> {
        self.enter(
            ProviderCall::Snapshot {
                volume: volume.clone(),
                simulate,
            },
            FaultPoint::Snapshot(volume.clone()),
        )
        .await?;

        let known = self
            .lock()
            .instances
            .values()
            .any(|r| r.volumes.contains(volume));
        if !known {
            return Err(ProviderError::not_found("volume", volume.as_str()));
        }

        if simulate {
            return self.simulated_reply(SnapshotId::new(format!("dryrun-{}", volume)));
        }

        let mut state = self.lock();
        state.next_snapshot += 1;
        let id = SnapshotId::new(format!("snap-{:08x}", state.next_snapshot));
        state.snapshots.push(SnapshotRecord {
            id: id.clone(),
            volume: volume.clone(),
            description: description.to_string(),
        });
        Ok(id)
    }

    async fn destroy(&self, id: &ResourceId, simulate: bool) -> ProviderResult<()> {
        self.enter(
            ProviderCall::Destroy {
                resource: id.clone(),
                simulate,
            },
            FaultPoint::Destroy(id.clone()),
        )
        .await?;

        if !self.lock().instances.contains_key(id) {
            return Err(ProviderError::not_found("instance", id.as_str()));
        }

        if simulate {
            return self.simulated_reply(());
        }

        if let Some(record) = self.lock().instances.get_mut(id) {
            record.state = InstanceState::Terminated;
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for MemoryCloud {
    async fn publish(&self, topic: &str, subject: &str, message: &str) -> ProviderResult<()> {
        self.enter(
            ProviderCall::Publish {
                topic: topic.to_string(),
                subject: subject.to_string(),
                message: message.to_string(),
            },
            FaultPoint::Publish,
        )
        .await?;

        self.lock().published.push(PublishedMessage {
            topic: topic.to_string(),
            subject: subject.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl RangeFeed for MemoryCloud {
    async fn fetch_ranges(&self, url: &str, service: &str) -> ProviderResult<Vec<ProviderRange>> {
        self.enter(
            ProviderCall::FetchRanges {
                url: url.to_string(),
                service: service.to_string(),
            },
            FaultPoint::FetchRanges,
        )
        .await?;

        Ok(self.lock().ranges.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud() -> MemoryCloud {
        MemoryCloud::new(Inventory::new().with_instance("i-100", &["eni-1"], &["vol-1"]))
    }

    #[tokio::test]
    async fn test_simulated_quarantine_leaves_instance_running() {
        let cloud = cloud();
        let id = ResourceId::new("i-100");
        let err = cloud.quarantine(&id, true).await.unwrap_err();

        assert!(err.is_dry_run_validated());
        assert_eq!(cloud.instance_state(&id), Some(InstanceState::Running));
    }

    #[tokio::test]
    async fn test_fault_is_recorded_before_failing() {
        let cloud = cloud();
        let id = ResourceId::new("i-100");
        cloud.fail(
            FaultPoint::Destroy(id.clone()),
            ProviderError::Transport("reset".into()),
        );

        assert!(cloud.destroy(&id, false).await.is_err());
        assert_eq!(
            cloud.calls(),
            vec![ProviderCall::Destroy {
                resource: id.clone(),
                simulate: false
            }]
        );
        assert_eq!(cloud.instance_state(&id), Some(InstanceState::Running));
    }

    #[test]
    fn test_inventory_from_json() {
        let inv = Inventory::from_json(
            r#"{"instances":[{"id":"i-1","interfaces":["eni-a"],"volumes":["vol-a","vol-b"]}]}"#,
        )
        .unwrap();
        assert_eq!(inv.instances.len(), 1);
        assert_eq!(inv.instances[0].volumes.len(), 2);
        assert!(inv.ranges.is_empty());
    }
}
