//! Flow records and classified flow events.

use flowguard_provider::ResourceId;
use serde::{Deserialize, Serialize};

/// One observed connection, as delivered by the flow log.
///
/// All fields are kept as the strings the log carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    pub interface_id: String,
    pub src_addr: String,
    pub src_port: String,
    pub dst_addr: String,
    pub dst_port: String,
}

impl FlowRecord {
    pub fn source(&self) -> Endpoint {
        Endpoint::new(&self.src_addr, &self.src_port)
    }

    pub fn destination(&self) -> Endpoint {
        Endpoint::new(&self.dst_addr, &self.dst_port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub addr: String,
    pub port: String,
}

impl Endpoint {
    pub fn new(addr: &str, port: &str) -> Self {
        Self {
            addr: addr.to_string(),
            port: port.to_string(),
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Classification of a flow event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Interface is not attached to any instance.
    Unknown,
    /// Destination is on the whitelist.
    Allowed,
    /// Destination is not on the whitelist.
    Violation,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Unknown => "unknown",
            Verdict::Allowed => "allowed",
            Verdict::Violation => "violation",
        };
        f.write_str(s)
    }
}

/// A classified flow record.
///
/// Fields are private: the verdict is fixed at construction, and `Unknown`
/// holds exactly when no resource id was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowEvent {
    interface_id: String,
    source: Endpoint,
    destination: Endpoint,
    resource_id: Option<ResourceId>,
    verdict: Verdict,
}

impl FlowEvent {
    /// Event for an interface with no instance attached.
    pub fn unknown(record: &FlowRecord) -> Self {
        Self {
            interface_id: record.interface_id.clone(),
            source: record.source(),
            destination: record.destination(),
            resource_id: None,
            verdict: Verdict::Unknown,
        }
    }

    /// Event for a resolved interface, allowed or not.
    pub fn resolved(record: &FlowRecord, resource_id: ResourceId, allowed: bool) -> Self {
        Self {
            interface_id: record.interface_id.clone(),
            source: record.source(),
            destination: record.destination(),
            resource_id: Some(resource_id),
            verdict: if allowed {
                Verdict::Allowed
            } else {
                Verdict::Violation
            },
        }
    }

    pub fn interface_id(&self) -> &str {
        &self.interface_id
    }

    pub fn source(&self) -> &Endpoint {
        &self.source
    }

    pub fn destination(&self) -> &Endpoint {
        &self.destination
    }

    pub fn resource_id(&self) -> Option<&ResourceId> {
        self.resource_id.as_ref()
    }

    pub fn verdict(&self) -> Verdict {
        self.verdict
    }

    pub fn is_violation(&self) -> bool {
        self.verdict == Verdict::Violation
    }
}

impl std::fmt::Display for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Instance:{}\tInterface:{}\tSrc:{}\tDst:{}\tVerdict:{}",
            self.resource_id.as_ref().map(|r| r.as_str()).unwrap_or("-"),
            self.interface_id,
            self.source,
            self.destination,
            self.verdict
        )
    }
}
