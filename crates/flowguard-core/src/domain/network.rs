//! Allow-rules and the whitelist they form.
//!
//! A [`NetworkException`] allows traffic to one destination prefix on one
//! port. A [`Whitelist`] allows a destination when *any* of its exceptions
//! does; rule order never changes the answer.

use std::net::IpAddr;

use ipnetwork::IpNetwork;
use sha2::{Digest, Sha256};

use super::error::NetworkError;

/// One allowed destination: a network prefix and an exact port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkException {
    network: IpNetwork,
    cidr: String,
    port_number: u16,
    port: String,
}

impl NetworkException {
    /// Build an exception from a CIDR string and a port.
    ///
    /// The port is stored in canonical decimal form, so `"0443"` and `"443"`
    /// produce the same rule.
    pub fn new(cidr: &str, port: &str) -> Result<Self, NetworkError> {
        let network = cidr
            .trim()
            .parse::<IpNetwork>()
            .map_err(|e| NetworkError::InvalidPrefix {
                input: cidr.to_string(),
                reason: e.to_string(),
            })?;
        let port_number = canonical_port(port).ok_or_else(|| NetworkError::InvalidPort {
            input: port.to_string(),
        })?;

        Ok(Self {
            network,
            cidr: network.to_string(),
            port_number,
            port: port_number.to_string(),
        })
    }

    pub fn cidr(&self) -> &str {
        &self.cidr
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// True if `address` lies within the prefix and `port` matches exactly.
    ///
    /// Both ports are compared in canonical decimal form; a port that is not
    /// a number never matches.
    pub fn allows(&self, address: IpAddr, port: &str) -> bool {
        canonical_port(port) == Some(self.port_number) && self.network.contains(address)
    }
}

fn canonical_port(port: &str) -> Option<u16> {
    port.trim().parse::<u16>().ok()
}

impl std::fmt::Display for NetworkException {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.cidr, self.port)
    }
}

/// Parse a textual IP address, reporting malformed input as an error.
pub fn parse_address(address: &str) -> Result<IpAddr, NetworkError> {
    address
        .trim()
        .parse::<IpAddr>()
        .map_err(|e| NetworkError::InvalidAddress {
            input: address.to_string(),
            reason: e.to_string(),
        })
}

/// The allow-list for one invocation.
///
/// Built once, then shared read-only between classification tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    exceptions: Vec<NetworkException>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_exception(&mut self, exception: NetworkException) {
        self.exceptions.push(exception);
    }

    pub fn add_exceptions<I>(&mut self, exceptions: I)
    where
        I: IntoIterator<Item = NetworkException>,
    {
        self.exceptions.extend(exceptions);
    }

    pub fn len(&self) -> usize {
        self.exceptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exceptions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkException> {
        self.exceptions.iter()
    }

    /// Membership test on textual input.
    ///
    /// A malformed address is an error, never a silent "not allowed".
    pub fn contains(&self, address: &str, port: &str) -> Result<bool, NetworkError> {
        let addr = parse_address(address)?;
        Ok(self.contains_addr(addr, port))
    }

    /// Membership test on a parsed address. Every rule is considered.
    pub fn contains_addr(&self, address: IpAddr, port: &str) -> bool {
        self.exceptions.iter().any(|e| e.allows(address, port))
    }

    /// First exception that allows the destination, for audit logging.
    pub fn matching_exception(&self, address: IpAddr, port: &str) -> Option<&NetworkException> {
        self.exceptions.iter().find(|e| e.allows(address, port))
    }

    /// SHA-256 over the rules in order, as lowercase hex.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for exception in &self.exceptions {
            hasher.update(exception.cidr.as_bytes());
            hasher.update(b"|");
            hasher.update(exception.port.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

impl FromIterator<NetworkException> for Whitelist {
    fn from_iter<I: IntoIterator<Item = NetworkException>>(iter: I) -> Self {
        Self {
            exceptions: iter.into_iter().collect(),
        }
    }
}
