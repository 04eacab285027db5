//! Next hop definitions

use mesh_wire::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a local interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterfaceId(pub u8);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// A route to one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Destination address
    pub address: Address,
    /// Interface the destination is reached through
    pub interface: InterfaceId,
    /// Hop count, when known
    pub hops: Option<u8>,
}

impl RouteEntry {
    /// Create a route with an unknown hop count
    pub fn new(address: Address, interface: InterfaceId) -> Self {
        Self {
            address,
            interface,
            hops: None,
        }
    }

    /// Create a route with a known hop count
    pub fn with_hops(address: Address, interface: InterfaceId, hops: u8) -> Self {
        Self {
            address,
            interface,
            hops: Some(hops),
        }
    }
}

impl fmt::Display for RouteEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hops {
            Some(hops) => write!(f, "{} via {} ({} hops)", self.address, self.interface, hops),
            None => write!(f, "{} via {}", self.address, self.interface),
        }
    }
}
