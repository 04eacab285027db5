//! Node configuration.

use crate::discovery::{DEFAULT_DISCOVERY_TIMEOUT_MS, DEFAULT_UID_CACHE_SIZE};
use crate::error::MeshError;
use crate::netif::DEFAULT_MAX_INTERFACES;
use mesh_routing::DEFAULT_MAX_NODES;
use mesh_wire::{Address, HEADER_SIZE, MAX_FRAME_SIZE};
use serde::{Deserialize, Serialize};

/// Settings for one mesh node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's address
    pub address: Address,
    /// How long a discovery round waits for responses
    pub discovery_timeout_ms: u32,
    /// Depth of the recent discovery identifier cache
    pub uid_cache_size: usize,
    /// Routing table slots; addresses at or above this are rejected
    pub max_nodes: usize,
    /// Maximum number of interfaces
    pub max_interfaces: usize,
    /// Per-interface receive and decode buffer size
    pub buffer_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: Address(1),
            discovery_timeout_ms: DEFAULT_DISCOVERY_TIMEOUT_MS,
            uid_cache_size: DEFAULT_UID_CACHE_SIZE,
            max_nodes: DEFAULT_MAX_NODES,
            max_interfaces: DEFAULT_MAX_INTERFACES,
            buffer_size: MAX_FRAME_SIZE,
        }
    }
}

impl NodeConfig {
    /// Default settings for a node at `address`
    pub fn with_address(address: Address) -> Self {
        Self {
            address,
            ..Self::default()
        }
    }

    /// Check the settings for values a node cannot run with
    pub fn validate(&self) -> Result<(), MeshError> {
        if self.address.is_reserved() {
            return Err(MeshError::BadArg(format!(
                "address {} is reserved",
                self.address
            )));
        }
        if usize::from(self.address.get()) >= self.max_nodes {
            return Err(MeshError::BadArg(format!(
                "address {} does not fit max_nodes {}",
                self.address, self.max_nodes
            )));
        }
        if self.uid_cache_size == 0 {
            return Err(MeshError::BadArg("uid_cache_size must be non-zero".into()));
        }
        if self.max_interfaces == 0 || self.max_interfaces > usize::from(u8::MAX) + 1 {
            return Err(MeshError::BadArg(format!(
                "max_interfaces must be within 1..=256, got {}",
                self.max_interfaces
            )));
        }
        if self.buffer_size < HEADER_SIZE {
            return Err(MeshError::BadArg(format!(
                "buffer_size {} is smaller than a header",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert_eq!(config.discovery_timeout_ms, 1000);
        assert_eq!(config.uid_cache_size, 4);
        assert_eq!(config.max_nodes, 64);
        assert_eq!(config.max_interfaces, 8);
        assert_eq!(config.buffer_size, MAX_FRAME_SIZE);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let cases = [
            NodeConfig::with_address(Address::BROADCAST),
            NodeConfig::with_address(Address::INVALID),
            NodeConfig::with_address(Address(64)),
            NodeConfig {
                uid_cache_size: 0,
                ..NodeConfig::default()
            },
            NodeConfig {
                max_interfaces: 0,
                ..NodeConfig::default()
            },
            NodeConfig {
                buffer_size: HEADER_SIZE - 1,
                ..NodeConfig::default()
            },
        ];
        for config in cases {
            assert!(
                matches!(config.validate(), Err(MeshError::BadArg(_))),
                "{:?}",
                config
            );
        }
    }

    #[test]
    fn test_partial_deserialize() {
        let config: NodeConfig =
            serde_json::from_str(r#"{"address": 5, "uid_cache_size": 8}"#).unwrap();
        assert_eq!(config.address, Address(5));
        assert_eq!(config.uid_cache_size, 8);
        assert_eq!(config.max_nodes, DEFAULT_MAX_NODES);
    }
}
