//! Configuration handling for the linkmesh simulator.
//!
//! The simulated topology is read from a YAML file, then overridden by
//! `LINKMESH_*` environment variables and finally by command-line flags.

use anyhow::{bail, Context, Result};
use mesh_node::NodeConfig;
use mesh_wire::Address;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "LINKMESH_";

/// Simulated mesh description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Nodes to create, in order; the first one runs discovery
    pub nodes: Vec<NodeConfig>,
    /// Links between nodes, as address pairs
    pub links: Vec<(Address, Address)>,
    /// Time between polls of every node
    pub poll_interval_ms: u64,
    /// Bytes each link direction can buffer
    pub link_capacity: usize,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// USER payload sent from the first node to the last
    pub message: String,
    /// Seed for discovery identifiers; entropy when unset
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: (1..=3).map(|a| NodeConfig::with_address(Address(a))).collect(),
            links: vec![(Address(1), Address(2)), (Address(2), Address(3))],
            poll_interval_ms: 10,
            link_capacity: 4096,
            log_level: "info".to_string(),
            message: "hello from the other end of the mesh".to_string(),
            seed: None,
        }
    }
}

impl SimConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `LINKMESH_*` overrides looked up through `lookup`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(message) = var("MESSAGE") {
            self.message = message;
        }
        if let Some(interval) = var("POLL_INTERVAL") {
            let interval = humantime::parse_duration(&interval)
                .with_context(|| format!("invalid {}POLL_INTERVAL", ENV_PREFIX))?;
            self.poll_interval_ms = interval.as_millis() as u64;
        }
        if let Some(timeout) = var("DISCOVERY_TIMEOUT_MS") {
            let timeout: u32 = timeout
                .parse()
                .with_context(|| format!("invalid {}DISCOVERY_TIMEOUT_MS", ENV_PREFIX))?;
            self.nodes
                .iter_mut()
                .for_each(|n| n.discovery_timeout_ms = timeout);
        }
        if let Some(seed) = var("SEED") {
            self.seed = Some(
                seed.parse()
                    .with_context(|| format!("invalid {}SEED", ENV_PREFIX))?,
            );
        }
        Ok(())
    }

    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Index of the node with `address`
    pub fn node_index(&self, address: Address) -> Option<usize> {
        self.nodes.iter().position(|n| n.address == address)
    }

    /// Check that the topology can be built
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            bail!("at least one node is required");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll interval must be non-zero");
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            node.validate()
                .with_context(|| format!("node {}", node.address))?;
            if !seen.insert(node.address) {
                bail!("duplicate node address {}", node.address);
            }
        }

        for (a, b) in &self.links {
            if a == b {
                bail!("link {} <-> {} connects a node to itself", a, b);
            }
            for end in [a, b] {
                if !seen.contains(end) {
                    bail!("link refers to unknown node {}", end);
                }
            }
        }
        Ok(())
    }
}
