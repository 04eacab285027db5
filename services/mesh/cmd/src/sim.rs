//! In-process mesh simulation.
//!
//! Every configured node is built on a shared [`ManualClock`] and wired to
//! its neighbours through [`PipeTransport`] pairs. A tokio interval drives
//! the simulation: each tick advances the clock by the poll interval and
//! polls every node's interfaces.

use crate::config::SimConfig;
use anyhow::{bail, Context, Result};
use mesh_node::{
    DiscoveryStatus, Interface, InterfaceId, ManualClock, MeshError, Node, PipeTransport,
    RandomUid, RouteEntry,
};
use mesh_wire::{Address, Message, MessageRef};
use std::sync::{Arc, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Ticks allowed for a USER message to cross the mesh
const DELIVERY_TICKS: u32 = 64;

/// Ticks allowed past the discovery timeout before giving up
const DISCOVERY_GRACE_TICKS: u32 = 64;

type Inbox = Arc<Mutex<Vec<Message>>>;

/// Outcome of a simulation run
#[derive(Debug, Clone)]
pub struct Report {
    /// Ticks until the first node finished discovery
    pub discovery_ticks: u32,
    /// Routing table of every node after discovery
    pub routes: Vec<(Address, Vec<RouteEntry>)>,
    /// The USER message as received by the last node
    pub delivered: Option<Message>,
}

/// A set of nodes connected by in-memory links
pub struct Simulation {
    config: SimConfig,
    clock: ManualClock,
    nodes: Vec<Node>,
    inboxes: Vec<Inbox>,
}

impl Simulation {
    /// Build the nodes and links described by `config`
    pub fn build(config: SimConfig) -> Result<Self> {
        config.validate()?;

        let clock = ManualClock::new(0);
        let mut nodes = Vec::with_capacity(config.nodes.len());
        let mut inboxes = Vec::with_capacity(config.nodes.len());

        for node_config in &config.nodes {
            let address = node_config.address;
            let uids = match config.seed {
                Some(seed) => RandomUid::seeded(seed.wrapping_add(u64::from(address.get()))),
                None => RandomUid::from_entropy(),
            };
            let mut node = Node::with_env(node_config.clone(), clock.clone(), uids)
                .with_context(|| format!("failed to create node {}", address))?;

            let inbox: Inbox = Arc::default();
            let sink = inbox.clone();
            node.set_handler(move |iface: InterfaceId, msg: MessageRef<'_>| {
                info!(
                    node = %address,
                    src = %msg.header.src,
                    interface = %iface,
                    payload = %String::from_utf8_lossy(msg.payload),
                    "Message received"
                );
                if let Ok(mut inbox) = sink.lock() {
                    inbox.push(msg.to_message());
                }
            });

            nodes.push(node);
            inboxes.push(inbox);
        }

        for &(a, b) in &config.links {
            let (ia, ib) = match (config.node_index(a), config.node_index(b)) {
                (Some(ia), Some(ib)) => (ia, ib),
                _ => bail!("link {} <-> {} refers to an unknown node", a, b),
            };
            let (end_a, end_b) = PipeTransport::pair(config.link_capacity);
            let id_a = attach(&mut nodes[ia], b, end_a)?;
            let id_b = attach(&mut nodes[ib], a, end_b)?;
            debug!(%a, %b, %id_a, %id_b, "Linked nodes");
        }

        Ok(Self {
            config,
            clock,
            nodes,
            inboxes,
        })
    }

    /// Simulated nodes, in configuration order
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Run discovery from the first node, then send the configured message
    /// from the first node to the last.
    pub async fn run(&mut self) -> Result<Report> {
        let step = u32::try_from(self.config.poll_interval_ms)
            .context("poll interval does not fit the node clock")?;
        let mut ticker = interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let origin = self.nodes[0].address();
        let timeout_ms = self.nodes[0].config().discovery_timeout_ms;
        let max_ticks = timeout_ms / step + DISCOVERY_GRACE_TICKS;

        info!(node = %origin, nodes = self.nodes.len(), "Starting discovery");
        let mut discovery_ticks = 0;
        loop {
            if self.nodes[0].discover()? == DiscoveryStatus::Complete {
                break;
            }
            if discovery_ticks >= max_ticks {
                bail!("discovery did not complete within {} ticks", max_ticks);
            }
            ticker.tick().await;
            self.tick(step);
            discovery_ticks += 1;
        }
        info!(node = %origin, ticks = discovery_ticks, "Discovery complete");

        let routes = self.routes();
        for (address, entries) in &routes {
            if entries.is_empty() {
                info!(node = %address, "No routes");
            }
            for entry in entries {
                info!(node = %address, route = %entry, "Route");
            }
        }

        let delivered = match self.nodes.len() {
            0 | 1 => None,
            n => self.deliver(n - 1, &mut ticker, step).await?,
        };

        Ok(Report {
            discovery_ticks,
            routes,
            delivered,
        })
    }

    async fn deliver(
        &mut self,
        last: usize,
        ticker: &mut tokio::time::Interval,
        step: u32,
    ) -> Result<Option<Message>> {
        let dst = self.nodes[last].address();
        let payload = self.config.message.clone();

        match self.nodes[0].send_user(dst, payload.as_bytes()) {
            Ok(()) => info!(%dst, len = payload.len(), "Message sent"),
            Err(MeshError::Route(err)) => {
                warn!(%dst, error = %err, "Destination unreachable");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        }

        for _ in 0..DELIVERY_TICKS {
            ticker.tick().await;
            self.tick(step);
            if let Some(msg) = self.take_delivered(last) {
                return Ok(Some(msg));
            }
        }
        warn!(%dst, ticks = DELIVERY_TICKS, "Message not delivered");
        Ok(None)
    }

    fn tick(&mut self, step: u32) {
        self.clock.advance(step);
        for node in &mut self.nodes {
            if let Err(err) = node.poll_interfaces() {
                warn!(node = %node.address(), error = %err, "Poll failed");
            }
        }
    }

    fn take_delivered(&self, index: usize) -> Option<Message> {
        self.inboxes[index]
            .lock()
            .ok()
            .and_then(|mut inbox| (!inbox.is_empty()).then(|| inbox.remove(0)))
    }

    fn routes(&self) -> Vec<(Address, Vec<RouteEntry>)> {
        self.nodes
            .iter()
            .map(|node| (node.address(), node.routes().iter().copied().collect()))
            .collect()
    }
}

fn attach(node: &mut Node, peer: Address, transport: PipeTransport) -> Result<InterfaceId> {
    let address = node.address();
    let interface = Interface::builder(format!("to-{}", peer))
        .transport(transport)
        .build()?;
    node.register_interface(interface)
        .with_context(|| format!("node {} cannot add a link to {}", address, peer))
}
