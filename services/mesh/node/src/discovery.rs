//! Route discovery.
//!
//! A discovering node floods a DISCOVERY request carrying a fresh [`Uid`].
//! Every node that sees the request for the first time answers on the link
//! it arrived on and floods it further. Responses travel back along the
//! links the request came in on, teaching each node on the way a route to
//! the responder.
//!
//! Loops are cut by a small ring of recently seen identifiers: a request
//! whose identifier is cached is ignored, and a response is only forwarded
//! towards the link its request was first seen on.

use crate::env::{Uid, UidSource};
use crate::error::MeshError;
use crate::netif::InterfaceRegistry;
use mesh_routing::{InterfaceId, RoutingTable};
use mesh_wire::{Address, MessageBuilder, MessageRef};
use tracing::{debug, info, warn};

/// Default number of cached discovery identifiers
pub const DEFAULT_UID_CACHE_SIZE: usize = 4;

/// Default time to wait for responses, in milliseconds
pub const DEFAULT_DISCOVERY_TIMEOUT_MS: u32 = 1000;

/// Where a discovery identifier was first seen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// This node started the round
    Local,
    /// The request arrived on this interface
    Interface(InterfaceId),
}

/// Fixed-size ring of recently seen identifiers
#[derive(Debug, Clone)]
pub struct UidCache {
    entries: Vec<Option<(Uid, Origin)>>,
    next: usize,
}

impl UidCache {
    /// Create a cache remembering `capacity` identifiers
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: vec![None; capacity],
            next: 0,
        }
    }

    /// Where `uid` was first seen, if it is still cached
    pub fn lookup(&self, uid: &Uid) -> Option<Origin> {
        self.entries
            .iter()
            .flatten()
            .find(|(cached, _)| cached == uid)
            .map(|(_, origin)| *origin)
    }

    /// Remember `uid`, overwriting the oldest entry when full
    pub fn insert(&mut self, uid: Uid, origin: Origin) {
        if self.entries.is_empty() {
            return;
        }
        self.entries[self.next] = Some((uid, origin));
        self.next = (self.next + 1) % self.entries.len();
    }

    /// Number of cached identifiers
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    /// True when nothing is cached
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of cached identifiers
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|e| *e = None);
        self.next = 0;
    }
}

/// Discovery round states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryState {
    /// No round in progress
    Idle,
    /// About to send a request
    Request,
    /// Request sent, collecting responses
    Wait,
}

/// Result of polling a discovery round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryStatus {
    /// The round is still collecting responses
    Discovering,
    /// The round finished
    Complete,
}

/// Everything discovery needs from the node for one call
pub struct DiscoveryContext<'a> {
    /// This node's address
    pub local: Address,
    /// Registered interfaces
    pub interfaces: &'a mut InterfaceRegistry,
    /// Routing table to populate
    pub routes: &'a mut RoutingTable,
}

/// Discovery state machine and flood control
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    state: DiscoveryState,
    start_ms: u32,
    timeout_ms: u32,
    cache: UidCache,
}

impl Default for DiscoveryEngine {
    fn default() -> Self {
        Self::new(DEFAULT_DISCOVERY_TIMEOUT_MS, DEFAULT_UID_CACHE_SIZE)
    }
}

impl DiscoveryEngine {
    /// Create an engine with the given response window and cache depth
    pub fn new(timeout_ms: u32, cache_size: usize) -> Self {
        Self {
            state: DiscoveryState::Idle,
            start_ms: 0,
            timeout_ms,
            cache: UidCache::new(cache_size),
        }
    }

    /// Current state
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    /// Recently seen identifiers
    pub fn cache(&self) -> &UidCache {
        &self.cache
    }

    /// Advance the local discovery round.
    ///
    /// The first call broadcasts a request; later calls report
    /// [`DiscoveryStatus::Discovering`] until the response window has passed.
    pub fn poll(
        &mut self,
        now_ms: u32,
        uids: &mut dyn UidSource,
        ctx: DiscoveryContext<'_>,
    ) -> Result<DiscoveryStatus, MeshError> {
        if self.state == DiscoveryState::Idle {
            self.state = DiscoveryState::Request;
        }

        match self.state {
            DiscoveryState::Request => match self.send_request(uids, ctx) {
                Ok(()) => {
                    self.state = DiscoveryState::Wait;
                    self.start_ms = now_ms;
                    Ok(DiscoveryStatus::Discovering)
                }
                Err(err) => {
                    warn!(error = %err, "Discovery request failed");
                    self.state = DiscoveryState::Idle;
                    Err(err)
                }
            },
            DiscoveryState::Wait => {
                if now_ms.wrapping_sub(self.start_ms) > self.timeout_ms {
                    info!(routes = ctx.routes.len(), "Discovery round complete");
                    self.state = DiscoveryState::Idle;
                    Ok(DiscoveryStatus::Complete)
                } else {
                    Ok(DiscoveryStatus::Discovering)
                }
            }
            DiscoveryState::Idle => Err(MeshError::BadSequence("discovery state")),
        }
    }

    fn send_request(
        &mut self,
        uids: &mut dyn UidSource,
        ctx: DiscoveryContext<'_>,
    ) -> Result<(), MeshError> {
        let uid = uids.generate()?;
        if uid.is_zero() {
            return Err(MeshError::BadSequence("uid source not seeded"));
        }
        self.cache.insert(uid, Origin::Local);

        let msg = MessageBuilder::discovery()
            .dst(Address::BROADCAST)
            .src(ctx.local)
            .payload(uid.as_bytes())
            .build()?;

        info!(%uid, interfaces = ctx.interfaces.len(), "Starting discovery round");
        ctx.interfaces.broadcast(&msg.header, &msg.payload, None)
    }

    /// Handle a DISCOVERY message received on `arrival`
    pub fn handle(
        &mut self,
        msg: MessageRef<'_>,
        arrival: InterfaceId,
        ctx: DiscoveryContext<'_>,
    ) -> Result<(), MeshError> {
        if msg.header.ctl.is_request() {
            self.handle_request(msg, arrival, ctx)
        } else {
            self.handle_response(msg, arrival, ctx)
        }
    }

    fn handle_request(
        &mut self,
        msg: MessageRef<'_>,
        arrival: InterfaceId,
        ctx: DiscoveryContext<'_>,
    ) -> Result<(), MeshError> {
        let Some(uid) = Uid::from_payload(msg.payload) else {
            warn!(interface = %arrival, len = msg.payload.len(), "Dropping discovery request with malformed identifier");
            return Ok(());
        };

        if self.cache.lookup(&uid).is_some() {
            debug!(%uid, interface = %arrival, "Ignoring repeated discovery request");
            return Ok(());
        }
        self.cache.insert(uid, Origin::Interface(arrival));

        let src = ctx
            .interfaces
            .find(arrival)
            .and_then(|iface| iface.address())
            .unwrap_or(ctx.local);
        let reply = MessageBuilder::discovery()
            .response()
            .dst(msg.header.src)
            .src(src)
            .payload(uid.as_bytes())
            .build()?;

        debug!(%uid, requester = %msg.header.src, interface = %arrival, "Answering discovery request");
        let replied = ctx
            .interfaces
            .transmit(arrival, &reply.header, &reply.payload);
        if let Err(err) = &replied {
            warn!(%uid, interface = %arrival, error = %err, "Discovery reply failed");
        }
        let flooded = ctx
            .interfaces
            .broadcast(&msg.header, msg.payload, Some(arrival));
        replied.and(flooded)
    }

    fn handle_response(
        &mut self,
        msg: MessageRef<'_>,
        arrival: InterfaceId,
        ctx: DiscoveryContext<'_>,
    ) -> Result<(), MeshError> {
        let responder = msg.header.src;
        let Some(uid) = Uid::from_payload(msg.payload) else {
            warn!(node = %responder, interface = %arrival, len = msg.payload.len(), "Dropping discovery response with malformed identifier");
            return Ok(());
        };

        match ctx.routes.add(responder, arrival) {
            Ok(()) => info!(node = %responder, interface = %arrival, "Learned route"),
            Err(err) => debug!(error = %err, "Route not added"),
        }

        match self.cache.lookup(&uid) {
            Some(Origin::Interface(origin)) if origin != arrival => {
                debug!(%uid, node = %responder, interface = %origin, "Forwarding discovery response");
                ctx.interfaces.transmit(origin, &msg.header, msg.payload)
            }
            Some(Origin::Local) => {
                debug!(%uid, node = %responder, "Discovery response for local round");
                Ok(())
            }
            _ => {
                debug!(%uid, node = %responder, "Dropping discovery response with no upstream");
                Ok(())
            }
        }
    }
}
