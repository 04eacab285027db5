//! Message dispatch.
//!
//! A [`Node`] owns the interfaces, their stream parsers, the routing table
//! and the discovery engine. Incoming bytes are parsed per interface and
//! every validated message is dispatched:
//!
//! - DISCOVERY goes to the discovery engine
//! - USER for this node (or BROADCAST) goes to the [`MessageHandler`]
//! - USER for another node is forwarded along the routing table
//! - anything else is dropped

use crate::config::NodeConfig;
use crate::discovery::{DiscoveryContext, DiscoveryEngine, DiscoveryState, DiscoveryStatus};
use crate::env::{Clock, RandomUid, SystemClock, UidSource};
use crate::error::MeshError;
use crate::netif::{Interface, InterfaceRegistry};
use mesh_routing::{InterfaceId, RoutingTable};
use mesh_wire::{
    Address, Message, MessageBuilder, MessageRef, MessageType, ParseEvent, StreamParser,
};
use tracing::{debug, warn};

/// Receiver of USER messages addressed to this node
pub trait MessageHandler: Send {
    /// Called once per validated message delivered locally
    fn on_message(&mut self, interface: InterfaceId, msg: MessageRef<'_>);
}

impl<F> MessageHandler for F
where
    F: FnMut(InterfaceId, MessageRef<'_>) + Send,
{
    fn on_message(&mut self, interface: InterfaceId, msg: MessageRef<'_>) {
        self(interface, msg)
    }
}

/// Where to send a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A specific local interface
    Interface(InterfaceId),
    /// A node address, resolved through the routing table
    Address(Address),
}

/// Receive side of one interface
#[derive(Debug)]
struct Link {
    parser: StreamParser,
    rx_buf: Box<[u8]>,
}

impl Link {
    fn new(buffer_size: usize) -> Self {
        Self {
            parser: StreamParser::new(buffer_size),
            rx_buf: vec![0u8; buffer_size].into_boxed_slice(),
        }
    }
}

/// Borrowed node state needed to act on one message
struct Dispatcher<'a> {
    local: Address,
    interfaces: &'a mut InterfaceRegistry,
    routes: &'a mut RoutingTable,
    discovery: &'a mut DiscoveryEngine,
    handler: &'a mut Option<Box<dyn MessageHandler>>,
}

impl Dispatcher<'_> {
    fn dispatch(&mut self, arrival: InterfaceId, msg: MessageRef<'_>) -> Result<(), MeshError> {
        let header = &msg.header;
        match header.ctl.message_type() {
            Ok(MessageType::Discovery) => self.discovery.handle(
                msg,
                arrival,
                DiscoveryContext {
                    local: self.local,
                    interfaces: &mut *self.interfaces,
                    routes: &mut *self.routes,
                },
            ),
            Ok(MessageType::User) => {
                if header.dst == self.local || header.dst == Address::BROADCAST {
                    debug!(src = %header.src, interface = %arrival, len = msg.payload.len(), "Delivering message");
                    match self.handler.as_mut() {
                        Some(handler) => handler.on_message(arrival, msg),
                        None => debug!("No message handler installed"),
                    }
                    Ok(())
                } else {
                    self.forward(arrival, msg)
                }
            }
            Ok(other) => {
                debug!(message_type = ?other, "Dropping flow control message");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "Dropping message of unknown type");
                Ok(())
            }
        }
    }

    fn forward(&mut self, arrival: InterfaceId, msg: MessageRef<'_>) -> Result<(), MeshError> {
        let dst = msg.header.dst;
        match self.routes.lookup(dst) {
            Ok(out) if out != arrival => {
                debug!(%dst, from = %arrival, to = %out, "Forwarding message");
                self.interfaces.transmit(out, &msg.header, msg.payload)
            }
            Ok(_) => {
                debug!(%dst, interface = %arrival, "Dropping message routed back to its arrival link");
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, "Dropping unroutable message");
                Ok(())
            }
        }
    }
}

/// A mesh node
pub struct Node {
    config: NodeConfig,
    interfaces: InterfaceRegistry,
    links: Vec<Link>,
    routes: RoutingTable,
    discovery: DiscoveryEngine,
    clock: Box<dyn Clock>,
    uids: Box<dyn UidSource>,
    handler: Option<Box<dyn MessageHandler>>,
}

impl Node {
    /// Create a node using the system clock and random identifiers
    pub fn new(config: NodeConfig) -> Result<Self, MeshError> {
        Self::with_env(config, SystemClock::new(), RandomUid::from_entropy())
    }

    /// Create a node with explicit clock and identifier sources
    pub fn with_env(
        config: NodeConfig,
        clock: impl Clock + 'static,
        uids: impl UidSource + 'static,
    ) -> Result<Self, MeshError> {
        config.validate()?;
        Ok(Self {
            interfaces: InterfaceRegistry::new(config.max_interfaces),
            links: Vec::with_capacity(config.max_interfaces),
            routes: RoutingTable::new(config.max_nodes),
            discovery: DiscoveryEngine::new(config.discovery_timeout_ms, config.uid_cache_size),
            clock: Box::new(clock),
            uids: Box::new(uids),
            handler: None,
            config,
        })
    }

    /// This node's address
    pub fn address(&self) -> Address {
        self.config.address
    }

    /// Active configuration
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Routing table
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Routing table, for static routes
    pub fn routes_mut(&mut self) -> &mut RoutingTable {
        &mut self.routes
    }

    /// Registered interfaces
    pub fn interfaces(&self) -> &InterfaceRegistry {
        &self.interfaces
    }

    /// Discovery round state
    pub fn discovery_state(&self) -> DiscoveryState {
        self.discovery.state()
    }

    /// Install the receiver for locally delivered USER messages
    pub fn set_handler(&mut self, handler: impl MessageHandler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Register an interface and give it a stream parser
    pub fn register_interface(&mut self, interface: Interface) -> Result<InterfaceId, MeshError> {
        let id = self.interfaces.register(interface)?;
        self.links.push(Link::new(self.config.buffer_size));
        Ok(id)
    }

    /// Clear a parser that ran out of buffer space
    pub fn reset_parser(&mut self, id: InterfaceId) -> Result<(), MeshError> {
        let index = self
            .interfaces
            .position(id)
            .ok_or(MeshError::InterfaceNotFound(id))?;
        self.links[index].parser.reset();
        Ok(())
    }

    /// Feed bytes received on `id` and dispatch every message they complete.
    ///
    /// All bytes are processed even when handling one message fails; the
    /// first failure is returned afterwards.
    pub fn on_bytes_received(&mut self, id: InterfaceId, bytes: &[u8]) -> Result<(), MeshError> {
        let index = self
            .interfaces
            .position(id)
            .ok_or(MeshError::InterfaceNotFound(id))?;

        let Self {
            config,
            interfaces,
            links,
            routes,
            discovery,
            handler,
            ..
        } = self;
        let mut dispatcher = Dispatcher {
            local: config.address,
            interfaces,
            routes,
            discovery,
            handler,
        };
        feed_link(&mut links[index].parser, id, bytes, &mut dispatcher)
    }

    /// Read every interface's transport and dispatch what arrived
    pub fn poll_interfaces(&mut self) -> Result<(), MeshError> {
        let mut first_err = None;

        for index in 0..self.links.len() {
            let Self {
                config,
                interfaces,
                links,
                routes,
                discovery,
                handler,
                ..
            } = self;
            let Link { parser, rx_buf } = &mut links[index];

            loop {
                let Some((id, iface)) = interfaces.get_mut(index) else {
                    break;
                };
                let n = match iface.transport_mut().receive(rx_buf) {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(source) => {
                        warn!(interface = %id, error = %source, "Receive failed");
                        first_err.get_or_insert(MeshError::Receive {
                            interface: id,
                            source,
                        });
                        break;
                    }
                };

                let mut dispatcher = Dispatcher {
                    local: config.address,
                    interfaces: &mut *interfaces,
                    routes: &mut *routes,
                    discovery: &mut *discovery,
                    handler: &mut *handler,
                };
                if let Err(err) = feed_link(parser, id, &rx_buf[..n], &mut dispatcher) {
                    first_err.get_or_insert(err);
                }
                if parser.state() == mesh_wire::ParserState::Error {
                    break;
                }
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Send a message to an interface or an address
    pub fn send(&mut self, msg: &Message, target: Target) -> Result<(), MeshError> {
        match target {
            Target::Interface(id) => self.interfaces.transmit(id, &msg.header, &msg.payload),
            Target::Address(Address::BROADCAST) => self.broadcast(msg),
            Target::Address(dst) => {
                let id = self.routes.lookup(dst)?;
                self.interfaces.transmit(id, &msg.header, &msg.payload)
            }
        }
    }

    /// Send a USER message from this node to `dst`
    pub fn send_user(&mut self, dst: Address, payload: &[u8]) -> Result<(), MeshError> {
        let msg = MessageBuilder::user()
            .dst(dst)
            .src(self.config.address)
            .payload(payload)
            .build()?;
        self.send(&msg, Target::Address(dst))
    }

    /// Send a message on every interface
    pub fn broadcast(&mut self, msg: &Message) -> Result<(), MeshError> {
        self.interfaces.broadcast(&msg.header, &msg.payload, None)
    }

    /// Send a message on every interface except `excluded`
    pub fn broadcast_except(
        &mut self,
        msg: &Message,
        excluded: InterfaceId,
    ) -> Result<(), MeshError> {
        self.interfaces
            .broadcast(&msg.header, &msg.payload, Some(excluded))
    }

    /// Drive this node's discovery round.
    ///
    /// Call repeatedly, polling interfaces in between, until it reports
    /// [`DiscoveryStatus::Complete`].
    pub fn discover(&mut self) -> Result<DiscoveryStatus, MeshError> {
        let now = self.clock.now_ms();
        self.discovery.poll(
            now,
            self.uids.as_mut(),
            DiscoveryContext {
                local: self.config.address,
                interfaces: &mut self.interfaces,
                routes: &mut self.routes,
            },
        )
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("config", &self.config)
            .field("interfaces", &self.interfaces)
            .field("routes", &self.routes)
            .field("discovery", &self.discovery)
            .finish_non_exhaustive()
    }
}

fn feed_link(
    parser: &mut StreamParser,
    id: InterfaceId,
    bytes: &[u8],
    dispatcher: &mut Dispatcher<'_>,
) -> Result<(), MeshError> {
    let mut first_err = None;
    let consumed = parser.feed(bytes, |event| match event {
        ParseEvent::Message(msg) => {
            if let Err(err) = dispatcher.dispatch(id, msg) {
                warn!(interface = %id, error = %err, "Message handling failed");
                first_err.get_or_insert(err);
            }
        }
        ParseEvent::Resync(err) => debug!(interface = %id, error = %err, "Parser resynchronized"),
        ParseEvent::Failed(err) => {
            warn!(interface = %id, error = %err, "Parser failed, reset required");
            first_err.get_or_insert(MeshError::Wire(err));
        }
    });
    if consumed < bytes.len() {
        warn!(interface = %id, dropped = bytes.len() - consumed, "Bytes dropped by failed parser");
    }

    match first_err {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
