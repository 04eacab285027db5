//! Interface registry.
//!
//! Every link a node owns is registered once as an [`Interface`]. The
//! registry keeps them in registration order, frames outgoing messages and
//! fans them out to one, all, or all-but-one interface.

use crate::error::MeshError;
use crate::transport::Transport;
use bytes::BytesMut;
use mesh_routing::InterfaceId;
use mesh_wire::{frame_into, Address, Header, MAX_FRAME_SIZE};
use std::fmt;
use tracing::{debug, warn};

/// Default number of interfaces a node can register
pub const DEFAULT_MAX_INTERFACES: usize = 8;

/// A local link and its transport
pub struct Interface {
    requested_id: Option<InterfaceId>,
    name: String,
    address: Option<Address>,
    transport: Box<dyn Transport>,
}

impl Interface {
    /// Start building an interface
    pub fn builder(name: impl Into<String>) -> InterfaceBuilder {
        InterfaceBuilder::new(name)
    }

    /// Human-readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address this node uses on this link, if it differs from the node's
    pub fn address(&self) -> Option<Address> {
        self.address
    }

    /// Id asked for at build time
    pub fn requested_id(&self) -> Option<InterfaceId> {
        self.requested_id
    }

    /// Transport of this interface
    pub fn transport_mut(&mut self) -> &mut dyn Transport {
        self.transport.as_mut()
    }
}

impl fmt::Debug for Interface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interface")
            .field("requested_id", &self.requested_id)
            .field("name", &self.name)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Interface`]
#[derive(Default)]
pub struct InterfaceBuilder {
    id: Option<InterfaceId>,
    name: String,
    address: Option<Address>,
    transport: Option<Box<dyn Transport>>,
}

impl InterfaceBuilder {
    /// Start building an interface called `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Request a specific id instead of the next free one
    pub fn id(mut self, id: InterfaceId) -> Self {
        self.id = Some(id);
        self
    }

    /// Use a link-specific source address
    pub fn address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Attach the transport
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// Finish the interface
    pub fn build(self) -> Result<Interface, MeshError> {
        let transport = self.transport.ok_or(MeshError::NullInterface)?;
        Ok(Interface {
            requested_id: self.id,
            name: self.name,
            address: self.address,
            transport,
        })
    }
}

/// Registered interfaces in registration order
#[derive(Debug)]
pub struct InterfaceRegistry {
    interfaces: Vec<(InterfaceId, Interface)>,
    capacity: usize,
    scratch: BytesMut,
}

impl Default for InterfaceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_INTERFACES)
    }
}

impl InterfaceRegistry {
    /// Create a registry holding at most `capacity` interfaces
    pub fn new(capacity: usize) -> Self {
        Self {
            interfaces: Vec::with_capacity(capacity),
            capacity,
            scratch: BytesMut::with_capacity(MAX_FRAME_SIZE),
        }
    }

    /// Register an interface, assigning the next free id if none was requested
    pub fn register(&mut self, interface: Interface) -> Result<InterfaceId, MeshError> {
        if self.interfaces.len() >= self.capacity {
            return Err(MeshError::OutOfMemory("interface registry full"));
        }

        let id = match interface.requested_id {
            Some(id) if self.contains(id) => return Err(MeshError::InterfaceExists(id)),
            Some(id) => id,
            None => (0..=u8::MAX)
                .map(InterfaceId)
                .find(|id| !self.contains(*id))
                .ok_or(MeshError::OutOfMemory("interface ids exhausted"))?,
        };

        debug!(interface = %id, name = %interface.name, "Registered interface");
        self.interfaces.push((id, interface));
        Ok(id)
    }

    /// Number of registered interfaces
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// True when nothing is registered
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Maximum number of interfaces
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True if `id` is registered
    pub fn contains(&self, id: InterfaceId) -> bool {
        self.position(id).is_some()
    }

    /// Registration index of `id`
    pub fn position(&self, id: InterfaceId) -> Option<usize> {
        self.interfaces.iter().position(|(i, _)| *i == id)
    }

    /// Look up an interface
    pub fn find(&self, id: InterfaceId) -> Option<&Interface> {
        self.interfaces
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, iface)| iface)
    }

    /// Look up an interface mutably
    pub fn find_mut(&mut self, id: InterfaceId) -> Option<&mut Interface> {
        self.interfaces
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, iface)| iface)
    }

    /// Interface at registration index `index`
    pub fn get_mut(&mut self, index: usize) -> Option<(InterfaceId, &mut Interface)> {
        self.interfaces
            .get_mut(index)
            .map(|(id, iface)| (*id, iface))
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> impl Iterator<Item = InterfaceId> + '_ {
        self.interfaces.iter().map(|(id, _)| *id)
    }

    /// Visit every interface once, in registration order
    pub fn for_each<F>(&mut self, mut f: F)
    where
        F: FnMut(InterfaceId, &mut Interface),
    {
        for (id, iface) in self.interfaces.iter_mut() {
            f(*id, iface);
        }
    }

    /// Visit every interface except `excluded`
    pub fn for_each_except<F>(&mut self, excluded: InterfaceId, mut f: F)
    where
        F: FnMut(InterfaceId, &mut Interface),
    {
        for (id, iface) in self.interfaces.iter_mut() {
            if *id != excluded {
                f(*id, iface);
            }
        }
    }

    /// Frame a message and send it on one interface
    pub fn transmit(
        &mut self,
        id: InterfaceId,
        header: &Header,
        payload: &[u8],
    ) -> Result<(), MeshError> {
        self.scratch.clear();
        frame_into(header, payload, &mut self.scratch)?;

        let iface = self
            .interfaces
            .iter_mut()
            .find(|(i, _)| *i == id)
            .map(|(_, iface)| iface)
            .ok_or(MeshError::InterfaceNotFound(id))?;

        debug!(interface = %id, dst = %header.dst, bytes = self.scratch.len(), "Transmitting frame");
        iface
            .transport
            .transmit(&self.scratch)
            .map_err(|source| MeshError::Transmit { interface: id, source })
    }

    /// Frame a message once and send it on every interface except `excluded`.
    ///
    /// Every interface is attempted; the first failure is returned.
    pub fn broadcast(
        &mut self,
        header: &Header,
        payload: &[u8],
        excluded: Option<InterfaceId>,
    ) -> Result<(), MeshError> {
        self.scratch.clear();
        frame_into(header, payload, &mut self.scratch)?;

        let mut first_err = None;
        for (id, iface) in self.interfaces.iter_mut() {
            if Some(*id) == excluded {
                continue;
            }
            if let Err(source) = iface.transport.transmit(&self.scratch) {
                warn!(interface = %id, error = %source, "Broadcast transmit failed");
                first_err.get_or_insert(MeshError::Transmit {
                    interface: *id,
                    source,
                });
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PipeTransport, TransportError};
    use mesh_wire::{unframe, MessageBuilder};

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn transmit(&mut self, _bytes: &[u8]) -> Result<(), TransportError> {
            Err(TransportError::Closed)
        }

        fn receive(&mut self, _buf: &mut [u8]) -> Result<usize, TransportError> {
            Ok(0)
        }
    }

    fn pipe_iface(name: &str) -> (Interface, PipeTransport) {
        let (local, remote) = PipeTransport::pair(1024);
        let iface = Interface::builder(name).transport(local).build().unwrap();
        (iface, remote)
    }

    fn drain(remote: &mut PipeTransport) -> Vec<u8> {
        let mut buf = [0u8; 1024];
        let n = remote.receive(&mut buf).unwrap();
        buf[..n].to_vec()
    }

    #[test]
    fn test_build_without_transport() {
        assert!(matches!(
            Interface::builder("uart0").build(),
            Err(MeshError::NullInterface)
        ));
    }

    #[test]
    fn test_sequential_ids() {
        let mut registry = InterfaceRegistry::default();
        let (a, _ra) = pipe_iface("a");
        let (b, _rb) = pipe_iface("b");
        assert_eq!(registry.register(a).unwrap(), InterfaceId(0));
        assert_eq!(registry.register(b).unwrap(), InterfaceId(1));
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.find(InterfaceId(1)).unwrap().name(), "b");
    }

    #[test]
    fn test_requested_id_and_duplicates() {
        let mut registry = InterfaceRegistry::default();
        let (local, _remote) = PipeTransport::pair(64);
        let a = Interface::builder("a")
            .id(InterfaceId(5))
            .transport(local.clone())
            .build()
            .unwrap();
        let dup = Interface::builder("dup")
            .id(InterfaceId(5))
            .transport(local)
            .build()
            .unwrap();

        assert_eq!(registry.register(a).unwrap(), InterfaceId(5));
        assert!(matches!(
            registry.register(dup),
            Err(MeshError::InterfaceExists(InterfaceId(5)))
        ));

        let (next, _r) = pipe_iface("next");
        assert_eq!(registry.register(next).unwrap(), InterfaceId(0));
    }

    #[test]
    fn test_capacity() {
        let mut registry = InterfaceRegistry::new(1);
        let (a, _ra) = pipe_iface("a");
        let (b, _rb) = pipe_iface("b");
        registry.register(a).unwrap();
        assert!(matches!(
            registry.register(b),
            Err(MeshError::OutOfMemory(_))
        ));
    }

    #[test]
    fn test_iteration_order() {
        let mut registry = InterfaceRegistry::default();
        let mut remotes = Vec::new();
        for name in ["a", "b", "c"] {
            let (iface, remote) = pipe_iface(name);
            registry.register(iface).unwrap();
            remotes.push(remote);
        }

        let mut seen = Vec::new();
        registry.for_each(|id, _| seen.push(id));
        assert_eq!(seen, vec![InterfaceId(0), InterfaceId(1), InterfaceId(2)]);

        let mut seen = Vec::new();
        registry.for_each_except(InterfaceId(1), |_, iface| seen.push(iface.name().to_string()));
        assert_eq!(seen, vec!["a", "c"]);
    }

    #[test]
    fn test_transmit_frames_message() {
        let mut registry = InterfaceRegistry::default();
        let (iface, mut remote) = pipe_iface("a");
        let id = registry.register(iface).unwrap();

        let msg = MessageBuilder::user()
            .dst(Address(2))
            .src(Address(1))
            .payload(b"data")
            .build()
            .unwrap();
        registry.transmit(id, &msg.header, &msg.payload).unwrap();

        assert_eq!(unframe(&drain(&mut remote)).unwrap(), msg);
        assert!(matches!(
            registry.transmit(InterfaceId(9), &msg.header, &msg.payload),
            Err(MeshError::InterfaceNotFound(InterfaceId(9)))
        ));
    }

    #[test]
    fn test_broadcast_except() {
        let mut registry = InterfaceRegistry::default();
        let mut remotes = Vec::new();
        for name in ["a", "b", "c"] {
            let (iface, remote) = pipe_iface(name);
            registry.register(iface).unwrap();
            remotes.push(remote);
        }

        let msg = MessageBuilder::discovery().src(Address(1)).build().unwrap();
        registry
            .broadcast(&msg.header, &msg.payload, Some(InterfaceId(1)))
            .unwrap();

        let a = drain(&mut remotes[0]);
        assert!(drain(&mut remotes[1]).is_empty());
        let c = drain(&mut remotes[2]);
        assert_eq!(a, c);
        assert_eq!(unframe(&a).unwrap(), msg);
    }

    #[test]
    fn test_broadcast_attempts_all_and_reports_first_error() {
        let mut registry = InterfaceRegistry::default();
        let bad = Interface::builder("bad")
            .transport(FailingTransport)
            .build()
            .unwrap();
        registry.register(bad).unwrap();
        let (good, mut remote) = pipe_iface("good");
        registry.register(good).unwrap();

        let msg = MessageBuilder::discovery().build().unwrap();
        let err = registry.broadcast(&msg.header, &msg.payload, None).unwrap_err();
        assert!(matches!(
            err,
            MeshError::Transmit {
                interface: InterfaceId(0),
                source: TransportError::Closed
            }
        ));
        assert!(!drain(&mut remote).is_empty());
    }
}
