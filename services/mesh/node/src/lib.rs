//! Interfaces, discovery and message dispatch for linkmesh nodes.
//!
//! A node owns a set of point-to-point links. Bytes read from each link are
//! parsed into messages, which are delivered locally, forwarded along the
//! routing table, or handed to the discovery engine that builds that table.
//!
//! ## Features
//!
//! - **Multi-Homed**: any number of links, each with its own stream parser
//! - **Flooding Discovery**: routes learned from discovery responses
//! - **Loop Control**: bounded cache of recent discovery identifiers
//! - **Poll-Driven**: no threads, locks or blocking inside the node
//!
//! ## Example
//!
//! ```rust
//! use mesh_node::{Interface, Node, NodeConfig, PipeTransport};
//! use mesh_wire::Address;
//!
//! # fn example() -> Result<(), mesh_node::MeshError> {
//! let (local, _remote) = PipeTransport::pair(1024);
//! let mut node = Node::new(NodeConfig::with_address(Address(1)))?;
//! node.register_interface(Interface::builder("uart0").transport(local).build()?)?;
//! node.set_handler(|_iface: mesh_node::InterfaceId, msg: mesh_wire::MessageRef<'_>| {
//!     println!("{} bytes from {}", msg.payload.len(), msg.header.src);
//! });
//! node.discover()?;
//! node.poll_interfaces()?;
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod discovery;
pub mod env;
pub mod error;
pub mod netif;
pub mod node;
pub mod transport;

// Re-export main types
pub use config::NodeConfig;
pub use discovery::{DiscoveryEngine, DiscoveryState, DiscoveryStatus, Origin, UidCache};
pub use env::{Clock, ManualClock, RandomUid, SequentialUid, SystemClock, Uid, UidSource, UID_LEN};
pub use error::MeshError;
pub use mesh_routing::{InterfaceId, RouteEntry, RouteError, RoutingTable};
pub use netif::{Interface, InterfaceBuilder, InterfaceRegistry};
pub use node::{MessageHandler, Node, Target};
pub use transport::{PipeTransport, Transport, TransportError};
