//! Routing table for linkmesh.
//!
//! Maps destination addresses to the local interface that leads towards
//! them. The table is a fixed array indexed by address, sized once for the
//! largest address the mesh uses.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod next_hop;
pub mod table;

pub use error::RouteError;
pub use next_hop::{InterfaceId, RouteEntry};
pub use table::{RoutingTable, DEFAULT_MAX_NODES};
