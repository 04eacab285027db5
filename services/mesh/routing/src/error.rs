//! Routing error types.

use mesh_wire::Address;
use thiserror::Error;

/// Routing table errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    /// Reserved address, or one the table has no slot for
    #[error("bad address: {0}")]
    BadAddress(Address),

    /// A route to this address is already present
    #[error("route to {0} already exists")]
    RouteExists(Address),

    /// No route to this address
    #[error("no route to {0}")]
    NoRoute(Address),
}
