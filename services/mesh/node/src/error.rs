//! Node error types.

use crate::transport::TransportError;
use mesh_routing::{InterfaceId, RouteError};
use mesh_wire::WireError;
use thiserror::Error;

/// Errors returned by node operations
#[derive(Error, Debug)]
pub enum MeshError {
    /// Wire protocol error
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Routing table error
    #[error("routing error: {0}")]
    Route(#[from] RouteError),

    /// Invalid argument or configuration value
    #[error("bad argument: {0}")]
    BadArg(String),

    /// Interface built without a transport
    #[error("interface has no transport")]
    NullInterface,

    /// No interface with this id is registered
    #[error("interface {0} not found")]
    InterfaceNotFound(InterfaceId),

    /// An interface with this id is already registered
    #[error("interface {0} already registered")]
    InterfaceExists(InterfaceId),

    /// Fixed-capacity storage exhausted
    #[error("out of memory: {0}")]
    OutOfMemory(&'static str),

    /// Transport refused outgoing bytes
    #[error("transmit failed on {interface}: {source}")]
    Transmit {
        /// Interface the bytes were sent on
        interface: InterfaceId,
        /// Transport failure
        source: TransportError,
    },

    /// Transport failed to deliver incoming bytes
    #[error("receive failed on {interface}: {source}")]
    Receive {
        /// Interface being read
        interface: InterfaceId,
        /// Transport failure
        source: TransportError,
    },

    /// Operation not valid in the current state
    #[error("bad sequence: {0}")]
    BadSequence(&'static str),
}
