//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireError {
    /// Checksum over header and payload does not match
    #[error("bad crc: expected {expected:#04x}, computed {computed:#04x}")]
    BadCrc {
        /// CRC carried in the header
        expected: u8,
        /// CRC computed over the received bytes
        computed: u8,
    },

    /// Not enough bytes, or a length that disagrees with the header
    #[error("bad length: {0}")]
    BadLength(usize),

    /// Malformed byte-stuffed frame
    #[error("framing error")]
    Framing,

    /// Message type not known to this implementation
    #[error("unknown message type {0}")]
    Type(u8),

    /// Decode buffer exhausted
    #[error("out of memory: decode buffer of {0} bytes exhausted")]
    OutOfMemory(usize),
}
