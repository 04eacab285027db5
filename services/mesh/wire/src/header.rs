//! Fixed header processing for the wire protocol.
//!
//! This module defines the 5-byte header that precedes every payload. The
//! header carries enough information to route, classify and validate a
//! message without looking at the payload.

use bitflags::bitflags;
use bytes::BufMut;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Header size in bytes
pub const HEADER_SIZE: usize = 5;

/// Largest payload the one-byte length field can describe
pub const MAX_PAYLOAD_SIZE: usize = u8::MAX as usize;

/// Offset of the crc byte inside an encoded header
pub const CRC_OFFSET: usize = 3;

/// Offset of the length byte inside an encoded header
pub const LEN_OFFSET: usize = 4;

const TYPE_SHIFT: u8 = 2;
const TYPE_MASK: u8 = 0x7C;

/// Number of message types representable in the control byte
pub const MESSAGE_TYPE_CAPACITY: usize = ((TYPE_MASK >> TYPE_SHIFT) as usize) + 1;

/// One-byte node address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub u8);

impl Address {
    /// Destination matching every node
    pub const BROADCAST: Address = Address(0xFF);
    /// Sentinel for "no address assigned"
    pub const INVALID: Address = Address(0x00);

    /// True for the reserved BROADCAST and INVALID values
    pub fn is_reserved(self) -> bool {
        self == Self::BROADCAST || self == Self::INVALID
    }

    /// Raw byte value
    pub fn get(self) -> u8 {
        self.0
    }
}

impl From<u8> for Address {
    fn from(value: u8) -> Self {
        Address(value)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BROADCAST => write!(f, "broadcast"),
            Self::INVALID => write!(f, "invalid"),
            Address(a) => write!(f, "{}", a),
        }
    }
}

/// Message types as defined in the wire protocol
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    /// Application message
    User = 0x00,
    /// Route discovery request/response
    Discovery = 0x01,
    /// Acknowledgment (reserved for flow control)
    Ack = 0x02,
    /// Retransmission request (reserved for flow control)
    RetryRequest = 0x03,
    /// Slow-down hint (reserved for flow control)
    Slowdown = 0x04,
}

impl MessageType {
    /// Every defined message type, in wire order
    pub const ALL: [MessageType; 5] = [
        MessageType::User,
        MessageType::Discovery,
        MessageType::Ack,
        MessageType::RetryRequest,
        MessageType::Slowdown,
    ];

    /// Types handled internally rather than by the application or discovery
    pub fn is_flow_control(self) -> bool {
        matches!(
            self,
            MessageType::Ack | MessageType::RetryRequest | MessageType::Slowdown
        )
    }
}

// Adding a message type that does not fit the control byte must not build.
const _: () = assert!(MessageType::ALL.len() <= MESSAGE_TYPE_CAPACITY);

impl TryFrom<u8> for MessageType {
    type Error = crate::WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MessageType::User),
            0x01 => Ok(MessageType::Discovery),
            0x02 => Ok(MessageType::Ack),
            0x03 => Ok(MessageType::RetryRequest),
            0x04 => Ok(MessageType::Slowdown),
            _ => Err(crate::WireError::Type(value)),
        }
    }
}

bitflags! {
    /// Single-bit fields of the control byte
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ControlFlags: u8 {
        /// Payload length is non-zero
        const HAS_DATA = 1 << 0;
        /// Message is a response (clear for requests)
        const RESPONSE = 1 << 1;
        /// Message is a retransmission
        const RETRY = 1 << 7;
    }
}

/// Control byte: flags plus a 5-bit message type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ControlWord {
    /// Single-bit fields
    pub flags: ControlFlags,
    /// Raw message type bits (0..=31); unknown values are preserved
    pub type_bits: u8,
}

impl ControlWord {
    /// Control word for a request of the given type
    pub fn request(typ: MessageType) -> Self {
        Self {
            flags: ControlFlags::empty(),
            type_bits: typ as u8,
        }
    }

    /// Control word for a response of the given type
    pub fn response(typ: MessageType) -> Self {
        Self {
            flags: ControlFlags::RESPONSE,
            type_bits: typ as u8,
        }
    }

    /// Decode from the wire byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            flags: ControlFlags::from_bits_truncate(byte),
            type_bits: (byte & TYPE_MASK) >> TYPE_SHIFT,
        }
    }

    /// Encode to the wire byte
    pub fn to_byte(self) -> u8 {
        self.flags.bits() | ((self.type_bits << TYPE_SHIFT) & TYPE_MASK)
    }

    /// Message type, if known
    pub fn message_type(&self) -> Result<MessageType, crate::WireError> {
        MessageType::try_from(self.type_bits)
    }

    /// Request (true) or response (false)
    pub fn is_request(&self) -> bool {
        !self.flags.contains(ControlFlags::RESPONSE)
    }

    /// Retransmission flag
    pub fn is_retry(&self) -> bool {
        self.flags.contains(ControlFlags::RETRY)
    }

    /// Payload flag
    pub fn has_data(&self) -> bool {
        self.flags.contains(ControlFlags::HAS_DATA)
    }

    /// Set or clear the request/response flag
    pub fn set_request(&mut self, request: bool) {
        self.flags.set(ControlFlags::RESPONSE, !request);
    }

    /// Set or clear the retry flag
    pub fn set_retry(&mut self, retry: bool) {
        self.flags.set(ControlFlags::RETRY, retry);
    }
}

/// Fixed header structure (5 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// Control byte
    pub ctl: ControlWord,
    /// Destination address or BROADCAST
    pub dst: Address,
    /// Source address or INVALID
    pub src: Address,
    /// CRC8 over the header (crc = 0) and payload
    pub crc8: u8,
    /// Payload length in bytes
    pub len: u8,
}

impl Header {
    /// Create a header with an empty payload and a zero checksum
    pub fn new(ctl: ControlWord, dst: Address, src: Address) -> Self {
        Self {
            ctl,
            dst,
            src,
            crc8: 0,
            len: 0,
        }
    }

    /// Serialize the header fields in wire order
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        [
            self.ctl.to_byte(),
            self.dst.0,
            self.src.0,
            self.crc8,
            self.len,
        ]
    }

    /// Encode the header into a buffer
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(&self.to_bytes());
    }

    /// Decode the header from the front of a byte slice
    pub fn decode(bytes: &[u8]) -> Result<Self, crate::WireError> {
        if bytes.len() < HEADER_SIZE {
            return Err(crate::WireError::BadLength(bytes.len()));
        }

        Ok(Self {
            ctl: ControlWord::from_byte(bytes[0]),
            dst: Address(bytes[1]),
            src: Address(bytes[2]),
            crc8: bytes[CRC_OFFSET],
            len: bytes[LEN_OFFSET],
        })
    }

    /// Payload length as usize
    pub fn payload_len(&self) -> usize {
        self.len as usize
    }

    /// Encoded size of header plus payload
    pub fn total_len(&self) -> usize {
        HEADER_SIZE + self.payload_len()
    }

    /// Compute the checksum for this header over `payload`
    pub fn compute_crc(&self, payload: &[u8]) -> u8 {
        let mut bytes = self.to_bytes();
        bytes[CRC_OFFSET] = 0;
        let mut crc = crate::crc::Crc8::new();
        crc.update(&bytes);
        crc.update(payload);
        crc.finalize()
    }

    /// Fill in the length, data flag and checksum for `payload`
    pub fn seal(&mut self, payload: &[u8]) -> Result<(), crate::WireError> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(crate::WireError::BadLength(payload.len()));
        }
        self.len = payload.len() as u8;
        self.ctl
            .flags
            .set(ControlFlags::HAS_DATA, !payload.is_empty());
        self.crc8 = self.compute_crc(payload);
        Ok(())
    }
}

/// Recompute the checksum and compare it with the header's
pub fn verify_crc(header: &Header, payload: &[u8]) -> bool {
    header.compute_crc(payload) == header.crc8
}
