//! Wire protocol framing, checksums and stream parsing for linkmesh.
//!
//! This crate provides the low-level wire protocol used on point-to-point
//! links between mesh nodes: the fixed message header, CRC-8 validation,
//! COBS byte stuffing and a streaming parser that recovers frames from a raw
//! byte stream.
//!
//! ## Features
//!
//! - **Compact Header**: 5-byte header carrying control, addresses, crc, length
//! - **Self-Delimiting Frames**: COBS keeps `0x00` free as the frame marker
//! - **Streaming Parser**: byte-at-a-time state machine, resyncs on garbage
//! - **Zero-Copy Delivery**: parsed messages are lent from the decode buffer
//!
//! ## Wire Format
//!
//! ```text
//! +------+--------------------------------------------------+------+
//! | 0x00 | COBS( ctl | dst | src | crc8 | len | payload )  | 0x00 |
//! +------+--------------------------------------------------+------+
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cobs;
pub mod codec;
pub mod crc;
pub mod error;
pub mod frame;
pub mod header;
pub mod parser;

// Re-export main types
pub use codec::MessageBuilder;
pub use crc::crc8;
pub use error::WireError;
pub use frame::{frame, frame_into, unframe, Message, MessageRef, MAX_FRAME_SIZE, MAX_MESSAGE_SIZE};
pub use header::{
    verify_crc, Address, ControlFlags, ControlWord, Header, MessageType, HEADER_SIZE,
    MAX_PAYLOAD_SIZE,
};
pub use parser::{ParseEvent, ParserState, Status, StreamParser};
