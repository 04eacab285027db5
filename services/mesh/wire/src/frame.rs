//! Message framing for the wire protocol.
//!
//! A frame on the byte stream is a marker, the stuffed header and payload,
//! and a closing marker:
//!
//! ```text
//! +------+-------------------------------+------+
//! | 0x00 | COBS(header(5B) || payload)   | 0x00 |
//! +------+-------------------------------+------+
//! ```

use crate::cobs::{self, FRAME_MARKER};
use crate::header::{verify_crc, Header, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};

/// Largest decoded message (header plus payload)
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Largest frame on the wire, markers included
pub const MAX_FRAME_SIZE: usize = cobs::max_encoded_len(MAX_MESSAGE_SIZE) + 2;

/// Complete owned message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Header (length and checksum describe `payload`)
    pub header: Header,
    /// Payload bytes
    pub payload: Bytes,
}

impl Message {
    /// Create a message, filling in the header length and checksum
    pub fn new(mut header: Header, payload: Bytes) -> Result<Self, WireError> {
        header.seal(&payload)?;
        Ok(Self { header, payload })
    }

    /// Borrow as a [`MessageRef`]
    pub fn view(&self) -> MessageRef<'_> {
        MessageRef {
            header: self.header,
            payload: &self.payload,
        }
    }

    /// Encode to a frame
    pub fn frame(&self) -> Result<Bytes, WireError> {
        frame(&self.view())
    }
}

/// Message borrowed from a decode buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef<'a> {
    /// Header
    pub header: Header,
    /// Payload bytes
    pub payload: &'a [u8],
}

impl<'a> MessageRef<'a> {
    /// Split a decoded buffer into header and payload
    pub fn parse(bytes: &'a [u8]) -> Result<Self, WireError> {
        let header = Header::decode(bytes)?;
        if bytes.len() != header.total_len() {
            return Err(WireError::BadLength(bytes.len()));
        }
        Ok(Self {
            header,
            payload: &bytes[HEADER_SIZE..],
        })
    }

    /// Check the header checksum against the payload
    pub fn verify(&self) -> Result<(), WireError> {
        if verify_crc(&self.header, self.payload) {
            Ok(())
        } else {
            Err(WireError::BadCrc {
                expected: self.header.crc8,
                computed: self.header.compute_crc(self.payload),
            })
        }
    }

    /// Copy into an owned [`Message`]
    pub fn to_message(self) -> Message {
        Message {
            header: self.header,
            payload: Bytes::copy_from_slice(self.payload),
        }
    }
}

/// Append the frame for `header` and `payload` to `out`.
///
/// The header's length, data flag and checksum are recomputed from the
/// payload, so forwarding a received message re-frames it unchanged.
pub fn frame_into(header: &Header, payload: &[u8], out: &mut BytesMut) -> Result<(), WireError> {
    let mut header = *header;
    header.seal(payload)?;

    let mut plain = [0u8; MAX_MESSAGE_SIZE];
    plain[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    plain[HEADER_SIZE..HEADER_SIZE + payload.len()].copy_from_slice(payload);

    out.reserve(MAX_FRAME_SIZE);
    out.put_u8(FRAME_MARKER);
    cobs::encode(&plain[..header.total_len()], out);
    out.put_u8(FRAME_MARKER);
    Ok(())
}

/// Encode a message into a self-delimiting frame
pub fn frame(msg: &MessageRef<'_>) -> Result<Bytes, WireError> {
    let mut out = BytesMut::with_capacity(MAX_FRAME_SIZE);
    frame_into(&msg.header, msg.payload, &mut out)?;
    Ok(out.freeze())
}

/// Decode one frame produced by [`frame`].
///
/// Leading and trailing markers are optional; a marker anywhere else is a
/// framing error.
pub fn unframe(bytes: &[u8]) -> Result<Message, WireError> {
    let start = usize::from(bytes.first() == Some(&FRAME_MARKER));
    let mut end = bytes.len();
    if end > start && bytes[end - 1] == FRAME_MARKER {
        end -= 1;
    }
    let body = &bytes[start..end];
    if body.is_empty() {
        return Err(WireError::Framing);
    }

    let mut plain = BytesMut::with_capacity(body.len());
    cobs::decode(body, &mut plain)?;

    let msg = MessageRef::parse(&plain)?;
    msg.verify()?;
    Ok(msg.to_message())
}
