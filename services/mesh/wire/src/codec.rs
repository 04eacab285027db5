//! Message construction helpers.

use crate::frame::{frame, Message};
use crate::header::{Address, ControlFlags, ControlWord, Header, MessageType, MAX_PAYLOAD_SIZE};
use crate::WireError;
use bytes::{BufMut, Bytes, BytesMut};

/// Builder for outgoing messages
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    ctl: ControlWord,
    dst: Address,
    src: Address,
    payload: BytesMut,
}

impl MessageBuilder {
    /// Start a request of the given type
    pub fn new(typ: MessageType) -> Self {
        Self {
            ctl: ControlWord::request(typ),
            dst: Address::BROADCAST,
            src: Address::INVALID,
            payload: BytesMut::new(),
        }
    }

    /// Start a USER request
    pub fn user() -> Self {
        Self::new(MessageType::User)
    }

    /// Start a DISCOVERY request
    pub fn discovery() -> Self {
        Self::new(MessageType::Discovery)
    }

    /// Set the destination address
    pub fn dst(mut self, dst: Address) -> Self {
        self.dst = dst;
        self
    }

    /// Set the source address
    pub fn src(mut self, src: Address) -> Self {
        self.src = src;
        self
    }

    /// Mark as a request
    pub fn request(mut self) -> Self {
        self.ctl.set_request(true);
        self
    }

    /// Mark as a response
    pub fn response(mut self) -> Self {
        self.ctl.set_request(false);
        self
    }

    /// Set or clear the retransmission flag
    pub fn retry(mut self, retry: bool) -> Self {
        self.ctl.set_retry(retry);
        self
    }

    /// Append payload bytes
    pub fn payload(mut self, bytes: &[u8]) -> Self {
        self.payload.put_slice(bytes);
        self
    }

    /// Finish the message, sealing length and checksum
    pub fn build(mut self) -> Result<Message, WireError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::BadLength(self.payload.len()));
        }
        self.ctl.flags.remove(ControlFlags::HAS_DATA);
        let header = Header::new(self.ctl, self.dst, self.src);
        Message::new(header, self.payload.freeze())
    }

    /// Finish and frame the message for transmission
    pub fn build_frame(self) -> Result<Bytes, WireError> {
        let msg = self.build()?;
        frame(&msg.view())
    }
}
