//! Streaming frame parser.
//!
//! Bytes arrive in arbitrary chunks from a link. The parser decodes them one
//! at a time, tracks frame boundaries and hands out complete, checksum
//! validated messages. Corrupt input never stalls it: the next frame marker
//! always starts a fresh frame.

use crate::cobs::{Decoder, FRAME_MARKER};
use crate::frame::{MessageRef, MAX_MESSAGE_SIZE};
use crate::header::{HEADER_SIZE, LEN_OFFSET};
use crate::WireError;
use bytes::{BufMut, BytesMut};
use tracing::{debug, warn};

/// Parser states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// Waiting for a frame marker
    Idle,
    /// Collecting header bytes
    Header,
    /// Collecting payload bytes
    Data,
    /// A full message is buffered
    Complete,
    /// Decode buffer smaller than a header; needs [`StreamParser::reset`]
    Error,
}

/// Outcome of pushing one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No message yet
    Pending,
    /// A validated message is available from [`StreamParser::message`]
    Complete,
    /// The current frame was discarded; parsing continues
    Resync(WireError),
    /// The parser cannot continue until reset
    Failed(WireError),
}

/// Event reported by [`StreamParser::feed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseEvent<'a> {
    /// A validated message, borrowed from the decode buffer
    Message(MessageRef<'a>),
    /// A frame was discarded
    Resync(WireError),
    /// The parser entered the error state
    Failed(WireError),
}

/// Incremental parser for one byte stream
#[derive(Debug)]
pub struct StreamParser {
    state: ParserState,
    buf: BytesMut,
    capacity: usize,
    expected: usize,
    stuffed: usize,
    decoder: Decoder,
}

impl Default for StreamParser {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl StreamParser {
    /// Create a parser whose decode buffer holds `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            state: ParserState::Idle,
            buf: BytesMut::with_capacity(capacity),
            capacity,
            expected: HEADER_SIZE,
            stuffed: 0,
            decoder: Decoder::new(),
        }
    }

    /// Current state
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Decode buffer capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of decoded bytes of the current frame
    pub fn decoded_len(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial frame and clear the error state
    pub fn reset(&mut self) {
        self.begin_frame();
        self.state = ParserState::Idle;
    }

    /// The buffered message, if the last push completed one
    pub fn message(&self) -> Option<MessageRef<'_>> {
        if self.state != ParserState::Complete {
            return None;
        }
        MessageRef::parse(&self.buf).ok()
    }

    /// Consume one byte from the stream
    pub fn push(&mut self, byte: u8) -> Status {
        match self.state {
            ParserState::Error => Status::Failed(WireError::OutOfMemory(self.capacity)),
            ParserState::Idle => {
                if byte == FRAME_MARKER {
                    self.begin_frame();
                }
                Status::Pending
            }
            ParserState::Complete => {
                if byte == FRAME_MARKER {
                    self.begin_frame();
                    Status::Pending
                } else {
                    debug!("trailing bytes after complete frame, resyncing");
                    self.state = ParserState::Idle;
                    self.buf.clear();
                    Status::Resync(WireError::Framing)
                }
            }
            ParserState::Header | ParserState::Data => {
                if byte == FRAME_MARKER {
                    // Back-to-back markers delimit an empty gap, not a frame.
                    if self.stuffed == 0 {
                        return Status::Pending;
                    }
                    debug!(
                        decoded = self.buf.len(),
                        "frame marker inside frame, restarting"
                    );
                    self.begin_frame();
                    return Status::Resync(WireError::Framing);
                }
                self.stuffed += 1;
                match self.decoder.push(byte) {
                    Ok(Some(decoded)) => self.store(decoded),
                    Ok(None) => Status::Pending,
                    Err(err) => {
                        self.state = ParserState::Idle;
                        Status::Resync(err)
                    }
                }
            }
        }
    }

    /// Push a chunk of bytes, reporting every event in order.
    ///
    /// Returns the number of bytes consumed, which is less than
    /// `bytes.len()` only when the parser fails.
    pub fn feed<F>(&mut self, bytes: &[u8], mut on_event: F) -> usize
    where
        F: FnMut(ParseEvent<'_>),
    {
        for (i, &b) in bytes.iter().enumerate() {
            match self.push(b) {
                Status::Pending => {}
                Status::Complete => {
                    if let Some(msg) = self.message() {
                        on_event(ParseEvent::Message(msg));
                    }
                }
                Status::Resync(err) => on_event(ParseEvent::Resync(err)),
                Status::Failed(err) => {
                    on_event(ParseEvent::Failed(err));
                    return i + 1;
                }
            }
        }
        bytes.len()
    }

    fn begin_frame(&mut self) {
        self.state = ParserState::Header;
        self.buf.clear();
        self.expected = HEADER_SIZE;
        self.stuffed = 0;
        self.decoder.reset();
    }

    fn fail(&mut self) -> Status {
        warn!(capacity = self.capacity, "parser decode buffer exhausted");
        self.state = ParserState::Error;
        self.buf.clear();
        Status::Failed(WireError::OutOfMemory(self.capacity))
    }

    fn store(&mut self, byte: u8) -> Status {
        if self.buf.len() >= self.capacity {
            return self.fail();
        }
        self.buf.put_u8(byte);

        if self.state == ParserState::Header {
            if self.buf.len() < HEADER_SIZE {
                return Status::Pending;
            }
            self.expected = HEADER_SIZE + self.buf[LEN_OFFSET] as usize;
            if self.expected > self.capacity {
                debug!(
                    expected = self.expected,
                    capacity = self.capacity,
                    "frame longer than decode buffer, resyncing"
                );
                self.state = ParserState::Idle;
                self.buf.clear();
                return Status::Resync(WireError::BadLength(self.expected));
            }
            if self.expected > HEADER_SIZE {
                self.state = ParserState::Data;
                return Status::Pending;
            }
        } else if self.buf.len() < self.expected {
            return Status::Pending;
        }

        self.complete()
    }

    fn complete(&mut self) -> Status {
        let verified = MessageRef::parse(&self.buf).and_then(|msg| msg.verify());

        match verified {
            Ok(()) => {
                self.state = ParserState::Complete;
                Status::Complete
            }
            Err(err) => {
                debug!(error = %err, "discarding frame");
                self.state = ParserState::Idle;
                self.buf.clear();
                Status::Resync(err)
            }
        }
    }
}
