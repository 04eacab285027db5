//! Link transports.
//!
//! A [`Transport`] moves raw bytes over one point-to-point link. Drivers for
//! real hardware live outside this crate; [`PipeTransport`] is an in-memory
//! link for simulations and tests.

use bytes::{Buf, BytesMut};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Transport failures
#[derive(Error, Debug)]
pub enum TransportError {
    /// The link cannot take more bytes right now
    #[error("link buffer full ({capacity} bytes)")]
    Full {
        /// Link buffer size
        capacity: usize,
    },

    /// The link is gone
    #[error("link closed")]
    Closed,

    /// Driver I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Byte-level access to one link
pub trait Transport: Send {
    /// Send all of `bytes`, or fail without sending any
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Copy pending bytes into `buf`, returning how many were written
    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

type Pipe = Arc<Mutex<BytesMut>>;

/// One end of an in-memory duplex link
#[derive(Debug, Clone)]
pub struct PipeTransport {
    outgoing: Pipe,
    incoming: Pipe,
    capacity: usize,
}

impl PipeTransport {
    /// Create both ends of a link, each direction buffering `capacity` bytes
    pub fn pair(capacity: usize) -> (Self, Self) {
        let a_to_b: Pipe = Arc::new(Mutex::new(BytesMut::with_capacity(capacity)));
        let b_to_a: Pipe = Arc::new(Mutex::new(BytesMut::with_capacity(capacity)));
        (
            Self {
                outgoing: a_to_b.clone(),
                incoming: b_to_a.clone(),
                capacity,
            },
            Self {
                outgoing: b_to_a,
                incoming: a_to_b,
                capacity,
            },
        )
    }

    /// Bytes waiting to be received on this end
    pub fn pending(&self) -> usize {
        self.incoming.lock().map(|buf| buf.len()).unwrap_or(0)
    }
}

impl Transport for PipeTransport {
    fn transmit(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut out = self.outgoing.lock().map_err(|_| TransportError::Closed)?;
        if out.len() + bytes.len() > self.capacity {
            return Err(TransportError::Full {
                capacity: self.capacity,
            });
        }
        out.extend_from_slice(bytes);
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut incoming = self.incoming.lock().map_err(|_| TransportError::Closed)?;
        let n = incoming.len().min(buf.len());
        buf[..n].copy_from_slice(&incoming[..n]);
        incoming.advance(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_duplex() {
        let (mut a, mut b) = PipeTransport::pair(64);
        a.transmit(b"to b").unwrap();
        b.transmit(b"to a").unwrap();
        assert_eq!(b.pending(), 4);

        let mut buf = [0u8; 16];
        let n = b.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"to b");
        let n = a.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"to a");
        assert_eq!(a.receive(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_pipe_partial_reads() {
        let (mut a, mut b) = PipeTransport::pair(64);
        a.transmit(b"abcdef").unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(b.receive(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(b.receive(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_pipe_full() {
        let (mut a, _b) = PipeTransport::pair(8);
        a.transmit(b"12345").unwrap();
        assert!(matches!(
            a.transmit(b"6789"),
            Err(TransportError::Full { capacity: 8 })
        ));
        a.transmit(b"678").unwrap();
    }
}
