//! Consistent Overhead Byte Stuffing.
//!
//! Encoded blocks never contain `0x00`, which leaves that value free to mark
//! frame boundaries on the byte stream.

use crate::WireError;
use bytes::{BufMut, BytesMut};

/// Frame boundary marker
pub const FRAME_MARKER: u8 = 0x00;

const MAX_BLOCK: u8 = 0xFF;

/// Worst-case encoded size for `len` input bytes
pub const fn max_encoded_len(len: usize) -> usize {
    len + len / (MAX_BLOCK as usize - 1) + 1
}

/// Append the stuffed form of `input` to `out`
pub fn encode(input: &[u8], out: &mut BytesMut) {
    let mut code_idx = out.len();
    out.put_u8(0);
    let mut code: u8 = 1;

    for (i, &b) in input.iter().enumerate() {
        if b == 0 {
            out[code_idx] = code;
            code_idx = out.len();
            out.put_u8(0);
            code = 1;
            continue;
        }

        out.put_u8(b);
        code += 1;
        // A full block only opens a new one when more input follows.
        if code == MAX_BLOCK && i + 1 < input.len() {
            out[code_idx] = code;
            code_idx = out.len();
            out.put_u8(0);
            code = 1;
        }
    }

    out[code_idx] = code;
}

/// Decode a stuffed block sequence (without markers)
pub fn decode(input: &[u8], out: &mut BytesMut) -> Result<(), WireError> {
    let mut decoder = Decoder::new();
    for &b in input {
        if let Some(byte) = decoder.push(b)? {
            out.put_u8(byte);
        }
    }
    decoder.finish()
}

/// Incremental decoder, one stuffed byte at a time
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    remaining: u8,
    zero_due: bool,
}

impl Decoder {
    /// Create a decoder positioned at the start of a frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to the start of a frame
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Consume one stuffed byte, returning the decoded byte it yields, if any
    pub fn push(&mut self, byte: u8) -> Result<Option<u8>, WireError> {
        if byte == FRAME_MARKER {
            return Err(WireError::Framing);
        }

        if self.remaining == 0 {
            // Code byte: the zero owed by the previous block is due now that
            // the frame continues.
            let out = self.zero_due.then_some(0);
            self.remaining = byte - 1;
            self.zero_due = byte != MAX_BLOCK;
            return Ok(out);
        }

        self.remaining -= 1;
        Ok(Some(byte))
    }

    /// Check that the frame ended on a block boundary
    pub fn finish(&self) -> Result<(), WireError> {
        if self.remaining == 0 {
            Ok(())
        } else {
            Err(WireError::Framing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(input: &[u8]) -> Vec<u8> {
        let mut enc = BytesMut::new();
        encode(input, &mut enc);
        assert!(!enc.contains(&FRAME_MARKER));
        assert!(enc.len() <= max_encoded_len(input.len()));
        let mut dec = BytesMut::new();
        decode(&enc, &mut dec).unwrap();
        dec.to_vec()
    }

    #[test]
    fn test_known_vectors() {
        let mut enc = BytesMut::new();
        encode(&[0x11, 0x22, 0x00, 0x33], &mut enc);
        assert_eq!(&enc[..], &[0x03, 0x11, 0x22, 0x02, 0x33]);

        let mut enc = BytesMut::new();
        encode(&[0x00], &mut enc);
        assert_eq!(&enc[..], &[0x01, 0x01]);

        let mut enc = BytesMut::new();
        encode(&[], &mut enc);
        assert_eq!(&enc[..], &[0x01]);
    }

    #[test]
    fn test_long_runs() {
        let data: Vec<u8> = (1..=254).collect();
        let mut enc = BytesMut::new();
        encode(&data, &mut enc);
        assert_eq!(enc[0], 0xFF);
        assert_eq!(enc.len(), 255);
        assert_eq!(round_trip(&data), data);

        let data: Vec<u8> = (0..600).map(|i| (i % 255 + 1) as u8).collect();
        assert_eq!(round_trip(&data), data);
    }

    #[test]
    fn test_zeros() {
        assert_eq!(round_trip(&[0, 0, 0]), vec![0, 0, 0]);
        assert_eq!(round_trip(&[1, 0]), vec![1, 0]);
    }

    #[test]
    fn test_truncated_block() {
        let mut out = BytesMut::new();
        assert_eq!(decode(&[0x05, 0x11], &mut out), Err(WireError::Framing));
    }

    #[test]
    fn test_marker_inside_block() {
        let mut out = BytesMut::new();
        assert_eq!(decode(&[0x03, 0x00, 0x11], &mut out), Err(WireError::Framing));
    }
}
