//! CRC-8 checksum used by the message header.
//!
//! Polynomial 0x07 (x^8 + x^2 + x + 1), initial value 0x00, no reflection and
//! no final xor (CRC-8/SMBUS). Both ends of a link must agree; there is no
//! negotiation.

/// Generator polynomial
pub const CRC8_POLY: u8 = 0x07;

const TABLE: [u8; 256] = build_table();

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Incremental CRC-8 hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Crc8 {
    state: u8,
}

impl Crc8 {
    /// Create a new hasher
    pub fn new() -> Self {
        Self { state: 0 }
    }

    /// Feed bytes into the hasher
    pub fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state = TABLE[(self.state ^ b) as usize];
        }
    }

    /// Current checksum
    pub fn finalize(self) -> u8 {
        self.state
    }
}

/// One-shot checksum of a byte slice
pub fn crc8(bytes: &[u8]) -> u8 {
    let mut hasher = Crc8::new();
    hasher.update(bytes);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_value() {
        // Standard check input for CRC catalogues
        assert_eq!(crc8(b"123456789"), 0xF4);
    }

    #[test]
    fn test_empty() {
        assert_eq!(crc8(&[]), 0x00);
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let data = b"linkmesh incremental";
        let mut hasher = Crc8::new();
        hasher.update(&data[..7]);
        hasher.update(&data[7..]);
        assert_eq!(hasher.finalize(), crc8(data));
    }

    #[test]
    fn test_single_bit_flips_detected() {
        let data = [0x04u8, 0x02, 0x01, 0x00, 0x03, 0xAA, 0x55, 0x00];
        let reference = crc8(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = data;
                flipped[byte] ^= 1 << bit;
                assert_ne!(crc8(&flipped), reference);
            }
        }
    }
}
