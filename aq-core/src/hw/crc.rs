//! CRC-8 used by the command sensor
//!
//! Polynomial 0x31, initial value 0xFF, MSB first, no final XOR.
//! Every 16-bit word on the wire is followed by the CRC of its two bytes.

use crate::constants::crc::{INIT, POLYNOMIAL};

/// Compute the checksum of `data`
pub fn crc8(data: &[u8]) -> u8 {
    let mut rem = INIT;
    for byte in data {
        rem ^= byte;
        for _ in 0..8 {
            rem = if rem & 0x80 != 0 {
                (rem << 1) ^ POLYNOMIAL
            } else {
                rem << 1
            };
        }
    }
    rem
}

/// A word followed by its checksum, as sent on the wire
pub fn encode_word(word: u16) -> [u8; 3] {
    let [msb, lsb] = word.to_be_bytes();
    [msb, lsb, crc8(&[msb, lsb])]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc8_datasheet_vector() {
        // Sensirion interface description: CRC(0xBEEF) = 0x92
        assert_eq!(crc8(&[0xBE, 0xEF]), 0x92);
    }

    #[test]
    fn test_crc8_empty_is_init() {
        assert_eq!(crc8(&[]), 0xFF);
    }

    #[test]
    fn test_encode_word() {
        assert_eq!(encode_word(0xBEEF), [0xBE, 0xEF, 0x92]);
        let [msb, lsb, crc] = encode_word(0x0000);
        assert_eq!((msb, lsb), (0, 0));
        assert_eq!(crc, crc8(&[0, 0]));
    }
}
