//! # P1 Telegram Checksum
//!
//! CRC-16/ARC as used in the DSMR P1 trailer: reflected polynomial 0xA001,
//! initial value 0, no final XOR. The checksum covers every byte from the
//! leading `/` up to and including the `!` footer.

/// Reflected form of the 0x8005 polynomial
pub const CRC16_POLY: u16 = 0xA001;

/// Feed one byte into a running CRC.
#[inline]
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ byte as u16;
    for _ in 0..8 {
        if crc & 1 != 0 {
            crc = (crc >> 1) ^ CRC16_POLY;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// CRC over a whole byte range, starting from state 0.
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, &byte| crc16_update(crc, byte))
}

/// Checksum of a telegram prefix ending with `!`, formatted the way meters
/// write it into the trailer.
pub fn crc16_trailer(data: &[u8]) -> String {
    format!("{:04X}", crc16(data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_vector() {
        assert_eq!(crc16(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_empty_input_is_zero() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_running_update_matches_whole_range() {
        let data = b"/ISK5\\2M550T-1012\r\n\r\n1-0:1.8.1(000404.494*kWh)\r\n!";
        let (head, tail) = data.split_at(10);
        let partial = crc16(head);
        let resumed = tail.iter().fold(partial, |crc, &b| crc16_update(crc, b));
        assert_eq!(resumed, crc16(data));
    }

    #[test]
    fn test_trailer_is_upper_case_hex() {
        assert_eq!(crc16_trailer(b"123456789"), "BB3D");
    }
}
