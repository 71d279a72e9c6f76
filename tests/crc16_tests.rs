//! Unit tests for the P1 telegram checksum.

use crc::{Crc, CRC_16_ARC};
use dsmr_rs::dsmr::crc16::{crc16, crc16_trailer, crc16_update};

const ARC: Crc<u16> = Crc::<u16>::new(&CRC_16_ARC);

/// Tests that the standard check string gives the catalogue value.
#[test]
fn test_check_value() {
    assert_eq!(crc16(b"123456789"), 0xBB3D);
    assert_eq!(crc16(b""), 0);
}

/// Tests that the checksum agrees with an independent CRC-16/ARC implementation.
#[test]
fn test_matches_reference_implementation() {
    let inputs: [&[u8]; 4] = [
        b"/",
        b"/KFM5KAIFA-METER\r\n\r\n1-3:0.2.8(42)\r\n!",
        b"/ISK5\\2M550T-1012\r\n\r\n1-0:1.8.1(001234.567*kWh)\r\n!",
        &[0x00, 0xFF, 0x80, 0x7F, 0x55, 0xAA],
    ];
    for input in inputs {
        assert_eq!(crc16(input), ARC.checksum(input), "input {input:?}");
    }
}

/// Tests that feeding bytes one at a time gives the same result as the whole range.
#[test]
fn test_incremental_update() {
    let data = b"/AAA5MTR\r\n\r\n0-0:96.1.1(12345678)\r\n!";
    let running = data.iter().fold(0u16, |crc, &b| crc16_update(crc, b));
    assert_eq!(running, crc16(data));
}

/// Tests that the trailer is four upper-case hex digits.
#[test]
fn test_trailer_format() {
    let trailer = crc16_trailer(b"123456789");
    assert_eq!(trailer, "BB3D");
    assert_eq!(crc16_trailer(b""), "0000");
}
