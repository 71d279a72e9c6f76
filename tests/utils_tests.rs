//! Unit tests for the hex helpers in the `util` module.

use dsmr_rs::util::hex::{decode_hex, encode_hex, encode_hex_upper, parse_hex_lenient, HexError};

/// Tests that encoding picks the requested case.
#[test]
fn test_encode_case() {
    let data = [0xDB, 0x08, 0x30];
    assert_eq!(encode_hex(&data), "db0830");
    assert_eq!(encode_hex_upper(&data), "DB0830");
}

/// Tests that a decryption key string decodes to 16 bytes.
#[test]
fn test_decode_key() {
    let key = decode_hex("AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA").unwrap();
    assert_eq!(key, vec![0xAA; 16]);
}

/// Tests that a frame dump with separators is read leniently.
#[test]
fn test_parse_frame_dump() {
    let dump = "DB 08 53 41 47 05\n00 00 00 01";
    assert_eq!(
        parse_hex_lenient(dump).unwrap(),
        vec![0xDB, 0x08, 0x53, 0x41, 0x47, 0x05, 0x00, 0x00, 0x00, 0x01]
    );
    assert_eq!(parse_hex_lenient("DB 0"), Err(HexError::OddLength(3)));
}
