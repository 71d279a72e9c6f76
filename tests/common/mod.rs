//! Shared telegram fixtures for the integration tests.

#![allow(dead_code)]

use dsmr_rs::dsmr::crc16::crc16_trailer;
use dsmr_rs::dsmr::encrypted::{encrypt_frame, DecryptionKey};

pub const KEY_HEX: &str = "000102030405060708090A0B0C0D0E0F";
pub const SYSTEM_TITLE: [u8; 8] = *b"SAG\x05\x00\x00\x00\x01";

/// A DSMR 5.0 telegram body, up to and including `!`.
pub const SAMPLE_BODY: &str = "/ISK5\\2M550T-1012\r\n\
\r\n\
1-3:0.2.8(50)\r\n\
0-0:1.0.0(230101120000W)\r\n\
0-0:96.1.1(4530303434303037313331363530313137)\r\n\
1-0:1.8.1(001234.567*kWh)\r\n\
1-0:1.8.2(002345.678*kWh)\r\n\
1-0:2.8.1(000012.345*kWh)\r\n\
1-0:2.8.2(000023.456*kWh)\r\n\
0-0:96.14.0(0002)\r\n\
1-0:1.7.0(00.424*kW)\r\n\
1-0:2.7.0(00.000*kW)\r\n\
0-0:96.7.21(00005)\r\n\
0-0:96.7.9(00002)\r\n\
1-0:32.7.0(230.1*V)\r\n\
1-0:31.7.0(002*A)\r\n\
0-1:24.1.0(003)\r\n\
0-1:24.2.1(230101115500W)(00987.654*m3)\r\n\
!";

/// Append the CRC trailer and line break to a telegram body.
pub fn with_crc(body: &str) -> Vec<u8> {
    let mut out = body.as_bytes().to_vec();
    out.extend_from_slice(crc16_trailer(body.as_bytes()).as_bytes());
    out.extend_from_slice(b"\r\n");
    out
}

pub fn sample_telegram() -> Vec<u8> {
    with_crc(SAMPLE_BODY)
}

pub fn key() -> DecryptionKey {
    DecryptionKey::from_hex(KEY_HEX).unwrap()
}

/// Wrap `plaintext` into an encrypted frame under the test key.
pub fn encrypted(plaintext: &[u8], counter: u32) -> Vec<u8> {
    encrypt_frame(&key(), SYSTEM_TITLE, counter, plaintext).unwrap()
}
