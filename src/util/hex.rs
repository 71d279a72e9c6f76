//! # Hex Helpers
//!
//! Hex conversions for decryption keys, encrypted frame dumps and log output,
//! built on the `hex` crate.
//!
//! ```rust
//! use dsmr_rs::util::hex::{decode_hex, encode_hex_upper, format_hex_compact};
//!
//! let key = decode_hex("00112233 44556677").unwrap();
//! assert_eq!(encode_hex_upper(&key), "0011223344556677");
//! assert_eq!(format_hex_compact(&[0xDB, 0x08]), "db 08");
//! ```

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

pub fn encode_hex_upper(data: &[u8]) -> String {
    hex::encode_upper(data)
}

/// Decode a hex string of either case. Whitespace is ignored, anything else
/// that is not a hex digit is an error.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(HexError::EmptyString);
    }
    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Decode a hex dump, skipping every non-hex character (separators, line
/// breaks, `0x` prefixes are not supported).
pub fn parse_hex_lenient(input: &str) -> Result<Vec<u8>, HexError> {
    let hex_chars: String = input.chars().filter(|c| c.is_ascii_hexdigit()).collect();
    if hex_chars.is_empty() {
        return Err(HexError::EmptyString);
    }
    if hex_chars.len() % 2 != 0 {
        return Err(HexError::OddLength(hex_chars.len()));
    }

    hex::decode(&hex_chars).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// `db 08 53` style, for logs.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Offset, hex and ASCII columns, `bytes_per_line` bytes per row.
pub fn pretty_hex(data: &[u8], bytes_per_line: usize) -> String {
    let width = bytes_per_line.max(1);
    data.chunks(width)
        .enumerate()
        .map(|(i, chunk)| {
            let hex: String = chunk.iter().map(|b| format!("{b:02x} ")).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!("{:04x}: {hex:<pad$}|{ascii}|", i * width, pad = width * 3)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_key_text() {
        let key = decode_hex("000102030405060708090A0B0C0D0E0F").unwrap();
        assert_eq!(key.len(), 16);
        assert_eq!(key[15], 0x0F);
        assert_eq!(decode_hex("db 08\n53").unwrap(), vec![0xDB, 0x08, 0x53]);
    }

    #[test]
    fn test_errors() {
        assert_eq!(decode_hex(""), Err(HexError::EmptyString));
        assert_eq!(decode_hex(" \t"), Err(HexError::EmptyString));
        assert_eq!(decode_hex("abc"), Err(HexError::OddLength(3)));
        assert!(matches!(decode_hex("GG"), Err(HexError::DecodeError(_))));
    }

    #[test]
    fn test_parse_lenient() {
        assert_eq!(parse_hex_lenient("DB-08:53 41").unwrap(), vec![0xDB, 0x08, 0x53, 0x41]);
        assert_eq!(parse_hex_lenient("--"), Err(HexError::EmptyString));
    }

    #[test]
    fn test_display_helpers() {
        assert_eq!(format_hex_compact(&[0x2F, 0x21]), "2f 21");
        let dump = pretty_hex(b"/AAA5\r\n", 4);
        let lines: Vec<_> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000: 2f 41 41 41"));
        assert!(lines[0].ends_with("|/AAA|"));
        assert!(lines[1].ends_with("|5..|"));
    }
}
