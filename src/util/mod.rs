//! # Utility Modules
//!
//! Hex conversions and logging helpers used across the crate.

pub mod hex;
pub mod logging;

pub use hex::{decode_hex, encode_hex, format_hex_compact, pretty_hex};
pub use logging::{log_frame_hex, LogThrottle};
