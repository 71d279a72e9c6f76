//! DSMR P1 Protocol Constants
//!
//! This module defines constants used by the P1 telegram reader: frame
//! markers, the layout of the encrypted frame envelope, and the defaults
//! applied when a configuration value is left out.

// ----------------------------------------------------------------------------
// Plain telegram markers
// ----------------------------------------------------------------------------

/// First byte of a plain telegram (start of the identification line)
pub const DSMR_HEADER_START: u8 = b'/';

/// Footer marker, followed by the 4 hex digit CRC
pub const DSMR_FOOTER: u8 = b'!';

/// Number of hex digits in the checksum trailer
pub const DSMR_CRC_LEN: usize = 4;

/// Opening bracket of a value group
pub const DSMR_VALUE_OPEN: u8 = b'(';

/// Closing bracket of a value group
pub const DSMR_VALUE_CLOSE: u8 = b')';

/// Separator between a value and its unit
pub const DSMR_UNIT_SEPARATOR: u8 = b'*';

/// Decimal places kept by fixed-point values (thousandths)
pub const DSMR_FIXED_DECIMALS: usize = 3;

// ----------------------------------------------------------------------------
// Encrypted frame envelope
// ----------------------------------------------------------------------------

/// Start marker of an encrypted frame
pub const ENCRYPTED_START: u8 = 0xDB;

/// Type marker following the start marker
pub const ENCRYPTED_TYPE: u8 = 0x08;

/// Length of the system title
pub const ENCRYPTED_SYSTEM_TITLE_LEN: usize = 8;

/// Offset of the big-endian content length field
pub const ENCRYPTED_LENGTH_OFFSET: usize = 11;

/// Length of the frame counter
pub const ENCRYPTED_FRAME_COUNTER_LEN: usize = 4;

/// Bytes needed before the total frame length is known
pub const ENCRYPTED_LENGTH_KNOWN_AT: usize = 13;

/// Fixed header size; ciphertext starts here
pub const ENCRYPTED_HEADER_LEN: usize = 18;

/// GCM authentication tag length used by DSMR meters
pub const GCM_TAG_LEN: usize = 12;

/// GCM nonce length (system title + frame counter)
pub const GCM_NONCE_LEN: usize = 12;

/// AES-128 key length in bytes
pub const DECRYPTION_KEY_LEN: usize = 16;

/// Length of the key when written as hex
pub const DECRYPTION_KEY_HEX_LEN: usize = 32;

// ----------------------------------------------------------------------------
// Defaults
// ----------------------------------------------------------------------------

/// Default telegram buffer capacity
pub const DEFAULT_MAX_TELEGRAM_LENGTH: usize = 1500;

/// Default inter-byte receive timeout
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 200;

/// Default time between poll cycles (0 = poll continuously)
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 0;

/// Default M-Bus channel ids of sub-meters attached to the P1 meter
pub const DEFAULT_GAS_MBUS_ID: u8 = 1;
pub const DEFAULT_WATER_MBUS_ID: u8 = 2;
pub const DEFAULT_THERMAL_MBUS_ID: u8 = 3;
pub const DEFAULT_SUB_MBUS_ID: u8 = 4;

/// DSMR 4.x / 5.x P1 ports run 115200 8N1
pub const P1_DEFAULT_BAUDRATE: u32 = 115_200;

// ----------------------------------------------------------------------------
// Custom binding debounce
// ----------------------------------------------------------------------------

/// Minimum time between two publishes of an unchanged custom reading
pub const CUSTOM_MIN_PUBLISH_INTERVAL_MS: u64 = 5000;

/// Numeric change that counts as a new custom reading
pub const CUSTOM_FLOAT_TOLERANCE: f64 = 0.001;
