//! # DSMR P1 Protocol
//!
//! Everything needed to turn the P1 byte stream into field values: checksum,
//! primitive parsers, the field registry, the telegram parser, the encrypted
//! frame envelope, the acquisition state machine and the serial transport.

pub mod acquisition;
pub mod crc16;
pub mod encrypted;
pub mod fields;
pub mod obis;
pub mod parser;
pub mod serial;
pub mod serial_mock;
pub mod telegram;

pub use acquisition::{
    AcquisitionConfig, AcquisitionState, AcquisitionStats, FrameError, FrameMode, PushOutcome,
    TelegramAcquisition,
};
pub use crc16::{crc16, crc16_update};
pub use encrypted::{encrypt_frame, DecryptError, DecryptionKey, EncryptedFrameHeader, TelegramDecryptor};
pub use fields::{FieldDescriptor, FieldParser, FieldRegistry, FieldValue, FixedValue, MbusChannels};
pub use obis::ObisId;
pub use parser::{ParseError, ParseResult, Parsed};
pub use serial::{ByteSource, P1Port, P1Reader, P1SerialHandle, SerialConfig};
pub use telegram::{ParseOptions, ParsedTelegram, TelegramError, TelegramParser};
