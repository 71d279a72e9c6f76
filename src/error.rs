//! # DSMR Error Handling
//!
//! This module defines the DsmrError enum, which gathers the error types of
//! the individual stages (framing, checksum and parsing, decryption,
//! configuration) into one type for callers of the crate.

use crate::config::ConfigError;
use crate::dsmr::acquisition::FrameError;
use crate::dsmr::encrypted::DecryptError;
use crate::dsmr::parser::ParseError;
use crate::dsmr::telegram::TelegramError;
use thiserror::Error;

/// Represents the different error types that can occur in the DSMR crate.
#[derive(Debug, Error)]
pub enum DsmrError {
    /// Indicates an error related to the serial port communication.
    #[error("Serial port error: {0}")]
    SerialPortError(String),

    /// A frame was discarded while it was being received.
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// A plain telegram failed its checksum or could not be parsed.
    #[error("Telegram rejected: {0}")]
    Telegram(#[from] TelegramError),

    /// An encrypted frame could not be opened.
    #[error("Decryption error: {0}")]
    Decrypt(#[from] DecryptError),

    /// The configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ParseError> for DsmrError {
    fn from(err: ParseError) -> Self {
        DsmrError::Telegram(TelegramError::Parse(err))
    }
}

impl DsmrError {
    /// Framing, integrity and parse errors only cost one telegram.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DsmrError::Frame(_) | DsmrError::Telegram(_) | DsmrError::Decrypt(_)
        )
    }
}
