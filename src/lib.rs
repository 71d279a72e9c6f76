//! # dsmr-rs - A Rust Crate for Reading DSMR P1 Smart Meter Telegrams
//!
//! The dsmr-rs crate reads the P1 port of Dutch, Belgian and Luxembourg
//! smart meters (DSMR 2.2 to 5.0 and the ESMR profiles). A meter sends a
//! telegram every few seconds: an identification line, one line per OBIS
//! field, and a CRC-16 trailer. Some meters wrap the telegram in an
//! AES-128-GCM encrypted frame instead.
//!
//! ## Features
//!
//! - Byte-wise acquisition of plain and encrypted frames with timeouts
//! - CRC-16 validation of plain telegrams
//! - Decryption of encrypted frames with a 16 byte key
//! - A registry of the standard DSMR fields with typed values
//! - Custom bindings for any OBIS code, with debouncing
//! - Optional control of the data request line
//! - Logging through the `log` crate and error handling with `thiserror`
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! dsmr-rs = "0.1.0"
//! ```
//!
//! ```rust
//! use dsmr_rs::{DsmrConfig, DsmrHub, RecordingSink};
//! use std::time::Instant;
//!
//! let config = DsmrConfig::from_json_str(r#"{"crc_check": false, "sensors": ["power_delivered"]}"#).unwrap();
//! let mut hub = DsmrHub::from_config(&config);
//! let mut sink = RecordingSink::new();
//! let telegram = b"/ISK5\\2M550T-1012\r\n\r\n1-0:1.7.0(00.424*kW)\r\n!\r\n";
//! let readings = hub.process_telegram(telegram, Instant::now(), &mut sink).unwrap();
//! assert_eq!(readings, 1);
//! ```

pub mod config;
pub mod constants;
pub mod dsmr;
pub mod dsmr_hub;
pub mod error;
pub mod logging;
pub mod publish;
pub mod util;

pub use crate::config::{ConfigError, CustomSensorConfig, DsmrConfig};
pub use crate::dsmr_hub::{DsmrHub, HubStats, TickOutcome};
pub use crate::error::DsmrError;
pub use crate::logging::init_logger;

pub use dsmr::serial::{ByteSource, P1Port, P1Reader, P1SerialHandle, SerialConfig};
pub use dsmr::{
    FieldRegistry, FieldValue, FrameMode, ObisId, ParseOptions, ParsedTelegram, TelegramDecryptor,
    TelegramParser,
};
pub use publish::{OutputHandle, OutputKind, ReadingSink, ReadingValue, RecordingSink};

use std::time::Instant;

/// Connect to a P1 port.
///
/// # Arguments
/// * `port` - Serial port path (e.g., "/dev/ttyUSB0" on Linux, "COM3" on Windows)
///
/// # Returns
/// * `Ok(P1SerialHandle)` - Reader on the opened port
/// * `Err(DsmrError)` - The port could not be opened
pub async fn connect(port: &str) -> Result<P1SerialHandle, DsmrError> {
    P1Reader::connect(port).await
}

/// Read telegrams from `reader` and publish them until `limit` telegrams
/// were accepted, or until the port reports end of stream.
///
/// Rejected and aborted frames are logged and reading continues. Only
/// transport errors end the loop early.
///
/// # Returns
/// * `Ok(HubStats)` - Counters at the moment reading stopped
/// * `Err(DsmrError)` - The port failed
pub async fn listen<P: P1Port, K: ReadingSink>(
    reader: &mut P1Reader<P>,
    hub: &mut DsmrHub,
    sink: &mut K,
    limit: Option<usize>,
) -> Result<HubStats, DsmrError> {
    let mut accepted = 0usize;
    loop {
        reader.fill().await?;

        loop {
            match hub.tick(reader, sink, Instant::now()) {
                TickOutcome::Published { readings } => {
                    accepted += 1;
                    log::debug!("Telegram {accepted}: {readings} readings");
                }
                TickOutcome::Rejected(e) => log::debug!("Telegram rejected: {e}"),
                TickOutcome::Aborted(e) => log::debug!("Frame aborted: {e}"),
                TickOutcome::Idle | TickOutcome::Pending => break,
            }
            if limit.is_some_and(|l| accepted >= l) {
                reader.sync_request_line().await?;
                return Ok(hub.stats());
            }
            if reader.pending() == 0 {
                break;
            }
        }

        if reader.is_eof() && reader.pending() == 0 {
            log::info!("P1 port closed");
            hub.reset(reader);
            reader.sync_request_line().await?;
            return Ok(hub.stats());
        }
    }
}
