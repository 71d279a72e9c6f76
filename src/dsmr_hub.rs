//! # DSMR Hub
//!
//! This module provides the DsmrHub struct, which serves as the main entry
//! point of the crate. It owns the acquisition state machine, the field
//! registry, the optional decryptor and the publisher, and moves one poll
//! tick at a time:
//!
//! ```text
//! ByteSource -> TelegramAcquisition -> (checksum | decrypt) -> TelegramParser -> ReadingPublisher -> ReadingSink
//! ```
//!
//! Nothing here blocks. A tick consumes the bytes the source has buffered,
//! stops right after a completed frame, and leaves the rest for the next tick.

use crate::config::DsmrConfig;
use crate::dsmr::acquisition::{
    AcquisitionConfig, AcquisitionStats, FrameError, FrameMode, PushOutcome, TelegramAcquisition,
};
use crate::dsmr::encrypted::{DecryptionKey, TelegramDecryptor};
use crate::dsmr::fields::FieldRegistry;
use crate::dsmr::serial::ByteSource;
use crate::dsmr::telegram::{ParseOptions, TelegramError, TelegramParser};
use crate::error::DsmrError;
use crate::log_warn_throttled;
use crate::publish::bindings::BindingRegistry;
use crate::publish::publisher::ReadingPublisher;
use crate::publish::{OutputTable, ReadingSink};
use crate::util::logging::{log_frame_hex, log_telegram_text, LogThrottle};
use bytes::BytesMut;
use std::time::Instant;

/// Counters over the lifetime of a hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub acquisition: AcquisitionStats,
    pub accepted: u64,
    pub checksum_failures: u64,
    pub decrypt_failures: u64,
    pub parse_failures: u64,
}

/// What one tick achieved.
#[derive(Debug)]
pub enum TickOutcome {
    /// No poll cycle is active
    Idle,
    /// A cycle is active and waiting for more bytes
    Pending,
    /// A telegram was accepted
    Published { readings: usize },
    /// A complete frame failed integrity or parsing
    Rejected(DsmrError),
    /// The frame in progress was discarded
    Aborted(FrameError),
}

/// Reads telegrams and publishes their readings.
#[derive(Debug)]
pub struct DsmrHub {
    registry: FieldRegistry,
    options: ParseOptions,
    acquisition: TelegramAcquisition,
    decryptor: Option<TelegramDecryptor>,
    plaintext: BytesMut,
    publisher: ReadingPublisher,
    outputs: OutputTable,
    stats: HubStats,
    warn_throttle: LogThrottle,
}

impl DsmrHub {
    /// Build a hub from configuration. Invalid settings are logged once and
    /// fall back as documented on [`DsmrConfig`].
    pub fn from_config(config: &DsmrConfig) -> Self {
        for problem in config.validate_settings() {
            log::error!("{problem}");
        }
        let key = config.decryption_key().unwrap_or_else(|e| {
            log::error!("{e}, decryption disabled");
            None
        });

        let registry = config.field_registry();
        let outputs = config.bindings(&registry);
        let bindings = BindingRegistry::resolve(&registry, &outputs.standard, outputs.custom);
        let publisher = ReadingPublisher::new(bindings, config.telegram);

        let mut hub = Self::new(
            registry,
            config.parse_options(),
            config.acquisition(),
            key.as_ref(),
            publisher,
        );
        hub.outputs = outputs.table;
        hub
    }

    pub fn new(
        registry: FieldRegistry,
        options: ParseOptions,
        acquisition: AcquisitionConfig,
        key: Option<&DecryptionKey>,
        publisher: ReadingPublisher,
    ) -> Self {
        let decryptor = key.map(TelegramDecryptor::new);
        let mode = if decryptor.is_some() {
            FrameMode::Encrypted
        } else {
            FrameMode::Plain
        };
        let plaintext = if decryptor.is_some() {
            BytesMut::with_capacity(acquisition.max_telegram_length)
        } else {
            BytesMut::new()
        };
        log::debug!(
            "DSMR hub: {} fields, {:?} frames, buffer {} bytes",
            registry.len(),
            mode,
            acquisition.max_telegram_length
        );

        Self {
            registry,
            options,
            acquisition: TelegramAcquisition::new(mode, acquisition),
            decryptor,
            plaintext,
            publisher,
            outputs: OutputTable::new(),
            stats: HubStats::default(),
            warn_throttle: LogThrottle::new(1000, 5),
        }
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn outputs(&self) -> &OutputTable {
        &self.outputs
    }

    pub fn publisher(&self) -> &ReadingPublisher {
        &self.publisher
    }

    pub fn acquisition(&self) -> &TelegramAcquisition {
        &self.acquisition
    }

    pub fn mode(&self) -> FrameMode {
        self.acquisition.mode()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            acquisition: self.acquisition.stats(),
            ..self.stats
        }
    }

    /// Drop any frame in progress and close the poll cycle.
    pub fn reset<S: ByteSource>(&mut self, source: &mut S) {
        self.acquisition.reset();
        source.set_request(false);
    }

    /// Run one poll tick against `source` at time `now`.
    pub fn tick<S: ByteSource, K: ReadingSink>(
        &mut self,
        source: &mut S,
        sink: &mut K,
        now: Instant,
    ) -> TickOutcome {
        if self.acquisition.begin_cycle(now) {
            source.set_request(true);
        }
        if !self.acquisition.is_requesting() {
            if !source.has_request_line() {
                let discarded = source.discard_pending();
                if discarded > 0 {
                    log::trace!("Discarded {discarded} bytes outside a poll cycle");
                }
            }
            return TickOutcome::Idle;
        }

        while let Some(byte) = source.read_byte() {
            match self.acquisition.push(byte, now) {
                PushOutcome::Ignored | PushOutcome::NeedMore => {}
                PushOutcome::FrameComplete(mode) => {
                    let outcome = self.process_frame(mode, now, sink);
                    self.acquisition.finish();
                    source.set_request(false);
                    return outcome;
                }
                PushOutcome::Aborted(error) => {
                    source.set_request(false);
                    return TickOutcome::Aborted(error);
                }
            }
        }

        match self.acquisition.check_timeout(now) {
            Some(error) => {
                source.set_request(false);
                TickOutcome::Aborted(error)
            }
            None => TickOutcome::Pending,
        }
    }

    fn process_frame<K: ReadingSink>(&mut self, mode: FrameMode, now: Instant, sink: &mut K) -> TickOutcome {
        let Some(frame) = self.acquisition.frame() else {
            return TickOutcome::Pending;
        };

        let telegram: &[u8] = match (mode, self.decryptor.as_ref()) {
            (FrameMode::Plain, _) => frame,
            (FrameMode::Encrypted, Some(decryptor)) => {
                match decryptor.decrypt_into(frame, &mut self.plaintext) {
                    Ok(header) => {
                        log::debug!(
                            "Decrypted frame {} ({} bytes)",
                            header.frame_counter(),
                            self.plaintext.len()
                        );
                        &self.plaintext
                    }
                    Err(e) => {
                        self.stats.decrypt_failures += 1;
                        log_frame_hex("Rejected encrypted frame", frame);
                        log_warn_throttled!(self.warn_throttle, "{e}");
                        return TickOutcome::Rejected(e.into());
                    }
                }
            }
            (FrameMode::Encrypted, None) => return TickOutcome::Pending,
        };

        match accept_telegram(
            &self.registry,
            self.options,
            &mut self.publisher,
            &mut self.stats,
            &mut self.warn_throttle,
            telegram,
            now,
            sink,
        ) {
            Ok(readings) => TickOutcome::Published { readings },
            Err(e) => TickOutcome::Rejected(e),
        }
    }

    /// Check, parse and publish one complete plain telegram.
    pub fn process_telegram<K: ReadingSink>(
        &mut self,
        telegram: &[u8],
        now: Instant,
        sink: &mut K,
    ) -> Result<usize, DsmrError> {
        accept_telegram(
            &self.registry,
            self.options,
            &mut self.publisher,
            &mut self.stats,
            &mut self.warn_throttle,
            telegram,
            now,
            sink,
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn accept_telegram<K: ReadingSink>(
    registry: &FieldRegistry,
    options: ParseOptions,
    publisher: &mut ReadingPublisher,
    stats: &mut HubStats,
    throttle: &mut LogThrottle,
    telegram: &[u8],
    now: Instant,
    sink: &mut K,
) -> Result<usize, DsmrError> {
    log_telegram_text("Received telegram", telegram);
    let text = String::from_utf8_lossy(telegram);
    let result = match TelegramParser::new(registry, options).parse(telegram) {
        Ok(parsed) => {
            stats.accepted += 1;
            let standard = publisher.publish_standard(registry, &parsed, sink);
            let custom = publisher.publish_custom(&text, now, sink);
            log::debug!(
                "Telegram accepted: {} fields present, {} readings published",
                parsed.present_count(),
                standard + custom
            );
            Ok(standard + custom)
        }
        Err(e) => {
            match &e {
                TelegramError::ChecksumMismatch { .. } => {
                    stats.checksum_failures += 1;
                    log_warn_throttled!(throttle, "{e}");
                }
                TelegramError::Parse(_) => {
                    stats.parse_failures += 1;
                    log_warn_throttled!(throttle, "Telegram parse error:\r\n{}", e.full_error(telegram));
                }
            }
            Err(DsmrError::from(e))
        }
    };
    publisher.publish_raw(&text, sink);
    result
}
