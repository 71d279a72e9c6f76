//! # Telegram Acquisition
//!
//! Byte-at-a-time state machine that recovers frame boundaries from the P1
//! byte stream. The framing mode is fixed when the machine is built:
//!
//! ```text
//! plain:      Idle -> AwaitingHeader -('/')-> Accumulating ----------> Complete
//! encrypted:  Idle -> AwaitingHeader -(0xDB)-> AccumulatingEncrypted -> Complete
//!                          |                        |
//!                          +------ TimedOut <-------+
//! ```
//!
//! Acquisition happens inside a poll cycle. [`TelegramAcquisition::begin_cycle`]
//! opens one when the request interval allows it; every completed frame,
//! framing error or timeout closes it again. Time is passed in by the caller
//! so the machine itself never reads a clock.

use crate::constants::{
    DSMR_FOOTER, DSMR_HEADER_START, DSMR_VALUE_OPEN, ENCRYPTED_HEADER_LEN,
    ENCRYPTED_LENGTH_KNOWN_AT, ENCRYPTED_LENGTH_OFFSET, ENCRYPTED_START, ENCRYPTED_TYPE,
    GCM_TAG_LEN,
};
use crate::log_warn_throttled;
use crate::util::logging::LogThrottle;
use bytes::BytesMut;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Framing errors. All of them discard the frame in progress.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Telegram larger than buffer ({capacity} bytes)")]
    BufferOverflow { capacity: usize },

    #[error("Invalid encrypted frame header: {start:02X}{kind:02X}, expected DB08")]
    InvalidHeader { start: u8, kind: u8 },

    #[error("Encrypted frame length {total} exceeds buffer ({capacity} bytes)")]
    FrameTooLarge { total: usize, capacity: usize },

    #[error("Encrypted frame announces an empty payload")]
    EmptyPayload,

    #[error("Timeout waiting for {waiting_for} after {elapsed_ms} ms")]
    Timeout {
        waiting_for: &'static str,
        elapsed_ms: u64,
    },
}

/// How frames are delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameMode {
    /// `/` ... `!CRC` text telegrams
    Plain,
    /// Length-prefixed AES-GCM envelopes
    Encrypted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    Idle,
    AwaitingHeader,
    Accumulating,
    AccumulatingEncrypted,
    Complete,
    TimedOut,
}

/// Result of feeding one byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// No poll cycle is active, or the byte was noise before a header
    Ignored,
    NeedMore,
    /// A whole frame is buffered; read it with [`TelegramAcquisition::frame`]
    FrameComplete(FrameMode),
    Aborted(FrameError),
}

/// Fixed capacity frame buffer.
#[derive(Debug, Clone)]
pub struct RawBuffer {
    data: BytesMut,
    capacity: usize,
}

impl RawBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.data.len() >= self.capacity
    }

    /// Append a byte; refused when the buffer is full.
    pub fn push(&mut self, byte: u8) -> bool {
        if self.is_full() {
            return false;
        }
        self.data.extend_from_slice(&[byte]);
        true
    }

    pub fn last(&self) -> Option<u8> {
        self.data.last().copied()
    }

    /// Drop CR/LF bytes at the end of the buffer, returning how many went.
    pub fn strip_trailing_line_breaks(&mut self) -> usize {
        let kept = self
            .data
            .iter()
            .rposition(|&b| b != b'\r' && b != b'\n')
            .map_or(0, |p| p + 1);
        let removed = self.data.len() - kept;
        self.data.truncate(kept);
        removed
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }
}

/// Timing and sizing of acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquisitionConfig {
    pub max_telegram_length: usize,
    /// Zero disables both timeouts
    pub receive_timeout: Duration,
    /// Minimum time between the starts of two poll cycles
    pub request_interval: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            max_telegram_length: crate::constants::DEFAULT_MAX_TELEGRAM_LENGTH,
            receive_timeout: Duration::from_millis(crate::constants::DEFAULT_RECEIVE_TIMEOUT_MS),
            request_interval: Duration::from_millis(crate::constants::DEFAULT_REQUEST_INTERVAL_MS),
        }
    }
}

/// Counters kept across frames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub frames_completed: u64,
    pub overflows: u64,
    pub header_errors: u64,
    pub timeouts: u64,
}

fn is_line_break(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

#[derive(Debug)]
pub struct TelegramAcquisition {
    mode: FrameMode,
    config: AcquisitionConfig,
    state: AcquisitionState,
    buffer: RawBuffer,
    footer_found: bool,
    encrypted_total: Option<usize>,
    requesting: bool,
    last_request: Option<Instant>,
    last_read: Option<Instant>,
    stats: AcquisitionStats,
    error_throttle: LogThrottle,
}

impl TelegramAcquisition {
    pub fn new(mode: FrameMode, config: AcquisitionConfig) -> Self {
        Self {
            mode,
            config,
            state: AcquisitionState::Idle,
            buffer: RawBuffer::with_capacity(config.max_telegram_length),
            footer_found: false,
            encrypted_total: None,
            requesting: false,
            last_request: None,
            last_read: None,
            stats: AcquisitionStats::default(),
            error_throttle: LogThrottle::new(1000, 5),
        }
    }

    pub fn mode(&self) -> FrameMode {
        self.mode
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn is_requesting(&self) -> bool {
        self.requesting
    }

    /// Bytes of the frame in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn request_interval_reached(&self, now: Instant) -> bool {
        match self.last_request {
            None => true,
            Some(_) if self.config.request_interval.is_zero() => true,
            Some(last) => now.saturating_duration_since(last) >= self.config.request_interval,
        }
    }

    /// Open a poll cycle if none is active and the request interval has
    /// passed. Returns `true` when a new cycle was started.
    pub fn begin_cycle(&mut self, now: Instant) -> bool {
        if self.requesting || !self.request_interval_reached(now) {
            return false;
        }
        log::trace!("Starting P1 poll cycle");
        self.clear_frame();
        self.requesting = true;
        self.last_request = Some(now);
        self.last_read = Some(now);
        self.state = AcquisitionState::AwaitingHeader;
        true
    }

    /// Feed one byte received at `now`.
    pub fn push(&mut self, byte: u8, now: Instant) -> PushOutcome {
        if !self.requesting {
            return PushOutcome::Ignored;
        }
        self.last_read = Some(now);

        match self.state {
            AcquisitionState::AwaitingHeader => self.await_header(byte),
            AcquisitionState::Accumulating => self.accumulate_plain(byte),
            AcquisitionState::AccumulatingEncrypted => self.accumulate_encrypted(byte),
            AcquisitionState::Idle | AcquisitionState::Complete | AcquisitionState::TimedOut => {
                PushOutcome::Ignored
            }
        }
    }

    fn await_header(&mut self, byte: u8) -> PushOutcome {
        match (self.mode, byte) {
            (FrameMode::Plain, DSMR_HEADER_START) => {
                log::trace!("Header of plain telegram found");
                self.start_frame(byte, AcquisitionState::Accumulating)
            }
            (FrameMode::Encrypted, ENCRYPTED_START) => {
                log::trace!("Start byte of encrypted frame found");
                self.start_frame(byte, AcquisitionState::AccumulatingEncrypted)
            }
            _ => PushOutcome::Ignored,
        }
    }

    fn start_frame(&mut self, byte: u8, state: AcquisitionState) -> PushOutcome {
        self.clear_frame();
        if !self.buffer.push(byte) {
            return self.abort(FrameError::BufferOverflow {
                capacity: self.buffer.capacity(),
            });
        }
        self.state = state;
        PushOutcome::NeedMore
    }

    fn accumulate_plain(&mut self, byte: u8) -> PushOutcome {
        // A header at the start of a line means the previous frame was cut off
        if byte == DSMR_HEADER_START && self.buffer.last().map_or(false, is_line_break) {
            log::debug!(
                "New telegram header after {} bytes, discarding partial frame",
                self.buffer.len()
            );
            return self.start_frame(byte, AcquisitionState::Accumulating);
        }
        if self.buffer.is_full() {
            return self.abort(FrameError::BufferOverflow {
                capacity: self.buffer.capacity(),
            });
        }
        if byte == DSMR_VALUE_OPEN {
            let removed = self.buffer.strip_trailing_line_breaks();
            if removed > 0 {
                log::trace!("Removed {removed} CR/LF bytes before '('");
            }
        }
        self.buffer.push(byte);

        if byte == DSMR_FOOTER {
            self.footer_found = true;
            log::trace!("Footer of plain telegram found");
        } else if self.footer_found && is_line_break(byte) {
            return self.complete(FrameMode::Plain);
        }
        PushOutcome::NeedMore
    }

    fn accumulate_encrypted(&mut self, byte: u8) -> PushOutcome {
        if self.buffer.is_full() {
            return self.abort(FrameError::BufferOverflow {
                capacity: self.buffer.capacity(),
            });
        }
        self.buffer.push(byte);
        let len = self.buffer.len();
        let frame = self.buffer.as_slice();
        let (start, kind) = (frame[0], frame.get(1).copied().unwrap_or(ENCRYPTED_TYPE));

        if len == 2 && kind != ENCRYPTED_TYPE {
            return self.abort(FrameError::InvalidHeader { start, kind });
        }

        if self.encrypted_total.is_none() && len >= ENCRYPTED_LENGTH_KNOWN_AT {
            if start != ENCRYPTED_START || kind != ENCRYPTED_TYPE {
                return self.abort(FrameError::InvalidHeader { start, kind });
            }
            let content = u16::from_be_bytes([
                frame[ENCRYPTED_LENGTH_OFFSET],
                frame[ENCRYPTED_LENGTH_OFFSET + 1],
            ]) as usize;
            if content == 0 {
                return self.abort(FrameError::EmptyPayload);
            }
            let total = ENCRYPTED_HEADER_LEN + content + GCM_TAG_LEN;
            if total > self.buffer.capacity() {
                return self.abort(FrameError::FrameTooLarge {
                    total,
                    capacity: self.buffer.capacity(),
                });
            }
            log::trace!("Encrypted frame length: {total} bytes");
            self.encrypted_total = Some(total);
        }

        match self.encrypted_total {
            Some(total) if len >= total => self.complete(FrameMode::Encrypted),
            _ => PushOutcome::NeedMore,
        }
    }

    fn complete(&mut self, mode: FrameMode) -> PushOutcome {
        log::trace!("Frame complete: {} bytes", self.buffer.len());
        self.state = AcquisitionState::Complete;
        self.stats.frames_completed += 1;
        PushOutcome::FrameComplete(mode)
    }

    fn abort(&mut self, error: FrameError) -> PushOutcome {
        match error {
            FrameError::BufferOverflow { .. } | FrameError::FrameTooLarge { .. } => {
                self.stats.overflows += 1
            }
            FrameError::InvalidHeader { .. } | FrameError::EmptyPayload => {
                self.stats.header_errors += 1
            }
            FrameError::Timeout { .. } => self.stats.timeouts += 1,
        }
        log_warn_throttled!(self.error_throttle, "Discarding frame: {error}");
        self.end_cycle(AcquisitionState::Idle);
        PushOutcome::Aborted(error)
    }

    /// Close the cycle if the line has been quiet for too long. Meant to be
    /// called when no byte is available.
    pub fn check_timeout(&mut self, now: Instant) -> Option<FrameError> {
        let timeout = self.config.receive_timeout;
        if !self.requesting || timeout.is_zero() {
            return None;
        }

        let (since, waiting_for) = match self.state {
            AcquisitionState::AwaitingHeader => (self.last_request?, "header"),
            AcquisitionState::Accumulating | AcquisitionState::AccumulatingEncrypted => {
                (self.last_read?, "data")
            }
            _ => return None,
        };
        let elapsed = now.saturating_duration_since(since);
        if elapsed <= timeout {
            return None;
        }

        let error = FrameError::Timeout {
            waiting_for,
            elapsed_ms: elapsed.as_millis() as u64,
        };
        if waiting_for == "header" {
            log::debug!("{error}");
        } else {
            log_warn_throttled!(
                self.error_throttle,
                "{error} ({} bytes buffered)",
                self.buffer.len()
            );
        }
        self.stats.timeouts += 1;
        self.end_cycle(AcquisitionState::TimedOut);
        Some(error)
    }

    /// The completed frame, if any.
    pub fn frame(&self) -> Option<&[u8]> {
        (self.state == AcquisitionState::Complete).then(|| self.buffer.as_slice())
    }

    /// Release a completed frame and close the poll cycle.
    pub fn finish(&mut self) {
        self.end_cycle(AcquisitionState::Idle);
    }

    /// Abandon everything, including the request interval bookkeeping.
    pub fn reset(&mut self) {
        self.end_cycle(AcquisitionState::Idle);
        self.last_request = None;
        self.last_read = None;
    }

    fn end_cycle(&mut self, state: AcquisitionState) {
        self.clear_frame();
        self.requesting = false;
        self.state = state;
    }

    fn clear_frame(&mut self) {
        self.buffer.clear();
        self.footer_found = false;
        self.encrypted_total = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(acq: &mut TelegramAcquisition, bytes: &[u8], now: Instant) -> Vec<PushOutcome> {
        bytes.iter().map(|&b| acq.push(b, now)).collect()
    }

    #[test]
    fn test_bytes_ignored_outside_cycle() {
        let mut acq = TelegramAcquisition::new(FrameMode::Plain, AcquisitionConfig::default());
        assert_eq!(acq.push(b'/', Instant::now()), PushOutcome::Ignored);
        assert_eq!(acq.state(), AcquisitionState::Idle);
    }

    #[test]
    fn test_plain_frame_completes_on_line_break_after_footer() {
        let now = Instant::now();
        let mut acq = TelegramAcquisition::new(FrameMode::Plain, AcquisitionConfig::default());
        assert!(acq.begin_cycle(now));
        let out = feed(&mut acq, b"noise/AAA5\r\n1-0:1.8.1(1*kWh)\r\n!ABCD\r\n", now);
        assert!(out.contains(&PushOutcome::FrameComplete(FrameMode::Plain)));
        assert_eq!(out.last(), Some(&PushOutcome::Ignored));
        assert_eq!(acq.frame(), Some(&b"/AAA5\r\n1-0:1.8.1(1*kWh)\r\n!ABCD\r"[..]));
        acq.finish();
        assert!(!acq.is_requesting());
        assert_eq!(acq.frame(), None);
    }

    #[test]
    fn test_line_breaks_before_bracket_are_removed() {
        let now = Instant::now();
        let mut acq = TelegramAcquisition::new(FrameMode::Plain, AcquisitionConfig::default());
        acq.begin_cycle(now);
        feed(&mut acq, b"/AAA5\r\n0-1:24.2.1(1)\r\n(2)\r\n!0000\n", now);
        assert_eq!(acq.frame(), Some(&b"/AAA5\r\n0-1:24.2.1(1)(2)\r\n!0000\n"[..]));
    }

    #[test]
    fn test_header_at_line_start_restarts_frame() {
        let now = Instant::now();
        let mut acq = TelegramAcquisition::new(FrameMode::Plain, AcquisitionConfig::default());
        acq.begin_cycle(now);
        feed(&mut acq, b"/AAA5\r\n1-0:1.8.1(1\r\n/BBB5\r\n0-0:96.13.0(a/b)\r\n!0000\r", now);
        assert_eq!(acq.frame(), Some(&b"/BBB5\r\n0-0:96.13.0(a/b)\r\n!0000\r"[..]));
    }

    #[test]
    fn test_overflow_aborts_cycle() {
        let now = Instant::now();
        let config = AcquisitionConfig { max_telegram_length: 8, ..AcquisitionConfig::default() };
        let mut acq = TelegramAcquisition::new(FrameMode::Plain, config);
        acq.begin_cycle(now);
        let out = feed(&mut acq, b"/AAA5MTRX", now);
        assert_eq!(
            out.last(),
            Some(&PushOutcome::Aborted(FrameError::BufferOverflow { capacity: 8 }))
        );
        assert_eq!(acq.state(), AcquisitionState::Idle);
        assert!(!acq.is_requesting());
        assert_eq!(acq.buffered(), 0);
        assert_eq!(acq.stats().overflows, 1);
    }

    #[test]
    fn test_encrypted_wrong_type_byte_rejected_immediately() {
        let now = Instant::now();
        let mut acq = TelegramAcquisition::new(FrameMode::Encrypted, AcquisitionConfig::default());
        acq.begin_cycle(now);
        assert_eq!(acq.push(0xDB, now), PushOutcome::NeedMore);
        assert_eq!(
            acq.push(0x09, now),
            PushOutcome::Aborted(FrameError::InvalidHeader { start: 0xDB, kind: 0x09 })
        );
    }

    #[test]
    fn test_encrypted_frame_too_large() {
        let now = Instant::now();
        let config = AcquisitionConfig { max_telegram_length: 64, ..AcquisitionConfig::default() };
        let mut acq = TelegramAcquisition::new(FrameMode::Encrypted, config);
        acq.begin_cycle(now);
        let mut header = vec![0xDB, 0x08, 1, 2, 3, 4, 5, 6, 7, 8, 0x82, 0x00, 0x40];
        let last = header.pop().unwrap();
        feed(&mut acq, &header, now);
        assert_eq!(
            acq.push(last, now),
            PushOutcome::Aborted(FrameError::FrameTooLarge { total: 94, capacity: 64 })
        );
    }

    #[test]
    fn test_header_wait_timeout() {
        let start = Instant::now();
        let config = AcquisitionConfig {
            receive_timeout: Duration::from_millis(200),
            ..AcquisitionConfig::default()
        };
        let mut acq = TelegramAcquisition::new(FrameMode::Plain, config);
        acq.begin_cycle(start);
        assert_eq!(acq.check_timeout(start + Duration::from_millis(200)), None);
        let err = acq.check_timeout(start + Duration::from_millis(201)).unwrap();
        assert!(matches!(err, FrameError::Timeout { waiting_for: "header", .. }));
        assert_eq!(acq.state(), AcquisitionState::TimedOut);
        assert!(!acq.is_requesting());
    }

    #[test]
    fn test_request_interval_spaces_cycles() {
        let start = Instant::now();
        let config = AcquisitionConfig {
            request_interval: Duration::from_secs(10),
            ..AcquisitionConfig::default()
        };
        let mut acq = TelegramAcquisition::new(FrameMode::Plain, config);
        assert!(acq.begin_cycle(start));
        acq.finish();
        assert!(!acq.begin_cycle(start + Duration::from_secs(9)));
        assert!(acq.begin_cycle(start + Duration::from_secs(10)));
    }
}
