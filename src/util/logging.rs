//! # Logging Utilities
//!
//! Rate limiting and dump helpers shared by the acquisition loop, the
//! decryptor and the publisher. A P1 port streams a telegram every second or
//! so, and a meter that keeps sending garbage would otherwise fill the log
//! with the same warning.
//!
//! ## Usage
//!
//! ```rust
//! use dsmr_rs::util::logging::{log_frame_hex, LogThrottle};
//!
//! // 5 messages per second
//! let mut throttle = LogThrottle::new(1000, 5);
//! if throttle.allow() {
//!     log::warn!("Checksum mismatch");
//! }
//!
//! log_frame_hex("Encrypted frame", &[0xDB, 0x08, 0x53, 0x41]);
//! ```

use std::time::Instant;

/// Rate limiter for log messages.
#[derive(Debug, Clone)]
pub struct LogThrottle {
    /// Time window in milliseconds
    window_ms: u64,
    /// Maximum messages per window
    cap: u32,
    count: u32,
    /// Start of the current window
    t0: Instant,
    suppressed: u64,
}

impl LogThrottle {
    /// Create a throttle allowing `cap` messages per `window_ms`.
    ///
    /// # Examples
    /// ```rust
    /// use dsmr_rs::util::logging::LogThrottle;
    ///
    /// let mut throttle = LogThrottle::new(1000, 1);
    /// assert!(throttle.allow());
    /// assert!(!throttle.allow());
    /// ```
    pub fn new(window_ms: u64, cap: u32) -> Self {
        Self {
            window_ms,
            cap,
            count: 0,
            t0: Instant::now(),
            suppressed: 0,
        }
    }

    /// Check whether a message may be logged now.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Same as [`allow`](Self::allow) with an explicit clock.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        let elapsed_ms = now.saturating_duration_since(self.t0).as_millis() as u64;
        if elapsed_ms > self.window_ms {
            if self.suppressed > 0 {
                log::debug!("{} log messages suppressed", self.suppressed);
            }
            self.t0 = now;
            self.count = 0;
            self.suppressed = 0;
        }

        self.count = self.count.saturating_add(1);
        let allowed = self.count <= self.cap;
        if !allowed {
            self.suppressed += 1;
        }
        allowed
    }

    pub fn stats(&self) -> ThrottleStats {
        ThrottleStats {
            window_ms: self.window_ms,
            cap: self.cap,
            count: self.count,
            suppressed: self.suppressed,
            window_remaining_ms: self
                .window_ms
                .saturating_sub(self.t0.elapsed().as_millis() as u64),
        }
    }

    /// Start a new window immediately.
    pub fn reset(&mut self) {
        self.t0 = Instant::now();
        self.count = 0;
        self.suppressed = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleStats {
    pub window_ms: u64,
    pub cap: u32,
    pub count: u32,
    /// Messages dropped in the current window
    pub suppressed: u64,
    pub window_remaining_ms: u64,
}

/// Log binary frame data in hex at debug level, capped at 64 bytes.
pub fn log_frame_hex(prefix: &str, data: &[u8]) {
    const MAX_LOG_BYTES: usize = 64;

    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    let shown = &data[..data.len().min(MAX_LOG_BYTES)];
    let suffix = if data.len() > MAX_LOG_BYTES {
        format!(" ... ({} bytes total)", data.len())
    } else {
        String::new()
    };
    log::debug!(
        "{prefix}: {}{suffix}",
        crate::util::hex::format_hex_compact(shown)
    );
}

/// Log a telegram line by line at trace level.
pub fn log_telegram_text(prefix: &str, telegram: &[u8]) {
    if !log::log_enabled!(log::Level::Trace) {
        return;
    }
    let text = String::from_utf8_lossy(telegram);
    log::trace!(target: "dsmr::telegram", "{prefix} ({} bytes)", telegram.len());
    for line in text.lines().filter(|l| !l.is_empty()) {
        log::trace!(target: "dsmr::telegram", "  {line}");
    }
}

/// Log a warning with throttling
#[macro_export]
macro_rules! log_warn_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::warn!($($arg)*);
        }
    };
}

/// Log an info message with throttling
#[macro_export]
macro_rules! log_info_throttled {
    ($throttle:expr, $($arg:tt)*) => {
        if $throttle.allow() {
            log::info!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_log_throttle_basic() {
        let mut throttle = LogThrottle::new(1000, 3);

        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(throttle.allow());

        // 4th message should be throttled
        assert!(!throttle.allow());
        assert!(!throttle.allow());
        assert_eq!(throttle.stats().suppressed, 2);
    }

    #[test]
    fn test_log_throttle_window_expiry() {
        let t0 = Instant::now();
        let mut throttle = LogThrottle::new(100, 1);
        assert!(throttle.allow_at(t0));
        assert!(!throttle.allow_at(t0 + Duration::from_millis(50)));
        assert!(throttle.allow_at(t0 + Duration::from_millis(250)));
        assert_eq!(throttle.stats().suppressed, 0);
    }

    #[test]
    fn test_log_throttle_reset() {
        let mut throttle = LogThrottle::new(1000, 2);
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());

        throttle.reset();
        assert!(throttle.allow());
        assert!(throttle.allow());
        assert!(!throttle.allow());
    }

    #[test]
    fn test_frame_helpers_do_not_panic() {
        log_frame_hex("empty", &[]);
        log_frame_hex("long", &[0xAA; 200]);
        log_telegram_text("telegram", b"/AAA5\r\n\r\n1-0:1.8.0(1*kWh)\r\n!0000\r\n");
    }
}
