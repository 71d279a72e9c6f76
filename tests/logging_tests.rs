//! Unit tests for the logging functionality in the `dsmr-rs` crate.

use dsmr_rs::logging::{init_logger, init_logger_with_filter};
use dsmr_rs::util::logging::LogThrottle;
use dsmr_rs::{log_info_throttled, log_warn_throttled};

/// Tests that log macros can be used once the logger is initialized.
#[test]
fn test_logging() {
    init_logger();
    log::error!("Checksum mismatch: expected 8F46, calculated 00AB");
    log::warn!("Timeout waiting for data after 250 ms");
    log::info!("Listening on /dev/ttyUSB0 (Plain frames)");
    log::debug!("Telegram accepted: 12 fields present, 3 readings published");
}

/// Tests that the logger can be initialized more than once.
#[test]
fn test_init_logger_twice() {
    init_logger();
    init_logger_with_filter("dsmr_rs=trace");
    init_logger();
}

/// Tests that the throttled macros respect the throttle.
#[test]
fn test_throttled_macros() {
    let mut throttle = LogThrottle::new(60_000, 2);
    for i in 0..5 {
        log_warn_throttled!(throttle, "Checksum mismatch {i}");
    }
    assert_eq!(throttle.stats().count, 5);
    assert_eq!(throttle.stats().suppressed, 3);

    let mut quiet = LogThrottle::new(60_000, 0);
    log_info_throttled!(quiet, "never shown");
    assert_eq!(quiet.stats().suppressed, 1);
}
