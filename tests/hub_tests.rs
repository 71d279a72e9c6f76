//! Unit tests for the `DsmrHub`: acquisition, integrity checks and publication
//! working together.

mod common;

use common::{encrypted, sample_telegram, with_crc, KEY_HEX, SAMPLE_BODY};
use dsmr_rs::dsmr::acquisition::FrameError;
use dsmr_rs::dsmr::serial_mock::MockSerialPort;
use dsmr_rs::dsmr::telegram::TelegramError;
use dsmr_rs::error::DsmrError;
use dsmr_rs::{
    DsmrConfig, DsmrHub, FrameMode, ReadingSink, ReadingValue, RecordingSink, TickOutcome,
};
use proptest::prelude::*;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

fn hub(json: &str) -> DsmrHub {
    DsmrHub::from_config(&DsmrConfig::from_json_str(json).unwrap())
}

/// Tick until the source is drained, collecting every outcome.
fn drain<K: ReadingSink>(
    hub: &mut DsmrHub,
    source: &mut VecDeque<u8>,
    sink: &mut K,
    now: Instant,
) -> Vec<TickOutcome> {
    let mut outcomes = vec![hub.tick(source, sink, now)];
    while !source.is_empty() {
        outcomes.push(hub.tick(source, sink, now));
    }
    outcomes
}

fn published(outcomes: &[TickOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| matches!(o, TickOutcome::Published { .. }))
        .count()
}

fn number(sink: &RecordingSink, hub: &DsmrHub, name: &str) -> Option<f64> {
    let handle = hub.outputs().handle(name)?;
    match sink.last(handle)? {
        ReadingValue::Number(n) => Some(*n),
        ReadingValue::Text(_) => None,
    }
}

/// Tests that a plain telegram is published to the configured outputs.
#[test]
fn test_plain_telegram_published() {
    let mut hub = hub(r#"{"sensors": ["energy_delivered_tariff1", "power_delivered", "gas_delivered"]}"#);
    let mut source: VecDeque<u8> = sample_telegram().into();
    let mut sink = RecordingSink::new();

    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());
    assert!(matches!(outcomes[0], TickOutcome::Published { readings: 3 }));
    assert_eq!(number(&sink, &hub, "energy_delivered_tariff1"), Some(1234.567));
    assert_eq!(number(&sink, &hub, "power_delivered"), Some(0.424));
    assert_eq!(number(&sink, &hub, "gas_delivered"), Some(987.654));
    assert_eq!(hub.stats().accepted, 1);
    assert_eq!(hub.mode(), FrameMode::Plain);
}

/// Tests that a corrupted telegram publishes nothing but still counts.
#[test]
fn test_checksum_failure_rejected() {
    let mut hub = hub(r#"{"sensors": ["power_delivered"], "telegram": true}"#);
    let mut telegram = sample_telegram();
    let pos = telegram.windows(5).position(|w| w == b"0.424").unwrap();
    telegram[pos + 4] = b'5';
    let mut source: VecDeque<u8> = telegram.into();
    let mut sink = RecordingSink::new();

    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());
    assert!(matches!(
        outcomes[0],
        TickOutcome::Rejected(DsmrError::Telegram(_))
    ));
    assert!(sink.readings.is_empty());
    assert_eq!(sink.telegrams.len(), 1, "raw telegram is published anyway");
    assert_eq!(hub.stats().checksum_failures, 1);
}

/// Tests that the raw telegram follows the readings.
#[test]
fn test_raw_telegram_published() {
    let mut hub = hub(r#"{"sensors": ["power_delivered"], "telegram": true}"#);
    let mut source: VecDeque<u8> = sample_telegram().into();
    let mut sink = RecordingSink::new();
    drain(&mut hub, &mut source, &mut sink, Instant::now());

    assert_eq!(sink.readings.len(), 1);
    assert_eq!(sink.telegrams.len(), 1);
    assert!(sink.telegrams[0].starts_with("/ISK5"));
    assert!(sink.telegrams[0].contains("1-0:1.7.0(00.424*kW)"));
}

/// Tests that a frame overflowing the buffer does not spoil the next one.
#[test]
fn test_overflow_then_next_frame_parses() {
    let frame_len = SAMPLE_BODY.len() + 5;
    let mut hub = hub(&format!(
        r#"{{"max_telegram_length": {frame_len}, "sensors": ["power_delivered"]}}"#
    ));
    let oversize = with_crc(&SAMPLE_BODY.replace("\r\n!", "\r\n0-0:96.13.0(303132333435)\r\n!"));
    let mut source: VecDeque<u8> = oversize.into_iter().chain(sample_telegram()).collect();
    let mut sink = RecordingSink::new();

    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());
    assert!(matches!(
        outcomes[0],
        TickOutcome::Aborted(FrameError::BufferOverflow { .. })
    ));
    assert_eq!(published(&outcomes), 1);
    assert_eq!(number(&sink, &hub, "power_delivered"), Some(0.424));
    assert_eq!(hub.stats().acquisition.overflows, 1);
    assert_eq!(hub.stats().accepted, 1);
}

/// Tests that a too short identification line rejects the telegram.
#[test]
fn test_identification_line_length() {
    let mut hub = hub(r#"{"sensors": ["power_delivered"]}"#);
    let mut sink = RecordingSink::new();

    let mut source: VecDeque<u8> = with_crc("/A\r\n\r\n1-0:1.7.0(00.424*kW)\r\n!").into();
    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());
    assert!(matches!(
        outcomes[0],
        TickOutcome::Rejected(DsmrError::Telegram(TelegramError::Parse(_)))
    ));
    assert!(sink.readings.is_empty());
    assert_eq!(hub.stats().parse_failures, 1);

    let mut source: VecDeque<u8> = with_crc("/ADN9\r\n\r\n1-0:1.7.0(00.424*kW)\r\n!").into();
    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());
    assert!(matches!(outcomes[0], TickOutcome::Published { readings: 1 }));
    assert_eq!(number(&sink, &hub, "power_delivered"), Some(0.424));
}

/// Tests that custom sensors are debounced across telegrams.
#[test]
fn test_custom_sensor_debounce() {
    let mut hub = hub(
        r#"{"custom_sensors": [
            {"code": "1-0:32.7.0", "name": "grid_voltage"},
            {"code": "0-0:96.14.0", "name": "tariff", "type": "text_sensor"}
        ]}"#,
    );
    let voltage = hub.outputs().handle("grid_voltage").unwrap();
    let tariff = hub.outputs().handle("tariff").unwrap();
    let mut sink = RecordingSink::new();
    let t0 = Instant::now();

    for offset in [0, 1, 2] {
        let mut source: VecDeque<u8> = sample_telegram().into();
        drain(&mut hub, &mut source, &mut sink, t0 + Duration::from_secs(offset));
    }
    assert_eq!(sink.values_for(voltage), vec![&ReadingValue::Number(230.1)]);
    assert_eq!(sink.values_for(tariff), vec![&ReadingValue::Text("0002".into())]);

    let mut source: VecDeque<u8> = sample_telegram().into();
    drain(&mut hub, &mut source, &mut sink, t0 + Duration::from_secs(6));
    assert_eq!(sink.values_for(voltage).len(), 2);

    let changed = with_crc(&common::SAMPLE_BODY.replace("230.1*V", "231.0*V"));
    let mut source: VecDeque<u8> = changed.into();
    drain(&mut hub, &mut source, &mut sink, t0 + Duration::from_secs(7));
    assert_eq!(sink.last(voltage), Some(&ReadingValue::Number(231.0)));
}

/// Tests that a custom sensor on a standard field's code takes it over.
#[test]
fn test_custom_sensor_overrides_standard() {
    let mut hub = hub(
        r#"{
            "sensors": ["energy_delivered_tariff1", "power_delivered"],
            "custom_sensors": [{"code": "1-0:1.8.1", "name": "import_t1"}]
        }"#,
    );
    assert_eq!(hub.publisher().bindings().overridden_count(), 1);

    let mut source: VecDeque<u8> = sample_telegram().into();
    let mut sink = RecordingSink::new();
    drain(&mut hub, &mut source, &mut sink, Instant::now());

    assert_eq!(number(&sink, &hub, "energy_delivered_tariff1"), None);
    assert_eq!(number(&sink, &hub, "import_t1"), Some(1234.567));
    assert_eq!(number(&sink, &hub, "power_delivered"), Some(0.424));
}

/// Tests that encrypted frames are decrypted and published.
#[test]
fn test_encrypted_frame_published() {
    let json = format!(r#"{{"decryption_key": "{KEY_HEX}", "sensors": ["power_delivered"], "telegram": true}}"#);
    let mut hub = hub(&json);
    assert_eq!(hub.mode(), FrameMode::Encrypted);

    let mut source: VecDeque<u8> = encrypted(&sample_telegram(), 100).into();
    let mut sink = RecordingSink::new();
    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());

    assert_eq!(published(&outcomes), 1);
    assert_eq!(number(&sink, &hub, "power_delivered"), Some(0.424));
    assert_eq!(sink.telegrams.len(), 1);
}

/// Tests that a frame with a bad tag publishes nothing at all.
#[test]
fn test_tampered_frame_publishes_nothing() {
    let json = format!(r#"{{"decryption_key": "{KEY_HEX}", "sensors": ["power_delivered"], "telegram": true}}"#);
    let mut hub = hub(&json);

    let mut frame = encrypted(&sample_telegram(), 100);
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;
    let mut source: VecDeque<u8> = frame.into();
    let mut sink = RecordingSink::new();
    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());

    assert!(matches!(outcomes[0], TickOutcome::Rejected(DsmrError::Decrypt(_))));
    assert!(sink.readings.is_empty());
    assert!(sink.telegrams.is_empty());
    assert_eq!(hub.stats().decrypt_failures, 1);
}

/// Tests that an invalid key falls back to plain telegrams.
#[test]
fn test_invalid_key_disables_decryption() {
    let mut hub = hub(r#"{"decryption_key": "1234", "sensors": ["power_delivered"]}"#);
    assert_eq!(hub.mode(), FrameMode::Plain);

    let mut source: VecDeque<u8> = sample_telegram().into();
    let mut sink = RecordingSink::new();
    let outcomes = drain(&mut hub, &mut source, &mut sink, Instant::now());
    assert_eq!(published(&outcomes), 1);
}

/// Tests that the request line is raised for a cycle and lowered after it.
#[test]
fn test_request_line_follows_cycle() {
    let mut hub = hub(r#"{"sensors": ["power_delivered"], "request_interval_ms": 10000}"#);
    let mut port = MockSerialPort::with_request_line();
    let mut sink = RecordingSink::new();
    let t0 = Instant::now();

    assert!(matches!(hub.tick(&mut port, &mut sink, t0), TickOutcome::Pending));
    assert_eq!(port.request_history(), vec![true]);

    port.queue_rx_data(&sample_telegram());
    assert!(matches!(
        hub.tick(&mut port, &mut sink, t0 + Duration::from_millis(50)),
        TickOutcome::Published { readings: 1 }
    ));
    assert_eq!(port.request_history(), vec![true, false]);

    // Interval not reached: no new cycle, leftover byte stays with the port
    assert!(matches!(
        hub.tick(&mut port, &mut sink, t0 + Duration::from_secs(1)),
        TickOutcome::Idle
    ));
    assert_eq!(port.rx_len(), 1);
    assert!(!port.request_level());
}

/// Tests that bytes arriving outside a cycle are dropped without a request line.
#[test]
fn test_bytes_outside_cycle_discarded() {
    let mut hub = hub(r#"{"sensors": ["power_delivered"], "request_interval_ms": 10000}"#);
    let mut sink = RecordingSink::new();
    let t0 = Instant::now();

    let mut source: VecDeque<u8> = sample_telegram().into();
    assert!(matches!(hub.tick(&mut source, &mut sink, t0), TickOutcome::Published { .. }));

    source.extend(sample_telegram());
    assert!(matches!(
        hub.tick(&mut source, &mut sink, t0 + Duration::from_secs(1)),
        TickOutcome::Idle
    ));
    assert!(source.is_empty());
    assert_eq!(sink.readings.len(), 1);
}

/// Tests that a silent line times out and the next cycle starts fresh.
#[test]
fn test_receive_timeout() {
    let mut hub = hub(r#"{"sensors": ["power_delivered"], "receive_timeout_ms": 100}"#);
    let mut sink = RecordingSink::new();
    let t0 = Instant::now();
    let telegram = sample_telegram();

    let mut source: VecDeque<u8> = telegram[..40].to_vec().into();
    assert!(matches!(hub.tick(&mut source, &mut sink, t0), TickOutcome::Pending));
    assert!(matches!(
        hub.tick(&mut source, &mut sink, t0 + Duration::from_millis(150)),
        TickOutcome::Aborted(_)
    ));
    assert_eq!(hub.stats().acquisition.timeouts, 1);

    source.extend(telegram.iter().copied());
    let outcomes = drain(&mut hub, &mut source, &mut sink, t0 + Duration::from_millis(200));
    assert_eq!(published(&outcomes), 1);
}

/// Tests that a parse command style call publishes without acquisition.
#[test]
fn test_process_telegram_directly() {
    let mut hub = hub(r#"{"sensors": ["power_delivered"]}"#);
    let mut sink = RecordingSink::new();
    let readings = hub
        .process_telegram(&sample_telegram(), Instant::now(), &mut sink)
        .unwrap();
    assert_eq!(readings, 1);
    assert!(hub.process_telegram(b"garbage", Instant::now(), &mut sink).is_err());
    assert_eq!(hub.stats().parse_failures, 1);
}

proptest! {
    /// Tests that how the bytes are split across ticks does not change what is published.
    #[test]
    fn test_chunking_does_not_change_readings(cuts in proptest::collection::vec(1usize..64, 1..40)) {
        let config = r#"{
            "sensors": ["energy_delivered_tariff1", "power_delivered", "voltage_l1", "gas_delivered"],
            "custom_sensors": [{"code": "0-0:96.7.21", "name": "failures"}]
        }"#;
        let now = Instant::now();
        let stream: Vec<u8> = [sample_telegram(), b"noise".to_vec(), sample_telegram()].concat();

        let mut whole_hub = hub(config);
        let mut whole_sink = RecordingSink::new();
        let mut source: VecDeque<u8> = stream.clone().into();
        drain(&mut whole_hub, &mut source, &mut whole_sink, now);

        let mut chunked_hub = hub(config);
        let mut chunked_sink = RecordingSink::new();
        let mut source = VecDeque::new();
        let mut rest = &stream[..];
        let mut cut = cuts.iter().cycle();
        while !rest.is_empty() {
            let n = (*cut.next().unwrap()).min(rest.len());
            source.extend(rest[..n].iter().copied());
            rest = &rest[n..];
            drain(&mut chunked_hub, &mut source, &mut chunked_sink, now);
        }

        prop_assert_eq!(&chunked_sink.readings, &whole_sink.readings);
        prop_assert_eq!(chunked_hub.stats().accepted, 2);
    }
}
