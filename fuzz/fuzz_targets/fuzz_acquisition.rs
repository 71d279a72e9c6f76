#![no_main]

use dsmr_rs::{DsmrConfig, DsmrHub, RecordingSink};
use libfuzzer_sys::fuzz_target;
use std::collections::VecDeque;
use std::time::Instant;

fuzz_target!(|data: &[u8]| {
    let Some((&selector, stream)) = data.split_first() else {
        return;
    };

    // Low bit picks plain or encrypted framing
    let mut config = DsmrConfig {
        max_telegram_length: 64 + (selector as usize >> 1) * 8,
        request_interval_ms: 0,
        sensors: vec!["power_delivered".into(), "gas_delivered".into()],
        ..DsmrConfig::default()
    };
    if selector & 1 == 1 {
        config.decryption_key = Some("000102030405060708090A0B0C0D0E0F".into());
    }

    let mut hub = DsmrHub::from_config(&config);
    let mut sink = RecordingSink::new();
    let mut source: VecDeque<u8> = stream.iter().copied().collect();
    let now = Instant::now();

    hub.tick(&mut source, &mut sink, now);
    while !source.is_empty() {
        hub.tick(&mut source, &mut sink, now);
    }
    assert!(hub.acquisition().buffered() <= config.max_telegram_length);
});
