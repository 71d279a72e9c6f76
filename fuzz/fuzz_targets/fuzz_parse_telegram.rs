#![no_main]

use dsmr_rs::dsmr::fields::{FieldRegistry, MbusChannels};
use dsmr_rs::dsmr::telegram::{ParseOptions, TelegramParser};
use dsmr_rs::publish::custom::{numeric_value, parse_custom_line, telegram_lines};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let registry = FieldRegistry::all(MbusChannels::default());

    // Any input must be rejected or accepted without panicking
    let _ = TelegramParser::new(&registry, ParseOptions::default()).parse(data);
    let lenient = ParseOptions {
        check_crc: false,
        unknown_error: false,
    };
    if let Err(e) = TelegramParser::new(&registry, lenient).parse(data) {
        let _ = e.full_error(data);
    }

    // Same input through the custom binding extraction
    let text = String::from_utf8_lossy(data);
    for line in telegram_lines(&text) {
        if let Some(parsed) = parse_custom_line(line) {
            let _ = numeric_value(parsed.value);
        }
    }
});
