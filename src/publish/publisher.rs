//! # Reading Publisher
//!
//! Turns an accepted telegram into sink calls: built-in fields through their
//! bindings, custom bindings through the debounce, and optionally the raw
//! telegram text.

use crate::dsmr::fields::FieldRegistry;
use crate::dsmr::telegram::ParsedTelegram;
use crate::log_warn_throttled;
use crate::publish::bindings::{BindingRegistry, OutputKind};
use crate::publish::custom::{numeric_value, parse_custom_line, telegram_lines, text_value};
use crate::publish::{ReadingSink, ReadingValue};
use crate::util::logging::LogThrottle;
use std::time::Instant;

#[derive(Debug)]
pub struct ReadingPublisher {
    bindings: BindingRegistry,
    publish_telegram: bool,
    warn_throttle: LogThrottle,
}

impl ReadingPublisher {
    pub fn new(bindings: BindingRegistry, publish_telegram: bool) -> Self {
        Self {
            bindings,
            publish_telegram,
            warn_throttle: LogThrottle::new(10_000, 3),
        }
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn publishes_telegram(&self) -> bool {
        self.publish_telegram
    }

    /// Publish every present built-in field that is bound and not taken over.
    pub fn publish_standard<K: ReadingSink>(
        &self,
        registry: &FieldRegistry,
        telegram: &ParsedTelegram,
        sink: &mut K,
    ) -> usize {
        let mut published = 0;
        for (slot, descriptor) in registry.iter().enumerate() {
            let Some(value) = telegram.get(slot) else {
                continue;
            };
            let binding = self.bindings.binding(slot);
            let Some(handle) = binding.standard_handle() else {
                if binding.is_overridden() {
                    log::trace!(
                        "Standard sensor '{}' was parsed but is overridden by a custom sensor",
                        descriptor.name
                    );
                }
                continue;
            };
            let reading = ReadingValue::from(value);
            log::debug!("Published standard sensor '{}': {reading}", descriptor.name);
            sink.publish(handle, &reading);
            published += 1;
        }
        published
    }

    /// Run the custom bindings over the telegram text.
    pub fn publish_custom<K: ReadingSink>(&mut self, text: &str, now: Instant, sink: &mut K) -> usize {
        let mut published = 0;
        for line in telegram_lines(text) {
            let Some(parsed) = parse_custom_line(line) else {
                continue;
            };
            let Some(binding) = self.bindings.find_custom_mut(&parsed.id) else {
                continue;
            };

            let reading = match binding.kind {
                OutputKind::Sensor => match numeric_value(parsed.value) {
                    Some(number) => binding
                        .debounce
                        .offer_number(number, now)
                        .then_some(ReadingValue::Number(number)),
                    None => {
                        log_warn_throttled!(
                            self.warn_throttle,
                            "Failed to parse number for custom OBIS {} from '{}'",
                            parsed.id,
                            parsed.value
                        );
                        None
                    }
                },
                OutputKind::TextSensor => {
                    let text = text_value(parsed.value);
                    binding
                        .debounce
                        .offer_text(text, now)
                        .then(|| ReadingValue::Text(text.to_string()))
                }
            };

            if let Some(reading) = reading {
                log::debug!("Published custom sensor (OBIS {}): {reading}", parsed.id);
                sink.publish(binding.handle, &reading);
                published += 1;
            }
        }
        published
    }

    /// Hand the whole telegram to the sink when that is enabled.
    pub fn publish_raw<K: ReadingSink>(&self, text: &str, sink: &mut K) {
        if self.publish_telegram {
            sink.publish_telegram(text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsmr::fields::MbusChannels;
    use crate::dsmr::obis::ObisId;
    use crate::dsmr::telegram::{ParseOptions, TelegramParser};
    use crate::publish::bindings::{CustomFieldBinding, StandardBinding};
    use crate::publish::{OutputHandle, RecordingSink};

    const TELEGRAM: &str = "/AAA5MTR\r\n1-0:1.8.1(000100.000*kWh)\r\n1-0:1.8.2(000200.000*kWh)\r\n!";

    #[test]
    fn test_override_moves_field_to_custom_binding() {
        let registry = FieldRegistry::select(
            MbusChannels::default(),
            &["energy_delivered_tariff1", "energy_delivered_tariff2"],
        );
        let standard = vec![
            StandardBinding { name: "energy_delivered_tariff1".into(), handle: OutputHandle(0) },
            StandardBinding { name: "energy_delivered_tariff2".into(), handle: OutputHandle(1) },
        ];
        let custom = vec![CustomFieldBinding::new(
            ObisId::new(1, 0, 1, 8, 2),
            OutputKind::Sensor,
            OutputHandle(2),
        )];
        let bindings = BindingRegistry::resolve(&registry, &standard, custom);
        let mut publisher = ReadingPublisher::new(bindings, false);

        let opts = ParseOptions { check_crc: false, ..ParseOptions::default() };
        let telegram = TelegramParser::new(&registry, opts).parse(TELEGRAM.as_bytes()).unwrap();
        let mut sink = RecordingSink::new();
        assert_eq!(publisher.publish_standard(&registry, &telegram, &mut sink), 1);
        assert_eq!(publisher.publish_custom(TELEGRAM, Instant::now(), &mut sink), 1);

        assert_eq!(sink.last(OutputHandle(0)), Some(&ReadingValue::Number(100.0)));
        assert_eq!(sink.last(OutputHandle(1)), None);
        assert_eq!(sink.last(OutputHandle(2)), Some(&ReadingValue::Number(200.0)));
    }
}
