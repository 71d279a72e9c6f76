//! # Telegram Parser
//!
//! Turns one complete plain-text telegram into a [`ParsedTelegram`]:
//!
//! ```text
//! /ISK5\2M550T-1012          identification line
//!
//! 1-0:1.8.1(000404.494*kWh)  data lines: OBIS id + value
//! 0-1:24.2.1(...)(...)
//! !6F5B                      footer + CRC-16 over '/'..'!'
//! ```
//!
//! The parser is driven by a [`FieldRegistry`]: lines whose identifier is not
//! in the registry are skipped (or rejected when `unknown_error` is set),
//! matched lines are decoded by the descriptor's [`FieldParser`] into the
//! descriptor's slot.
//!
//! [`FieldParser`]: crate::dsmr::fields::FieldParser

use crate::constants::{DSMR_FOOTER, DSMR_HEADER_START};
use crate::dsmr::crc16::crc16;
use crate::dsmr::fields::{FieldDescriptor, FieldRegistry, FieldValue};
use crate::dsmr::obis::{parse_obis, ObisId};
use crate::dsmr::parser::{parse_crc, ParseError};
use thiserror::Error;

/// Why a telegram was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TelegramError {
    #[error("Checksum mismatch: expected {expected:04X}, calculated {calculated:04X}")]
    ChecksumMismatch { expected: u16, calculated: u16 },

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

impl TelegramError {
    /// Human readable diagnostic; parse errors point at the failing byte.
    pub fn full_error(&self, input: &[u8]) -> String {
        match self {
            TelegramError::Parse(e) => e.full_error(input),
            other => other.to_string(),
        }
    }
}

/// Parser switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// Verify the CRC trailer
    pub check_crc: bool,
    /// Reject lines whose identifier is not in the registry
    pub unknown_error: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            check_crc: true,
            unknown_error: false,
        }
    }
}

/// Field values of one telegram, one slot per registry entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTelegram {
    slots: Vec<Option<FieldValue>>,
}

impl ParsedTelegram {
    pub fn with_slots(len: usize) -> Self {
        Self {
            slots: vec![None; len],
        }
    }

    pub fn get(&self, slot: usize) -> Option<&FieldValue> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn is_present(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    pub fn present_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Look a value up by field name.
    pub fn get_by_name<'a>(&'a self, registry: &FieldRegistry, name: &str) -> Option<&'a FieldValue> {
        registry.slot_of(name).and_then(|slot| self.get(slot))
    }

    /// Present fields with their descriptors, in registry order.
    pub fn fields<'a>(
        &'a self,
        registry: &'a FieldRegistry,
    ) -> impl Iterator<Item = (&'a FieldDescriptor, &'a FieldValue)> + 'a {
        registry
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(d, v)| v.as_ref().map(|v| (d, v)))
    }

    fn set(&mut self, slot: usize, value: FieldValue) {
        if let Some(s) = self.slots.get_mut(slot) {
            *s = Some(value);
        }
    }
}

fn is_line_break(b: u8) -> bool {
    b == b'\r' || b == b'\n'
}

/// Registry-driven telegram parser.
#[derive(Debug, Clone, Copy)]
pub struct TelegramParser<'r> {
    registry: &'r FieldRegistry,
    options: ParseOptions,
}

impl<'r> TelegramParser<'r> {
    pub fn new(registry: &'r FieldRegistry, options: ParseOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    /// Parse a complete telegram starting with `/`.
    ///
    /// Bytes after the CRC trailer are ignored.
    pub fn parse(&self, input: &[u8]) -> Result<ParsedTelegram, TelegramError> {
        if input.first() != Some(&DSMR_HEADER_START) {
            return Err(ParseError::new("Data should start with /", 0).into());
        }
        let bang = input
            .iter()
            .position(|&b| b == DSMR_FOOTER)
            .ok_or(ParseError::new("Missing '!' telegram terminator", input.len()))?;

        if self.options.check_crc {
            let calculated = crc16(&input[..=bang]);
            let expected = parse_crc(input, bang + 1, input.len())?.value;
            if expected != calculated {
                return Err(TelegramError::ChecksumMismatch {
                    expected,
                    calculated,
                });
            }
        }

        Ok(self.parse_data(input, 1, bang)?)
    }

    /// Parse the identification line and data lines in `[start, end)`.
    pub fn parse_data(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
    ) -> Result<ParsedTelegram, ParseError> {
        let end = end.min(buf.len());
        let mut telegram = ParsedTelegram::with_slots(self.registry.len());

        let ident_end = buf[start..end]
            .iter()
            .position(|&b| is_line_break(b))
            .map_or(end, |p| start + p);
        self.parse_identification(buf, start, ident_end, &mut telegram)?;

        let mut line_start = ident_end;
        loop {
            while line_start < end && is_line_break(buf[line_start]) {
                line_start += 1;
            }
            if line_start >= end {
                break;
            }
            let line_end = buf[line_start..end]
                .iter()
                .position(|&b| is_line_break(b))
                .map_or(end, |p| line_start + p);
            self.parse_line(buf, line_start, line_end, &mut telegram)?;
            line_start = line_end;
        }

        Ok(telegram)
    }

    fn parse_identification(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        telegram: &mut ParsedTelegram,
    ) -> Result<(), ParseError> {
        let line = &buf[start..end];
        if line.is_empty() {
            return Err(ParseError::new("Empty identification line", start));
        }
        if line.len() < 4 {
            return Err(ParseError::new("Identification line too short", start));
        }
        if !line[..3].iter().all(u8::is_ascii_alphanumeric) {
            return Err(ParseError::new("Invalid Manufacturer ID in identification", start));
        }
        if !line[3].is_ascii_alphanumeric() {
            return Err(ParseError::new(
                "Invalid char after Manufacturer ID in identification",
                start + 3,
            ));
        }

        if let Some((slot, _)) = self.registry.find(&ObisId::IDENTIFICATION) {
            telegram.set(slot, FieldValue::Text(String::from_utf8_lossy(line).into_owned()));
        }
        Ok(())
    }

    fn parse_line(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        telegram: &mut ParsedTelegram,
    ) -> Result<(), ParseError> {
        let id = parse_obis(buf, start, end)?;

        let next = match self.registry.find(&id.value) {
            Some((slot, descriptor)) => {
                if telegram.is_present(slot) {
                    return Err(ParseError::new("Duplicate field", id.next));
                }
                let parsed = descriptor.parser.parse(buf, id.next, end)?;
                telegram.set(slot, parsed.value);
                parsed.next
            }
            None => id.next,
        };

        if next != id.next && next != end {
            return Err(ParseError::new("Trailing characters on data line", next));
        }
        if next == id.next && self.options.unknown_error {
            return Err(ParseError::new("Unknown OBIS field", start));
        }
        Ok(())
    }
}
