//! # Custom Line Extraction
//!
//! Custom bindings are matched against the raw telegram text rather than the
//! field registry, so any OBIS code can be published, including ones the
//! registry does not know. A line qualifies when it has an identifier, an
//! opening bracket and a closing bracket with something in between.

use crate::dsmr::obis::ObisId;

/// Identifier and bracket contents of one data line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CustomLine<'a> {
    pub id: ObisId,
    /// Text between the first `(` and the last `)`
    pub value: &'a str,
}

/// Non-empty lines of a telegram, up to the `!` footer.
pub fn telegram_lines(telegram: &str) -> impl Iterator<Item = &str> {
    let body = telegram.split('!').next().unwrap_or_default();
    body.split(['\r', '\n']).filter(|line| !line.is_empty())
}

/// Split a line into identifier and value part.
pub fn parse_custom_line(line: &str) -> Option<CustomLine<'_>> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    if open + 1 >= close {
        return None;
    }
    let code: String = line[..open].chars().filter(|c| !c.is_whitespace()).collect();
    if code.is_empty() {
        return None;
    }
    let id = code.parse::<ObisId>().ok()?;
    Some(CustomLine {
        id,
        value: &line[open + 1..close],
    })
}

/// Number in the last bracket group of a value part, without its unit.
///
/// `001234.567*kWh` gives 1234.567, and `230101120000W)(00012.345*m3` (a
/// timestamped reading) gives 12.345.
pub fn numeric_value(value: &str) -> Option<f64> {
    let last = value.rfind('(').map_or(value, |p| &value[p + 1..]);
    let number = last.split('*').next().unwrap_or_default();
    let cleaned: String = number
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ')')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Text of a value part; one extra level of brackets is removed.
pub fn text_value(value: &str) -> &str {
    value
        .strip_prefix('(')
        .and_then(|v| v.strip_suffix(')'))
        .unwrap_or(value)
}
