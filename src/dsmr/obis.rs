//! # OBIS Identifiers
//!
//! Every P1 data line starts with an OBIS reduced identifier in `A-B:C.D.E`
//! notation (optionally `.F`). [`ObisId`] stores the six parts; parts that do
//! not appear in the text are set to 255.

use crate::dsmr::parser::{ParseError, ParseResult, Parsed};
use nom::character::complete::{char, digit0};
use nom::sequence::preceded;
use nom::IResult;
use std::fmt;
use std::str::FromStr;

/// A six part OBIS identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObisId(pub [u8; 6]);

impl ObisId {
    /// Pseudo identifier under which the identification line is stored.
    pub const IDENTIFICATION: ObisId = ObisId([255; 6]);

    /// `A-B:C.D.E` with the F part unused.
    pub const fn new(a: u8, b: u8, c: u8, d: u8, e: u8) -> Self {
        ObisId([a, b, c, d, e, 255])
    }

    pub fn parts(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for ObisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a}-{b}:{c}.{d}.{e}")?;
        if g != 255 {
            write!(f, ".{g}")?;
        }
        Ok(())
    }
}

impl FromStr for ObisId {
    type Err = ParseError;

    /// Parse a complete code such as `"1-0:1.8.0"`. Surrounding whitespace is
    /// ignored; anything else after the identifier is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parsed = parse_obis(s.as_bytes(), 0, s.len())?;
        if parsed.next != s.len() {
            return Err(ParseError::new("Trailing characters after OBIS id", parsed.next));
        }
        Ok(parsed.value)
    }
}

/// Separators in front of parts B to F.
const OBIS_SEPARATORS: [char; 5] = ['-', ':', '.', '.', '.'];

fn obis_digits(input: &[u8]) -> IResult<&[u8], &[u8]> {
    digit0(input)
}

fn separated_part(separator: char) -> impl Fn(&[u8]) -> IResult<&[u8], &[u8]> {
    move |input: &[u8]| preceded(char(separator), digit0)(input)
}

/// Value of one part; `offset` is where its digits start.
fn obis_part(digits: &[u8], offset: usize) -> Result<u8, ParseError> {
    digits.iter().enumerate().try_fold(0u8, |acc, (i, &d)| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(d - b'0'))
            .ok_or(ParseError::new("Obis ID part > 255", offset + i))
    })
}

/// Parse the leading OBIS identifier of a data line.
///
/// Accepts digits and the separators `-` (after A), `:` (after B) and `.`
/// (after C, D and E). Parsing stops at the first byte that does not fit
/// this pattern, so `1-0:1.8.1(` stops at the bracket.
pub fn parse_obis(buf: &[u8], pos: usize, end: usize) -> ParseResult<ObisId> {
    let end = end.min(buf.len());
    if pos > end {
        return Err(ParseError::new("Empty OBIS id string", pos));
    }
    let input = &buf[pos..end];
    let mut parts = [255u8; 6];

    let (mut remaining, first) =
        obis_digits(input).map_err(|_| ParseError::new("Empty OBIS id string", pos))?;
    parts[0] = obis_part(first, pos)?;
    for (part, separator) in parts[1..].iter_mut().zip(OBIS_SEPARATORS) {
        let Ok((after, digits)) = separated_part(separator)(remaining) else {
            break;
        };
        *part = obis_part(digits, end - after.len() - digits.len())?;
        remaining = after;
    }

    if remaining.len() == input.len() {
        return Err(ParseError::new("Empty OBIS id string", pos));
    }
    Ok(Parsed::new(ObisId(parts), end - remaining.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_code() {
        let line = b"1-0:1.8.1(000404.494*kWh)";
        let parsed = parse_obis(line, 0, line.len()).unwrap();
        assert_eq!(parsed.value, ObisId::new(1, 0, 1, 8, 1));
        assert_eq!(parsed.next, 9);
    }

    #[test]
    fn test_parse_with_f_part() {
        let parsed = parse_obis(b"1-0:99.97.0.7(", 0, 14).unwrap();
        assert_eq!(parsed.value, ObisId([1, 0, 99, 97, 0, 7]));
    }

    #[test]
    fn test_short_code_fills_with_255() {
        let parsed = parse_obis(b"1-3(", 0, 4).unwrap();
        assert_eq!(parsed.value, ObisId([1, 3, 255, 255, 255, 255]));
    }

    #[test]
    fn test_part_overflow() {
        let err = parse_obis(b"1-0:256.8.0", 0, 11).unwrap_err();
        assert_eq!(err, ParseError::new("Obis ID part > 255", 6));
    }

    #[test]
    fn test_empty_id() {
        let err = parse_obis(b"(123)", 0, 5).unwrap_err();
        assert_eq!(err, ParseError::new("Empty OBIS id string", 0));
    }

    #[test]
    fn test_display_round_trip() {
        let id: ObisId = "0-1:24.2.1".parse().unwrap();
        assert_eq!(id.to_string(), "0-1:24.2.1");
        assert!("0-1:24.2.1x".parse::<ObisId>().is_err());
    }
}
