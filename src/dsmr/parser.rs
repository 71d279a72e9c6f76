//! # Primitive Value Parsers
//!
//! Low level parsers for the value part of a P1 data line. Every parser works
//! on a byte buffer with absolute offsets: it starts at `pos`, never reads at
//! or beyond `end`, and on success reports the offset of the first byte it did
//! not consume. Failures carry a static message plus the offset the problem
//! was found at, which is enough to rebuild a line-and-caret diagnostic.
//!
//! Value syntax handled here:
//!
//! ```text
//! (0012.345*kWh)   fixed point with unit
//! (00004)          integer without unit
//! (ISK5\2M550T)    bracketed string
//! ```

use crate::constants::{
    DSMR_CRC_LEN, DSMR_UNIT_SEPARATOR, DSMR_VALUE_CLOSE, DSMR_VALUE_OPEN,
};
use nom::bytes::complete::{tag_no_case, take, take_till, take_while_m_n};
use nom::character::complete::{char, digit0, one_of};
use nom::character::is_hex_digit;
use nom::combinator::{peek, rest};
use nom::number::complete::hex_u32;
use nom::IResult;
use thiserror::Error;

/// A structural parse failure at a byte offset.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{message} (at offset {offset})")]
pub struct ParseError {
    pub message: &'static str,
    pub offset: usize,
}

impl ParseError {
    pub fn new(message: &'static str, offset: usize) -> Self {
        Self { message, offset }
    }

    /// Render the offending line of `input`, a caret under the failing byte,
    /// and the message.
    ///
    /// When the offset lies outside the input only the message is returned.
    pub fn full_error(&self, input: &[u8]) -> String {
        let mut out = String::new();
        if self.offset < input.len() {
            let is_break = |b: &u8| *b == b'\r' || *b == b'\n';
            let line_start = input[..self.offset]
                .iter()
                .rposition(is_break)
                .map_or(0, |p| p + 1);
            let line_end = input[self.offset..]
                .iter()
                .position(is_break)
                .map_or(input.len(), |p| self.offset + p);

            out.push_str(&String::from_utf8_lossy(&input[line_start..line_end]));
            out.push_str("\r\n");
            out.extend(std::iter::repeat(' ').take(self.offset - line_start));
            out.push_str("^\r\n");
        }
        out.push_str(self.message);
        out
    }
}

/// A successfully parsed value and the offset just past it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub next: usize,
}

impl<T> Parsed<T> {
    pub fn new(value: T, next: usize) -> Self {
        Self { value, next }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        Parsed {
            value: f(self.value),
            next: self.next,
        }
    }
}

/// Result shape shared by every primitive parser and field decoder.
pub type ParseResult<T> = Result<Parsed<T>, ParseError>;

fn fail<T>(message: &'static str, offset: usize) -> ParseResult<T> {
    Err(ParseError::new(message, offset))
}

/// Absolute offset of the unconsumed `input`, for a buffer ending at `end`.
fn offset_at(end: usize, input: &[u8]) -> usize {
    end - input.len()
}

/// Turn any nom failure into `message` at `offset`.
fn at<'a, T>(
    result: IResult<&'a [u8], T>,
    message: &'static str,
    offset: usize,
) -> Result<(&'a [u8], T), ParseError> {
    result.map_err(|_| ParseError::new(message, offset))
}

fn value_open(input: &[u8]) -> IResult<&[u8], char> {
    char(DSMR_VALUE_OPEN as char)(input)
}

fn value_close(input: &[u8]) -> IResult<&[u8], char> {
    char(DSMR_VALUE_CLOSE as char)(input)
}

fn unit_separator(input: &[u8]) -> IResult<&[u8], char> {
    char(DSMR_UNIT_SEPARATOR as char)(input)
}

fn decimal_point(input: &[u8]) -> IResult<&[u8], char> {
    char('.')(input)
}

fn digits(input: &[u8]) -> IResult<&[u8], &[u8]> {
    digit0(input)
}

fn until_close(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_till(|b| b == DSMR_VALUE_CLOSE)(input)
}

/// Succeeds at the end of input or before one of `stops`, consuming nothing.
fn followed_by<'a>(input: &'a [u8], stops: &'static [u8]) -> IResult<&'a [u8], Option<char>> {
    if input.is_empty() {
        return Ok((input, None));
    }
    peek(one_of(stops))(input).map(|(rest, c)| (rest, Some(c)))
}

fn checksum_text(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take(DSMR_CRC_LEN)(input)
}

fn checksum_digits(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while_m_n(DSMR_CRC_LEN, DSMR_CRC_LEN, is_hex_digit)(input)
}

fn remainder(input: &[u8]) -> IResult<&[u8], &[u8]> {
    rest(input)
}

/// Append decimal `digits` to `value`; `offset` is where the digits start.
fn accumulate(value: u64, digits: &[u8], offset: usize) -> Result<u64, ParseError> {
    digits.iter().enumerate().try_fold(value, |acc, (i, &d)| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(d - b'0')))
            .ok_or(ParseError::new("Number too large", offset + i))
    })
}

/// Parse `(text)` and return the text, which must be `min..=max` bytes long.
pub fn parse_string(
    buf: &[u8],
    pos: usize,
    end: usize,
    min: usize,
    max: usize,
) -> ParseResult<String> {
    let end = end.min(buf.len());
    if pos > end {
        return fail("Missing (", pos);
    }
    let (input, _) = at(value_open(&buf[pos..end]), "Missing (", pos)?;
    let start = offset_at(end, input);
    let (input, text) = at(until_close(input), "Missing )", end)?;
    let (input, _) = at(value_close(input), "Missing )", end)?;

    if text.len() < min || text.len() > max {
        return fail("Invalid string length", start);
    }
    Ok(Parsed::new(
        String::from_utf8_lossy(text).into_owned(),
        offset_at(end, input),
    ))
}

/// Parse `(digits[.digits][*unit])` into an integer scaled by
/// `10^max_decimals`.
///
/// Fewer decimals than `max_decimals` are padded, extra decimals are
/// truncated. With `max_decimals == 0` a decimal point is not accepted. When
/// `unit` is non-empty the value must carry that unit (compared without
/// regard to case); an empty `unit` means the value must not carry one.
pub fn parse_num(
    buf: &[u8],
    pos: usize,
    end: usize,
    max_decimals: usize,
    unit: &str,
) -> ParseResult<u64> {
    let end = end.min(buf.len());
    if pos > end {
        return fail("Missing (", pos);
    }
    let (input, _) = at(value_open(&buf[pos..end]), "Missing (", pos)?;

    let int_start = offset_at(end, input);
    let (input, integer) = at(digits(input), "Invalid number", int_start)?;
    at(followed_by(input, b"*.)"), "Invalid number", offset_at(end, input))?;
    let mut value = accumulate(0, integer, int_start)?;

    let mut input = input;
    let mut remaining = max_decimals;
    if max_decimals > 0 {
        if let Ok((after_point, _)) = decimal_point(input) {
            let frac_start = offset_at(end, after_point);
            let (after, fraction) = at(digits(after_point), "Invalid number", frac_start)?;
            at(followed_by(after, b"*)"), "Invalid number", offset_at(end, after))?;
            let kept = &fraction[..fraction.len().min(max_decimals)];
            value = accumulate(value, kept, frac_start)?;
            remaining -= kept.len();
            input = after;
        }
    }
    for _ in 0..remaining {
        value = value
            .checked_mul(10)
            .ok_or(ParseError::new("Number too large", offset_at(end, input)))?;
    }

    if !unit.is_empty() {
        let (after, _) = at(
            unit_separator(input),
            "Missing unit separator *",
            offset_at(end, input),
        )?;
        let unit_start = offset_at(end, after);
        let (after, _) = at(tag_no_case(unit.as_bytes())(after), "Invalid unit", unit_start)?;
        input = after;
    }

    let (input, _) = at(value_close(input), "Missing ) or extra data", offset_at(end, input))?;
    Ok(Parsed::new(value, offset_at(end, input)))
}

/// Copy `[pos, end)` verbatim. Never fails and consumes everything.
pub fn parse_raw(buf: &[u8], pos: usize, end: usize) -> ParseResult<String> {
    let end = end.min(buf.len());
    if pos > end {
        return fail("Invalid raw field range", pos);
    }
    let (input, text) = at(remainder(&buf[pos..end]), "Invalid raw field range", pos)?;
    Ok(Parsed::new(
        String::from_utf8_lossy(text).into_owned(),
        offset_at(end, input),
    ))
}

/// Parse the 4 hex digit checksum that follows the `!` footer.
pub fn parse_crc(buf: &[u8], pos: usize, end: usize) -> ParseResult<u16> {
    let end = end.min(buf.len());
    if pos > end {
        return fail("Insufficient data for checksum", pos);
    }
    let (input, text) = at(
        checksum_text(&buf[pos..end]),
        "Insufficient data for checksum",
        pos,
    )?;
    let (_, text) = at(checksum_digits(text), "Malformed checksum string", pos)?;
    let (_, crc) = at(hex_u32(text), "Malformed checksum string", pos)?;
    Ok(Parsed::new(crc as u16, offset_at(end, input)))
}
