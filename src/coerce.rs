//! Value Coercion Module
//!
//! Pure conversions from raw store strings to typed values. The same raw
//! string always yields the same result, whether it came from the cache or
//! from the store.

use chrono::Duration;
use serde::de::DeserializeOwned;

use crate::error::{DurationParseError, ParseCause, ParseValueError, ValueType};

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1_000 * NANOSECOND;
const MILLISECOND: u64 = 1_000 * MICROSECOND;
const SECOND: u64 = 1_000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

/// Largest magnitude a duration may have, reached only by negative values.
const MAX_MAGNITUDE: u64 = 1 << 63;

/// Parses a base-10 signed 64-bit integer.
pub fn parse_int(key: &str, raw: &str) -> Result<i64, ParseValueError> {
    raw.parse::<i64>()
        .map_err(|e| parse_error(key, ValueType::Int, e.into()))
}

/// Parses a 64-bit float.
pub fn parse_float(key: &str, raw: &str) -> Result<f64, ParseValueError> {
    raw.parse::<f64>()
        .map_err(|e| parse_error(key, ValueType::Float, e.into()))
}

/// Parses a duration string such as `"250ms"` or `"-1h30m"`.
pub fn parse_duration_value(key: &str, raw: &str) -> Result<Duration, ParseValueError> {
    parse_duration(raw).map_err(|e| parse_error(key, ValueType::Duration, e.into()))
}

/// Deserializes a JSON document.
pub fn parse_json<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, ParseValueError> {
    serde_json::from_str(raw).map_err(|e| parse_error(key, ValueType::Json, e.into()))
}

fn parse_error(key: &str, target: ValueType, source: ParseCause) -> ParseValueError {
    ParseValueError {
        key: key.to_string(),
        target,
        source,
    }
}

// == Duration Parsing ==
/// Parses a signed sequence of decimal numbers, each with an optional
/// fraction and a unit suffix: `"300ms"`, `"-1.5h"`, `"2h45m"`.
///
/// Valid units are `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `"0"`
/// is accepted; any other number needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let invalid = || DurationParseError::Invalid(input.to_string());

    if input.is_empty() {
        return Err(DurationParseError::Empty);
    }

    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::zero());
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        let first = s.as_bytes()[0];
        if !(first == b'.' || first.is_ascii_digit()) {
            return Err(invalid());
        }

        // Integer part
        let before = s.len();
        let (whole, rest) =
            leading_int(s).ok_or_else(|| DurationParseError::Overflow(input.to_string()))?;
        s = rest;
        let has_whole = before != s.len();

        // Fraction part
        let mut fraction = 0u64;
        let mut scale = 1.0f64;
        let mut has_fraction = false;
        if let Some(rest) = s.strip_prefix('.') {
            let before = rest.len();
            let (f, sc, rest) = leading_fraction(rest);
            fraction = f;
            scale = sc;
            has_fraction = before != rest.len();
            s = rest;
        }
        if !has_whole && !has_fraction {
            return Err(invalid());
        }

        // Unit
        let unit_len = s
            .bytes()
            .position(|c| c == b'.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        if unit_len == 0 {
            return Err(DurationParseError::MissingUnit(input.to_string()));
        }
        let (unit_str, rest) = s.split_at(unit_len);
        s = rest;
        let unit = unit_nanos(unit_str).ok_or_else(|| DurationParseError::UnknownUnit {
            unit: unit_str.to_string(),
            input: input.to_string(),
        })?;

        let overflow = || DurationParseError::Overflow(input.to_string());
        if whole > MAX_MAGNITUDE / unit {
            return Err(overflow());
        }
        let mut value = whole * unit;
        if fraction > 0 {
            value += (fraction as f64 * (unit as f64 / scale)) as u64;
            if value > MAX_MAGNITUDE {
                return Err(overflow());
            }
        }
        total = total
            .checked_add(value)
            .filter(|t| *t <= MAX_MAGNITUDE)
            .ok_or_else(overflow)?;
    }

    if negative {
        // total <= 2^63, so the negation fits in i64
        let nanos = (total as i128).wrapping_neg() as i64;
        return Ok(Duration::nanoseconds(nanos));
    }
    if total > MAX_MAGNITUDE - 1 {
        return Err(DurationParseError::Overflow(input.to_string()));
    }
    Ok(Duration::nanoseconds(total as i64))
}

/// Consumes leading ASCII digits. None on overflow past 2^63.
fn leading_int(s: &str) -> Option<(u64, &str)> {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let mut value: u64 = 0;
    for c in s[..digits].bytes() {
        if value > MAX_MAGNITUDE / 10 {
            return None;
        }
        value = value * 10 + u64::from(c - b'0');
        if value > MAX_MAGNITUDE {
            return None;
        }
    }
    Some((value, &s[digits..]))
}

/// Consumes leading fraction digits, returning the digits as an integer and
/// the power of ten they are scaled by. Digits past u63 precision are dropped.
fn leading_fraction(s: &str) -> (u64, f64, &str) {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    let mut value: u64 = 0;
    let mut scale = 1.0f64;
    let mut overflow = false;
    for c in s[..digits].bytes() {
        if overflow {
            continue;
        }
        if value > (MAX_MAGNITUDE - 1) / 10 {
            overflow = true;
            continue;
        }
        let next = value * 10 + u64::from(c - b'0');
        if next > MAX_MAGNITUDE {
            overflow = true;
            continue;
        }
        value = next;
        scale *= 10.0;
    }
    (value, scale, &s[digits..])
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(NANOSECOND),
        // ASCII u, micro sign U+00B5, greek mu U+03BC
        "us" | "\u{00b5}s" | "\u{03bc}s" => Some(MICROSECOND),
        "ms" => Some(MILLISECOND),
        "s" => Some(SECOND),
        "m" => Some(MINUTE),
        "h" => Some(HOUR),
        _ => None,
    }
}
