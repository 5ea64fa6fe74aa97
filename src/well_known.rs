//! Text grammars of the well-known types that are not plain wrappers.

use chrono::DateTime;

use crate::{
    error::{Error, Result},
    io_utils,
    value::{DynamicValue, Duration, Timestamp},
};

const NANOS_PER_SECOND: u32 = 1_000_000_000;
const NANO_DIGITS: usize = 9;
/// Roughly 10 000 years, the range of `google.protobuf.Duration`.
const MAX_DURATION_SECONDS: i64 = 315_576_000_000;

/// Tokens the dynamic-value heuristic refuses to read as booleans.
const AMBIGUOUS_BOOL_TOKENS: &[&str] = &["1", "t", "T", "0", "f", "F"];

/// Parses `<decimal seconds>s`, e.g. `4s`, `-1.5s`, `3.000s`.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let bad = |reason: &str| Error::format("Duration", raw, reason);

    let body = raw.strip_suffix('s').ok_or_else(|| bad("missing 's' suffix"))?;
    let (negative, unsigned) = match body.as_bytes().first() {
        Some(b'-') => (true, &body[1..]),
        Some(b'+') => (false, &body[1..]),
        _ => (false, body),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(bad("missing number"));
    }
    if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(bad("expected decimal seconds"));
    }

    let seconds: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().map_err(|_| bad("seconds out of range"))?
    };
    let nanos = fraction_to_nanos(fraction);
    if seconds > MAX_DURATION_SECONDS || (seconds == MAX_DURATION_SECONDS && nanos > 0) {
        return Err(bad("seconds out of range"));
    }

    if negative {
        Ok(Duration {
            seconds: -seconds,
            nanos: -nanos,
        })
    } else {
        Ok(Duration { seconds, nanos })
    }
}

// Digits past nanosecond precision are truncated.
fn fraction_to_nanos(fraction: &str) -> i32 {
    let mut nanos: u32 = 0;
    let mut digits = fraction.bytes();
    for _ in 0..NANO_DIGITS {
        let digit = digits.next().map_or(0, |b| u32::from(b - b'0'));
        nanos = nanos * 10 + digit;
    }
    debug_assert!(nanos < NANOS_PER_SECOND);
    nanos as i32
}

/// Parses an RFC 3339 timestamp with up to nanosecond precision.
pub fn parse_timestamp(raw: &str) -> Result<Timestamp> {
    let parsed =
        DateTime::parse_from_rfc3339(raw).map_err(|err| Error::format("Timestamp", raw, err))?;
    // chrono folds a leap second into the nanos field.
    let nanos = parsed.timestamp_subsec_nanos();
    if nanos >= NANOS_PER_SECOND {
        return Err(Error::format("Timestamp", raw, "second out of range"));
    }
    Ok(Timestamp {
        seconds: parsed.timestamp(),
        nanos: nanos as i32,
    })
}

/// Classifies free text as null, number, boolean or string.
///
/// Precedence: empty text is null; text containing `.` that parses as a
/// float is a number; a boolean word (not one of `1 t T 0 f F`) is a
/// boolean; anything else that parses as a float is a number; the rest is
/// kept as a string.
pub fn parse_dynamic(raw: &str) -> DynamicValue {
    if raw.is_empty() {
        return DynamicValue::Null;
    }
    if raw.contains('.')
        && let Ok(number) = raw.parse::<f64>()
    {
        return DynamicValue::Number(number);
    }
    if !AMBIGUOUS_BOOL_TOKENS.contains(&raw)
        && let Some(b) = parse_bool_token(raw)
    {
        return DynamicValue::Bool(b);
    }
    if let Ok(number) = raw.parse::<f64>() {
        return DynamicValue::Number(number);
    }
    DynamicValue::String(raw.to_string())
}

/// Decodes a ListValue cell: empty text is an empty list.
pub fn parse_list_value(raw: &str) -> Result<Vec<DynamicValue>> {
    if raw.is_empty() {
        return Ok(Vec::new());
    }
    Ok(io_utils::split_cell(raw)?
        .iter()
        .map(|item| parse_dynamic(item))
        .collect())
}

/// The boolean spellings accepted anywhere in a cell.
pub fn parse_bool_token(token: &str) -> Option<bool> {
    match token {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
