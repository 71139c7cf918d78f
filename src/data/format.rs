//! Field coercion and display formatting.
//!
//! Status documents carry every number as text; these helpers turn that text
//! into values and values into the short strings shown in the panel.

use chrono::{DateTime, FixedOffset, TimeZone, Utc};

/// Byte units, starting at kilobytes (the daemon reports sizes in KiB).
const BYTE_UNITS: [&str; 8] = ["KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Relative time units, largest first, with their length in seconds.
const RELATIVE_UNITS: &[(&str, i64)] = &[
    ("year", 365 * 86_400),
    ("quarter", 91 * 86_400),
    ("month", 30 * 86_400),
    ("week", 7 * 86_400),
    ("day", 86_400),
    ("hour", 3_600),
    ("minute", 60),
    ("second", 1),
];

/// Parse an integer, accepting a fractional part (truncated).
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    s.parse::<i64>()
        .ok()
        .or_else(|| s.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v.trunc() as i64))
}

/// Parse a float, rejecting NaN and infinities.
pub fn parse_float(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Integer value of an optional field, 0 when absent or not numeric.
pub fn to_int(value: Option<&str>) -> i64 {
    value.and_then(parse_int).unwrap_or(0)
}

/// Float value of an optional field, 0.0 when absent or not numeric.
pub fn to_float(value: Option<&str>) -> f64 {
    value.and_then(parse_float).unwrap_or(0.0)
}

/// Round to `decimals` places and drop trailing zeros ("50.0" -> "50").
fn trim_number(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value);
    let trimmed = if formatted.contains('.') {
        formatted.trim_end_matches('0').trim_end_matches('.')
    } else {
        formatted.as_str()
    };
    if trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Format a response time given in seconds.
///
/// One second or more is shown in seconds (3 decimals), below a millisecond
/// in milliseconds with 2 decimals, anything else in milliseconds with 1.
pub fn format_latency(seconds: f64) -> String {
    if seconds >= 1.0 {
        format!("{} s", trim_number(seconds, 3))
    } else if seconds < 0.001 {
        format!("{} ms", trim_number(seconds * 1000.0, 2))
    } else {
        format!("{} ms", trim_number(seconds * 1000.0, 1))
    }
}

/// Format a size in kilobytes with two decimals.
pub fn format_bytes(kilobytes: f64) -> String {
    format_bytes_with(kilobytes, 2)
}

/// Format a size in kilobytes using the largest unit that keeps the value
/// at or above 1.
pub fn format_bytes_with(kilobytes: f64, decimals: usize) -> String {
    if kilobytes == 0.0 {
        return "0 KB".to_string();
    }

    let mut value = kilobytes;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    format!("{:.*} {}", decimals, value, BYTE_UNITS[unit])
}

/// Relative phrase for an instant, without an "ago" suffix.
///
/// Picks the largest unit with a count of at least one, truncating toward
/// zero: an instant 90 minutes back reads "1 hour". Future instants read
/// "in 3 days".
pub fn relative_duration(epoch_secs: i64, now: DateTime<Utc>) -> String {
    relative_seconds(now.timestamp() - epoch_secs)
}

/// Relative phrase for an elapsed number of seconds (negative = future).
pub fn relative_seconds(elapsed: i64) -> String {
    let magnitude = elapsed.saturating_abs();
    let (unit, count) = RELATIVE_UNITS
        .iter()
        .map(|(unit, secs)| (*unit, magnitude / secs))
        .find(|(_, count)| *count >= 1)
        .unwrap_or(("second", 0));

    let plural = if count == 1 { "" } else { "s" };
    if elapsed < 0 {
        format!("in {} {}{}", count, unit, plural)
    } else {
        format!("{} {}{}", count, unit, plural)
    }
}

/// Resolve epoch seconds in the given offset.
fn local_datetime(epoch_secs: i64, offset: &FixedOffset) -> Option<DateTime<FixedOffset>> {
    offset.timestamp_opt(epoch_secs, 0).single()
}

/// Short US-style datetime, e.g. "5/3/2021, 2:40 PM".
pub fn format_datetime_short(epoch_secs: i64, offset: &FixedOffset) -> String {
    local_datetime(epoch_secs, offset)
        .map(|dt| dt.format("%-m/%-d/%Y, %-I:%M %p").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Short day-first datetime with a 24 hour clock, e.g. "03/05/2021, 14:40".
pub fn format_datetime_short_gb(epoch_secs: i64, offset: &FixedOffset) -> String {
    local_datetime(epoch_secs, offset)
        .map(|dt| dt.format("%d/%m/%Y, %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Fetch time label, e.g. "updated 3 minutes ago (14:40:05)".
pub fn updated_label(at: DateTime<Utc>, now: DateTime<Utc>, offset: &FixedOffset) -> String {
    format!(
        "updated {} ago ({})",
        relative_duration(at.timestamp(), now),
        at.with_timezone(offset).format("%H:%M:%S")
    )
}

/// Uppercase each lowercase letter that starts a word.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if at_word_start && c.is_ascii_lowercase() {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}
