//! MTP date-time strings
//!
//! The wire format for timestamps is the 15-character string
//! `YYYYMMDDThhmmss` (zero-padded, UTC). Hosts occasionally omit the `T`
//! or append a timezone suffix, so the parser accepts both shapes and
//! ignores anything past the seconds field.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Format seconds-since-epoch as `YYYYMMDDThhmmss`.
pub fn format_date_time(secs: i64) -> String {
    let dt = DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    dt.format("%Y%m%dT%H%M%S").to_string()
}

/// Parse an MTP date-time string into seconds-since-epoch.
pub fn parse_date_time(value: &str) -> Option<i64> {
    let bytes = value.as_bytes();
    let parsed = if bytes.len() >= 15 && bytes[8] == b'T' {
        value
            .get(..15)
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S").ok())
    } else if bytes.len() >= 14 {
        value
            .get(..14)
            .and_then(|s| NaiveDateTime::parse_from_str(s, "%Y%m%d%H%M%S").ok())
    } else {
        None
    };
    parsed.map(|naive| naive.and_utc().timestamp())
}
