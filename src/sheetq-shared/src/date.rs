//! Date parsing and formatting helpers

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use polars::prelude::TimeUnit;

/// Date-time layouts tried in order before falling back to date-only layouts
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts, month-first for slashed dates
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];

/// Parse spreadsheet date text into a date-time
///
/// Accepts ISO dates with or without a time part, RFC 3339 timestamps (the
/// offset is dropped after conversion to UTC) and slashed `MM/DD/YYYY` or
/// `YYYY/MM/DD` dates.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Format a date-time the way cells are written out
///
/// Midnight values print as a bare date; fractional seconds are only
/// written when present.
#[must_use]
pub fn format_datetime(dt: &NaiveDateTime) -> String {
    if dt.nanosecond() != 0 {
        dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()
    } else if dt.hour() == 0 && dt.minute() == 0 && dt.second() == 0 {
        dt.format("%Y-%m-%d").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Convert a count of days since the Unix epoch into a date-time
#[must_use]
pub fn datetime_from_epoch_days(days: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1970, 1, 1)
        .and_then(|epoch| epoch.checked_add_signed(chrono::Duration::days(i64::from(days))))
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

/// Convert a polars timestamp into a date-time
#[must_use]
pub fn datetime_from_timestamp(ts: i64, unit: TimeUnit) -> Option<NaiveDateTime> {
    let dt = match unit {
        TimeUnit::Nanoseconds => Some(DateTime::from_timestamp_nanos(ts)),
        TimeUnit::Microseconds => DateTime::from_timestamp_micros(ts),
        TimeUnit::Milliseconds => DateTime::from_timestamp_millis(ts),
    };
    dt.map(|dt| dt.naive_utc())
}
