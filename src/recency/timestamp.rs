//! Timestamp normalization
//!
//! Listings report times in several shapes:
//!
//! | Input                 | Meaning                                   |
//! |-----------------------|-------------------------------------------|
//! | `2024-05-01 12:30:45` | full date and time                        |
//! | `2024-05-01 12:30`    | full date, minute precision               |
//! | `2024-05-01`          | date only, taken as midnight              |
//! | `05-01 12:30`         | short form, year inferred from `now`      |
//! | `1714537845000`       | epoch milliseconds (fan-app APIs)         |
//! | `1714537845`          | epoch seconds                             |
//!
//! Short-form dates are reconstructed in the current year. When that lands
//! more than `SHORT_FORM_TOLERANCE_HOURS` in the future (a Dec 31 entry read
//! on Jan 1), or does not exist in the current year (Feb 29), the previous
//! year is used instead.

use crate::HarvestError;
use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, TimeZone};

/// How far in the future a reconstructed short-form date may lie before it
/// is rolled back one year
pub const SHORT_FORM_TOLERANCE_HOURS: i64 = 24;

const FULL_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];

/// The shape a timestamp was recognized as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    DateTime,
    DateOnly,
    ShortForm,
    EpochMillis,
    EpochSeconds,
}

/// Parses a listing timestamp relative to `now`
///
/// `now` is only consulted for short-form dates that omit the year.
///
/// # Returns
///
/// * `Ok((NaiveDateTime, TimestampFormat))` - The normalized local time
/// * `Err(HarvestError::Parse)` - The text matched no known format
pub fn parse_timestamp(
    text: &str,
    now: NaiveDateTime,
) -> Result<(NaiveDateTime, TimestampFormat), HarvestError> {
    let text = text.trim();

    if text.is_empty() {
        return Err(HarvestError::parse("empty timestamp"));
    }

    if text.chars().all(|c| c.is_ascii_digit()) {
        return parse_epoch(text);
    }

    for format in FULL_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Ok((parsed, TimestampFormat::DateTime));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok((midnight, TimestampFormat::DateOnly));
        }
    }

    parse_short_form(text, now).map(|parsed| (parsed, TimestampFormat::ShortForm))
}

fn parse_epoch(text: &str) -> Result<(NaiveDateTime, TimestampFormat), HarvestError> {
    let value: i64 = text
        .parse()
        .map_err(|e| HarvestError::parse(format!("invalid epoch '{}': {}", text, e)))?;

    let (resolved, format) = match text.len() {
        13 => (
            Local.timestamp_millis_opt(value).single(),
            TimestampFormat::EpochMillis,
        ),
        10 => (
            Local.timestamp_opt(value, 0).single(),
            TimestampFormat::EpochSeconds,
        ),
        _ => {
            return Err(HarvestError::parse(format!(
                "unsupported epoch width in '{}'",
                text
            )))
        }
    };

    resolved
        .map(|dt| (dt.naive_local(), format))
        .ok_or_else(|| HarvestError::parse(format!("epoch out of range: '{}'", text)))
}

fn parse_short_form(text: &str, now: NaiveDateTime) -> Result<NaiveDateTime, HarvestError> {
    // Parse against a leap year so "02-29" is accepted before the real year is known
    let month_day = NaiveDateTime::parse_from_str(&format!("2000-{}", text), "%Y-%m-%d %H:%M")
        .map_err(|_| HarvestError::parse(format!("unrecognized timestamp '{}'", text)))?;

    let tolerance = Duration::hours(SHORT_FORM_TOLERANCE_HOURS);

    match in_year(month_day, now.year()) {
        Some(candidate) if candidate - now <= tolerance => Ok(candidate),
        _ => in_year(month_day, now.year() - 1).ok_or_else(|| {
            HarvestError::parse(format!("'{}' does not exist in {}", text, now.year() - 1))
        }),
    }
}

fn in_year(month_day: NaiveDateTime, year: i32) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(year, month_day.month(), month_day.day())
        .map(|d| d.and_time(month_day.time()))
}
