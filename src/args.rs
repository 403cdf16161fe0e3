//! Coercion of string command arguments into typed values.
//!
//! The command surface is string-typed (CLI flags, host argument bags).
//! Time arguments are the only ones with real parsing rules; XDR wants
//! epoch milliseconds everywhere, and users write any of:
//!
//! - `1577836800000`: epoch milliseconds, passed through.
//! - `2020-01-01T00:00:00Z`: RFC 3339.
//! - `2020-01-01`: a date, taken as midnight UTC.
//! - `3 days`, `1 month ago`, `12 hours`: relative to now.
//!
//! These functions double as clap `value_parser`s, so a malformed value is
//! reported before any request is built.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};

use crate::error::{Result, XdrError};

/// Unit of a relative time expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    fn parse(word: &str) -> Option<Self> {
        let singular = word.strip_suffix('s').unwrap_or(word);
        match singular {
            "minute" | "min" => Some(TimeUnit::Minute),
            "hour" => Some(TimeUnit::Hour),
            "day" => Some(TimeUnit::Day),
            "week" => Some(TimeUnit::Week),
            "month" => Some(TimeUnit::Month),
            "year" => Some(TimeUnit::Year),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
            TimeUnit::Year => "year",
        }
    }
}

/// A relative time span such as `3 days`, used for time arguments and for
/// the poller's first-fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelativeTime {
    pub amount: u32,
    pub unit: TimeUnit,
}

impl RelativeTime {
    pub fn new(amount: u32, unit: TimeUnit) -> Self {
        RelativeTime { amount, unit }
    }

    /// The instant `self` before `now`. Months and years are calendar
    /// months, clamped to the end of shorter months.
    pub fn before(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let amount = i64::from(self.amount);
        match self.unit {
            TimeUnit::Minute => now.checked_sub_signed(Duration::minutes(amount)),
            TimeUnit::Hour => now.checked_sub_signed(Duration::hours(amount)),
            TimeUnit::Day => now.checked_sub_signed(Duration::days(amount)),
            TimeUnit::Week => now.checked_sub_signed(Duration::weeks(amount)),
            TimeUnit::Month => now.checked_sub_months(Months::new(self.amount)),
            TimeUnit::Year => now.checked_sub_months(Months::new(self.amount.checked_mul(12)?)),
        }
    }
}

impl fmt::Display for RelativeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.amount == 1 { "" } else { "s" };
        write!(f, "{} {}{plural}", self.amount, self.unit.as_str())
    }
}

impl FromStr for RelativeTime {
    type Err = XdrError;

    fn from_str(s: &str) -> Result<Self> {
        let lowered = s.trim().to_ascii_lowercase();
        let mut words = lowered.split_whitespace();
        let invalid = || {
            XdrError::validation(
                "time",
                format!("`{s}` is not a relative time like `3 days` or `1 month`"),
            )
        };

        let amount = words
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let unit = words.next().and_then(TimeUnit::parse).ok_or_else(invalid)?;
        match words.next() {
            None | Some("ago") if words.next().is_none() => Ok(RelativeTime { amount, unit }),
            _ => Err(invalid()),
        }
    }
}

/// Parses a time argument into epoch milliseconds, resolving relative
/// expressions against `now`.
pub fn parse_timestamp_at(value: &str, now: DateTime<Utc>) -> Result<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(XdrError::validation("time", "value is empty"));
    }

    if trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed
            .parse::<i64>()
            .map_err(|e| XdrError::validation("time", format!("`{trimmed}`: {e}")));
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(at.timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight.and_utc().timestamp_millis());
        }
    }

    let relative: RelativeTime = trimmed.parse().map_err(|_| {
        XdrError::validation(
            "time",
            format!(
                "`{trimmed}` is not epoch milliseconds, an RFC 3339 timestamp, \
                 a YYYY-MM-DD date or a relative time like `3 days`"
            ),
        )
    })?;
    relative
        .before(now)
        .map(|at| at.timestamp_millis())
        .ok_or_else(|| XdrError::validation("time", format!("`{trimmed}` is out of range")))
}

/// Parses a time argument into epoch milliseconds relative to the current
/// clock. Used as a clap `value_parser`.
pub fn parse_timestamp(value: &str) -> Result<i64> {
    parse_timestamp_at(value, Utc::now())
}

/// Formats epoch milliseconds the way incident `occurred` fields are
/// written (`2019-12-12T10:00:00Z`).
pub fn format_millis(millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|at| at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Rejects a blank required argument, returning it trimmed.
pub(crate) fn required<'a>(argument: &str, value: &'a str) -> Result<&'a str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(XdrError::validation(argument, "is required"));
    }
    Ok(trimmed)
}

/// Checks an optional argument against its allowed values
/// (case-insensitively) and returns it lowercased.
pub(crate) fn one_of(
    argument: &str,
    value: Option<&str>,
    allowed: &[&str],
) -> Result<Option<String>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let normalized = value.trim().to_ascii_lowercase();
    if allowed.contains(&normalized.as_str()) {
        Ok(Some(normalized))
    } else {
        Err(XdrError::validation(
            argument,
            format!("`{value}` is not one of {}", allowed.join(", ")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 3, 31, 12, 0, 0).unwrap()
    }

    #[test]
    fn epoch_millis_pass_through() {
        assert_eq!(
            parse_timestamp_at("1577836800000", fixed_now()).unwrap(),
            1_577_836_800_000
        );
    }

    #[test]
    fn rfc3339_and_plain_dates_resolve_to_utc_millis() {
        assert_eq!(
            parse_timestamp_at("2020-01-01T00:00:00Z", fixed_now()).unwrap(),
            1_577_836_800_000
        );
        assert_eq!(
            parse_timestamp_at("2020-01-01", fixed_now()).unwrap(),
            1_577_836_800_000
        );
    }

    #[test]
    fn relative_days_subtract_from_now() {
        let expected = Utc.with_ymd_and_hms(2020, 3, 30, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp_at("1 day", fixed_now()).unwrap(),
            expected.timestamp_millis()
        );
        assert_eq!(
            parse_timestamp_at("24 hours ago", fixed_now()).unwrap(),
            expected.timestamp_millis()
        );
    }

    #[test]
    fn relative_months_are_calendar_months() {
        // March 31 minus one month clamps to February 29 (leap year).
        let expected = Utc.with_ymd_and_hms(2020, 2, 29, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp_at("1 month", fixed_now()).unwrap(),
            expected.timestamp_millis()
        );
        let three = Utc.with_ymd_and_hms(2019, 12, 31, 12, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp_at("3 Months", fixed_now()).unwrap(),
            three.timestamp_millis()
        );
    }

    #[test]
    fn malformed_times_are_validation_errors() {
        for bad in ["", "soon", "3", "3 fortnights", "1 day from now", "-5 days"] {
            let err = parse_timestamp_at(bad, fixed_now()).unwrap_err();
            assert!(
                matches!(err, XdrError::Validation { .. }),
                "`{bad}` should be rejected as invalid input"
            );
        }
    }

    #[test]
    fn relative_time_displays_with_plural_units() {
        assert_eq!("3 days".parse::<RelativeTime>().unwrap().to_string(), "3 days");
        assert_eq!("1 weeks".parse::<RelativeTime>().unwrap().to_string(), "1 week");
    }

    #[test]
    fn format_millis_uses_zulu_seconds() {
        assert_eq!(
            format_millis(1_577_836_800_000).as_deref(),
            Some("2020-01-01T00:00:00Z")
        );
    }
}
