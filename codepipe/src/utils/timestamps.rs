//! Timestamps for pipeline records and checkpoint ids.

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// UTC instant stored on states, feedback and events.
pub type Timestamp = DateTime<Utc>;

/// A checkpoint or record timestamp that could not be read back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// Nothing but whitespace.
    #[error("timestamp is empty")]
    Empty,

    /// Neither RFC 3339 nor a naive ISO 8601 date-time.
    #[error("unrecognised timestamp {0:?}")]
    Unrecognised(String),
}

/// Naive layouts accepted after RFC 3339, read as UTC.
const NAIVE_LAYOUTS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// The current instant.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Renders `dt` as RFC 3339 with microseconds and a `+00:00` offset.
///
/// ```
/// use codepipe::utils::{format_iso8601, now_utc};
///
/// let ts = format_iso8601(&now_utc());
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn format_iso8601(dt: &Timestamp) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Compact stamp embedded in checkpoint ids: `YYYYmmdd_HHMMSS_ffffff`.
#[must_use]
pub fn checkpoint_stamp(dt: &Timestamp) -> String {
    dt.format("%Y%m%d_%H%M%S_%6f").to_string()
}

/// Reads a timestamp written by [`format_iso8601`] or any RFC 3339 string.
/// Offset-less date-times are taken as UTC.
///
/// # Errors
///
/// `Empty` for blank input, `Unrecognised` for anything else unparseable.
pub fn parse_timestamp(input: &str) -> Result<Timestamp, TimestampError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(TimestampError::Empty);
    }

    DateTime::parse_from_rfc3339(input)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_LAYOUTS
                .iter()
                .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
                .map(|naive| naive.and_utc())
        })
        .ok_or_else(|| TimestampError::Unrecognised(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn test_reads_back_formatted_stamp() {
        let now = now_utc();
        let parsed = parse_timestamp(&format_iso8601(&now)).unwrap();
        assert_eq!(parsed.timestamp_micros(), now.timestamp_micros());
    }

    #[test]
    fn test_offset_is_normalised() {
        let dt = parse_timestamp("2024-03-09T09:05:01+02:00").unwrap();
        assert_eq!(dt.hour(), 7);
    }

    #[test]
    fn test_naive_input_is_utc() {
        let dt = parse_timestamp("2024-03-09 07:05:01.000250").unwrap();
        assert_eq!(dt.nanosecond(), 250_000);
        assert_eq!(dt.hour(), 7);
    }

    #[test]
    fn test_rejects_blank_and_garbage() {
        assert_eq!(parse_timestamp("  "), Err(TimestampError::Empty));
        assert!(matches!(
            parse_timestamp("last tuesday"),
            Err(TimestampError::Unrecognised(_))
        ));
    }

    #[test]
    fn test_checkpoint_stamp_is_fixed_width() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(checkpoint_stamp(&dt), "20240309_070501_000000");
    }
}
