//! Clip duration calculation from time-of-day bounds.
//!
//! Requests carry the clip bounds as `HH:MM:SS` strings. The transform tool
//! reports its position in microseconds, so the clip length is computed in
//! microseconds up front and reused by the progress monitor.

use thiserror::Error;

/// Microseconds in one second.
const MICROS_PER_SEC: i64 = 1_000_000;

/// Error type for clip duration calculation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DurationError {
    /// A clip bound does not match the HH:MM:SS layout
    #[error("Invalid time-of-day '{0}': expected HH:MM:SS")]
    InvalidLayout(String),

    /// The clip end is not after the clip start
    #[error("Invalid clip range: end '{end}' is not after start '{start}'")]
    NonPositive { start: String, end: String },
}

/// Parse a strict `HH:MM:SS` time-of-day into seconds since midnight.
///
/// Every field must be exactly two digits; hours are bounded to 00-23 and
/// minutes/seconds to 00-59.
pub fn parse_time_of_day(value: &str) -> Result<i64, DurationError> {
    let invalid = || DurationError::InvalidLayout(value.to_string());

    let mut fields = value.split(':');
    let hours = parse_two_digit_field(fields.next(), 23).ok_or_else(invalid)?;
    let minutes = parse_two_digit_field(fields.next(), 59).ok_or_else(invalid)?;
    let seconds = parse_two_digit_field(fields.next(), 59).ok_or_else(invalid)?;

    if fields.next().is_some() {
        return Err(invalid());
    }

    Ok(hours * 3600 + minutes * 60 + seconds)
}

/// Parse one two-digit field, rejecting values above `max`.
fn parse_two_digit_field(field: Option<&str>, max: i64) -> Option<i64> {
    let field = field?;
    if field.len() != 2 || !field.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: i64 = field.parse().ok()?;
    (value <= max).then_some(value)
}

/// Compute the clip length in microseconds from its time-of-day bounds.
///
/// Fails when either bound does not parse or when the end is not strictly
/// after the start. This runs before any process is spawned, so an invalid
/// range never creates a partial pipeline.
pub fn clip_duration_us(start: &str, end: &str) -> Result<i64, DurationError> {
    let start_secs = parse_time_of_day(start)?;
    let end_secs = parse_time_of_day(end)?;

    let elapsed_secs = end_secs - start_secs;
    if elapsed_secs <= 0 {
        return Err(DurationError::NonPositive {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    Ok(elapsed_secs * MICROS_PER_SEC)
}

/// Format a microsecond clip length back into `HH:MM:SS` for the transform
/// tool's duration flag. Sub-second remainders are truncated; clip bounds are
/// whole seconds so nothing is lost.
pub fn format_clip_duration(us: i64) -> String {
    let total_secs = us / MICROS_PER_SEC;
    format!(
        "{:02}:{:02}:{:02}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60
    )
}
