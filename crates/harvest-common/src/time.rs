//! Time handling utilities for catalog timestamps and index documents.
//!
//! Every timestamp that leaves the engine is written in the index wire format
//! (`%Y-%m-%dT%H:%M:%SZ`, whole seconds, UTC). Catalog feeds may carry
//! nanosecond fractions which are dropped before parsing.

use std::borrow::Cow;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used by the metadata index.
pub const WIRE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Compact form used in harvester configs, e.g. `19920101T00:00:01Z`.
pub const COMPACT_FORMAT: &str = "%Y%m%dT%H:%M:%SZ";

/// Length of `YYYY-MM-DDTHH:MM:SS`.
const SECONDS_PREFIX_LEN: usize = 19;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeParseError {
    #[error("Invalid time format: {value} (expected {pattern})")]
    InvalidFormat { value: String, pattern: String },
}

/// Drop any sub-second fraction from an ISO-like timestamp.
///
/// `2020-01-01T00:00:00.123456789Z` becomes `2020-01-01T00:00:00Z`. Strings
/// that are already at most 19 characters are returned untouched.
pub fn truncate_fraction(value: &str) -> Cow<'_, str> {
    match value.get(..SECONDS_PREFIX_LEN) {
        Some(prefix) if value.len() > SECONDS_PREFIX_LEN => Cow::Owned(format!("{}Z", prefix)),
        _ => Cow::Borrowed(value),
    }
}

/// Parse a timestamp with a strftime-style pattern after truncating fractions.
pub fn parse_timestamp(value: &str, pattern: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let trimmed = truncate_fraction(value.trim());
    NaiveDateTime::parse_from_str(&trimmed, pattern)
        .map(|ndt| Utc.from_utc_datetime(&ndt))
        .map_err(|_| TimeParseError::InvalidFormat {
            value: value.to_string(),
            pattern: pattern.to_string(),
        })
}

/// Parse a timestamp stored in the index wire format.
pub fn parse_wire(value: &str) -> Result<DateTime<Utc>, TimeParseError> {
    parse_timestamp(value, WIRE_FORMAT)
}

/// Format a timestamp in the index wire format.
pub fn format_wire(dt: &DateTime<Utc>) -> String {
    dt.format(WIRE_FORMAT).to_string()
}

/// Eight digit `YYYYMMDD` stamp used in split granule names.
pub fn day_stamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%d").to_string()
}

/// Parse a configured window boundary.
///
/// Accepts the compact harvester form, RFC 3339, the wire format and bare dates.
pub fn parse_config_time(value: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let value = value.trim();

    if let Ok(dt) = parse_timestamp(value, COMPACT_FORMAT) {
        return Ok(dt);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(dt) = parse_wire(value) {
        return Ok(dt);
    }

    for pattern in ["%Y%m%d", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(value, pattern) {
            if let Some(ndt) = date.and_hms_opt(0, 0, 0) {
                return Ok(Utc.from_utc_datetime(&ndt));
            }
        }
    }

    Err(TimeParseError::InvalidFormat {
        value: value.to_string(),
        pattern: COMPACT_FORMAT.to_string(),
    })
}

/// Convert a filesystem timestamp to UTC.
pub fn from_system_time(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// The configured harvest window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// True when `dt` is strictly earlier than the window start.
    pub fn starts_after(&self, dt: &DateTime<Utc>) -> bool {
        dt < &self.start
    }

    /// Day-precision inclusive containment, used when splitting aggregates.
    pub fn contains_day(&self, dt: &DateTime<Utc>) -> bool {
        let day = dt.date_naive();
        self.start.date_naive() <= day && day <= self.end.date_naive()
    }
}

/// Serde adapters for wire-format timestamps read back from the index.
pub mod wire_time {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    /// Optional timestamp. Values written by other tools may not parse;
    /// those are treated as absent rather than failing the whole document.
    pub fn lenient<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.and_then(|value| super::parse_wire(&value).ok()))
    }
}
