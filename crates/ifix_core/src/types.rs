//! Core type definitions: timestamps and record ids.

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

/// A UTC instant with millisecond precision.
///
/// Records carry timestamps as RFC 3339 strings (`2024-05-01T12:00:00.000Z`);
/// this type is used wherever they need to be compared or advanced. Because
/// every stored stamp uses the same fixed-width format, string order and
/// chronological order agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current time truncated to milliseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    /// Creates a timestamp from Unix milliseconds.
    #[must_use]
    pub fn from_millis(millis: i64) -> Self {
        Self(DateTime::from_timestamp_millis(millis).unwrap_or_default())
    }

    /// Returns the Unix time in milliseconds.
    #[must_use]
    pub fn as_millis(self) -> i64 {
        self.0.timestamp_millis()
    }

    /// Parses an RFC 3339 string or a bare `YYYY-MM-DD` date.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s.trim()) {
            return Some(Self::from_millis(dt.timestamp_millis()));
        }
        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Self::from_millis(dt.and_utc().timestamp_millis()))
    }

    /// Returns the current time, or one millisecond after `previous` if the
    /// clock has not moved past it.
    #[must_use]
    pub fn next_after(previous: Option<&str>) -> Self {
        let now = Self::now();
        match previous.and_then(Self::parse) {
            Some(prev) if prev >= now => prev.plus_millis(1),
            _ => now,
        }
    }

    /// Returns this timestamp shifted by `millis`.
    #[must_use]
    pub fn plus_millis(self, millis: i64) -> Self {
        Self(self.0 + Duration::milliseconds(millis))
    }

    /// Returns the wrapped `chrono` value.
    #[must_use]
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::from_millis(dt.timestamp_millis())
    }
}

/// Length of the random suffix appended to generated ids.
const ID_SUFFIX_LEN: usize = 9;

/// Generates a record id of the form `<prefix>_<millis>_<suffix>`.
///
/// The suffix is nine random lowercase alphanumerics. Ids are unique in
/// practice only; the store re-rolls on collision with an existing id.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(|b| char::from(b).to_ascii_lowercase())
        .collect();
    format!("{}_{}_{}", prefix, Timestamp::now().as_millis(), suffix)
}
