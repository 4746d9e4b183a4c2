//! Time representations shared by the store, the astro primitives and the scheduler.
//!
//! Stored timestamps are canonical `YYYY-MM-DD HH:MM:SS` UTC strings; in memory
//! everything is a `chrono::DateTime<Utc>`. Sidereal computations work on
//! Modified Julian Dates.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical storage format for timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// MJD of the Unix epoch (1970-01-01 00:00:00 UTC).
const MJD_UNIX_EPOCH: f64 = 40587.0;

/// Error returned when a stored timestamp does not follow [`TIMESTAMP_FORMAT`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp '{input}': expected YYYY-MM-DD HH:MM:SS")]
pub struct TimeParseError {
    pub input: String,
}

/// Format a UTC instant in the canonical storage form (sub-seconds dropped).
pub fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a canonical storage timestamp.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, TimeParseError> {
    let err = || TimeParseError {
        input: s.to_string(),
    };
    if s.len() != 19 {
        return Err(err());
    }
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| err())
}

/// Parse an optional stored timestamp column.
pub fn parse_optional_timestamp(s: Option<&str>) -> Result<Option<DateTime<Utc>>, TimeParseError> {
    s.map(parse_timestamp).transpose()
}

/// Drop the sub-second part so that values survive a storage round trip unchanged.
pub fn truncate_to_second(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp(t.timestamp(), 0).unwrap_or(t)
}

/// Serde adapter writing `DateTime<Utc>` as a canonical timestamp string.
pub mod serde_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_timestamp(t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional canonical timestamps.
pub mod serde_opt_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        t: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match t {
            Some(t) => serializer.serialize_some(&super::format_timestamp(t)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        super::parse_optional_timestamp(raw.as_deref()).map_err(serde::de::Error::custom)
    }
}

/// Modified Julian Date representation.
/// MJD 0 = 1858-11-17 00:00:00 UTC
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ModifiedJulianDate(qtty::Days);

impl ModifiedJulianDate {
    /// Create a new MJD value.
    pub fn new<V: Into<qtty::Days>>(v: V) -> Self {
        Self(v.into())
    }

    /// Raw MJD value as f64.
    pub fn value(&self) -> f64 {
        self.0.value()
    }

    /// Convert to Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn to_unix_timestamp(&self) -> f64 {
        (self.value() - MJD_UNIX_EPOCH) * 86400.0
    }

    /// Create from Unix timestamp (seconds since 1970-01-01 00:00:00 UTC).
    pub fn from_unix_timestamp(timestamp: f64) -> Self {
        Self::new(timestamp / 86400.0 + MJD_UNIX_EPOCH)
    }

    /// Convert to chrono DateTime<Utc>.
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let secs = self.to_unix_timestamp();
        let secs_i64 = secs.floor() as i64;
        let nanos = ((secs - secs.floor()) * 1e9) as u32;
        DateTime::from_timestamp(secs_i64, nanos).unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Create from chrono DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self::from_unix_timestamp(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9)
    }
}

impl From<f64> for ModifiedJulianDate {
    fn from(v: f64) -> Self {
        ModifiedJulianDate::new(qtty::Days::new(v))
    }
}

/// Half-open UTC interval `[start, end)` with `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    #[serde(with = "serde_timestamp")]
    pub start: DateTime<Utc>,
    #[serde(with = "serde_timestamp")]
    pub end: DateTime<Utc>,
}

impl Period {
    /// Build a period, returning `None` when it would be empty or reversed.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }

    /// True when `other` lies completely inside this period (end inclusive).
    pub fn covers(&self, other: &Period) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn intersect(&self, other: &Period) -> Option<Period> {
        Period::new(self.start.max(other.start), self.end.min(other.end))
    }
}
