//! # Temporal Types
//!
//! `Timestamp` is UTC-only and truncated to whole seconds, rendering as
//! `YYYY-MM-DDTHH:MM:SSZ`.
//!
//! ## Security Invariant
//!
//! Every hashed structure takes its time from a caller-supplied logical
//! clock. Two runs given the same inputs and the same clock must produce
//! byte-identical canonical output, so a timestamp never carries sub-second
//! precision or a non-`Z` offset into a hash. [`Timestamp::now`] exists for
//! observation fields only, which are never hashed.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::SealError;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated. Observation use only.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string with a `Z` suffix.
    ///
    /// Explicit offsets, including `+00:00`, are rejected so that the stored
    /// string form is unique per instant.
    pub fn parse(s: &str) -> Result<Self, SealError> {
        if !s.ends_with('Z') {
            return Err(SealError::Construction(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        Self::parse_lenient(s)
    }

    /// Parse any RFC 3339 offset and convert to UTC. For ingesting external
    /// rows such as ledger files written by other tools.
    pub fn parse_lenient(s: &str) -> Result<Self, SealError> {
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            SealError::Construction(format!("invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    pub fn from_epoch_secs(secs: i64) -> Result<Self, SealError> {
        let dt = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| SealError::Construction(format!("invalid Unix timestamp: {secs}")))?;
        Ok(Self(dt))
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Shift by a signed number of seconds. Fails outside the representable
    /// range instead of wrapping or clamping.
    pub fn add_secs(&self, secs: i64) -> Result<Self, SealError> {
        Duration::try_seconds(secs)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Self)
            .ok_or_else(|| {
                SealError::Construction(format!("{self} shifted by {secs}s is out of range"))
            })
    }

    /// `2026-02-21T00:00:00Z`.
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }

    /// `20260221T000000Z`, used in artifact file names.
    pub fn to_compact(&self) -> String {
        self.0.format("%Y%m%dT%H%M%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_iso8601())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse_lenient(&s).map_err(serde::de::Error::custom)
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn now_has_no_subseconds() {
        assert_eq!(Timestamp::now().as_datetime().nanosecond(), 0);
    }

    #[test]
    fn from_utc_truncates() {
        let dt = Utc
            .with_ymd_and_hms(2026, 2, 21, 12, 30, 45)
            .unwrap()
            .with_nanosecond(123_456_789)
            .unwrap();
        assert_eq!(Timestamp::from_utc(dt).to_iso8601(), "2026-02-21T12:30:45Z");
    }

    #[test]
    fn parse_accepts_z_and_rejects_offsets() {
        assert!(Timestamp::parse("2026-02-21T00:00:00Z").is_ok());
        assert!(Timestamp::parse("2026-02-21T00:00:00+00:00").is_err());
        assert!(Timestamp::parse("2026-02-21T05:00:00+05:00").is_err());
        assert!(Timestamp::parse("2026-02-21").is_err());
        assert!(Timestamp::parse("").is_err());
    }

    #[test]
    fn lenient_converts_offset() {
        let ts = Timestamp::parse_lenient("2026-02-21T05:00:00+05:00").unwrap();
        assert_eq!(ts.to_iso8601(), "2026-02-21T00:00:00Z");
    }

    #[test]
    fn compact_form() {
        let ts = Timestamp::parse("2026-02-21T09:08:07Z").unwrap();
        assert_eq!(ts.to_compact(), "20260221T090807Z");
    }

    #[test]
    fn add_secs_moves_both_ways() {
        let ts = Timestamp::parse("2026-02-21T00:00:00Z").unwrap();
        assert_eq!(ts.add_secs(900).unwrap().to_iso8601(), "2026-02-21T00:15:00Z");
        assert_eq!(ts.add_secs(-1).unwrap().to_iso8601(), "2026-02-20T23:59:59Z");
    }

    #[test]
    fn add_secs_out_of_range_is_an_error() {
        let ts = Timestamp::parse("2026-02-21T00:00:00Z").unwrap();
        assert!(matches!(ts.add_secs(i64::MAX), Err(SealError::Construction(_))));
        assert!(matches!(ts.add_secs(i64::MIN), Err(SealError::Construction(_))));
        // Within TimeDelta but beyond the calendar range.
        assert!(ts.add_secs(400_000 * 365 * 86_400).is_err());
    }

    #[test]
    fn serde_uses_iso_string() {
        let ts = Timestamp::parse("2026-02-21T00:00:00Z").unwrap();
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, "\"2026-02-21T00:00:00Z\"");
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }

    #[test]
    fn ordering_follows_instant() {
        let a = Timestamp::parse("2026-02-21T00:00:00Z").unwrap();
        let b = Timestamp::parse("2026-02-21T00:00:01Z").unwrap();
        assert!(a < b);
        assert_eq!(Timestamp::from_epoch_secs(a.epoch_secs()).unwrap(), a);
    }
}
