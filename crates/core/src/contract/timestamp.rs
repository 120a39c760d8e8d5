//! Points in time for stamps and history
//!
//! `created_at`, `updated_at` and the commit time recorded on history
//! entries are all [`Timestamp`]s: whole microseconds since the Unix epoch,
//! UTC. Inside document bodies they travel as RFC 3339 strings, the format
//! date fields of the backing store index.
//!
//! ```
//! use verso_core::Timestamp;
//!
//! let ts = Timestamp::from_secs(1_560_384_000);
//! assert_eq!(ts.to_rfc3339(), "2019-06-13T00:00:00.000000Z");
//! assert_eq!(Timestamp::parse_rfc3339("2019-06-13T00:00:00Z"), Some(ts));
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const MICROS_PER_SEC: u64 = 1_000_000;

/// Microseconds since 1970-01-01T00:00:00Z
///
/// Pre-epoch instants are not representable and clamp to [`Timestamp::EPOCH`].
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// 1970-01-01T00:00:00Z
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Latest representable instant
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Wall-clock time, `EPOCH` if the clock reads earlier
    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp(u64::try_from(since_epoch.as_micros()).unwrap_or(u64::MAX))
    }

    /// From microseconds since the epoch
    pub const fn from_micros(micros: u64) -> Self {
        Timestamp(micros)
    }

    /// From whole seconds since the epoch
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(MICROS_PER_SEC))
    }

    /// Microseconds since the epoch
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// The next representable instant (one microsecond later)
    pub const fn succ(&self) -> Self {
        Timestamp(self.0.saturating_add(1))
    }

    /// Check if this instant is strictly earlier than `other`
    pub fn is_before(&self, other: Timestamp) -> bool {
        self < &other
    }

    /// Time from `earlier` to this instant, `None` if `earlier` is later
    pub fn duration_since(&self, earlier: Timestamp) -> Option<Duration> {
        self.0.checked_sub(earlier.0).map(Duration::from_micros)
    }

    /// Render for a document body, e.g. `2019-06-13T00:00:00.000000Z`
    pub fn to_rfc3339(&self) -> String {
        self.to_utc().to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Read a date string from a document body
    ///
    /// Besides RFC 3339 this accepts what date fields commonly hold without
    /// an offset: `2019-06-13T10:00:00[.frac]` and `2019-06-13`, both as UTC.
    pub fn parse_rfc3339(s: &str) -> Option<Self> {
        let utc = DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|n| n.and_utc())
            })
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()?
                    .and_hms_opt(0, 0, 0)
                    .map(|n| n.and_utc())
            })?;
        Some(Self::from_utc(utc))
    }

    fn from_utc(dt: DateTime<Utc>) -> Self {
        Timestamp(u64::try_from(dt.timestamp_micros()).unwrap_or(0))
    }

    fn to_utc(self) -> DateTime<Utc> {
        i64::try_from(self.0)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_micros)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Timestamp::from_utc(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JUNE_13_2019: u64 = 1_560_384_000;

    #[test]
    fn test_units() {
        assert_eq!(Timestamp::from_secs(3).as_micros(), 3_000_000);
        assert_eq!(Timestamp::default(), Timestamp::EPOCH);
        assert_eq!(Timestamp::from_secs(u64::MAX), Timestamp::MAX);
    }

    #[test]
    fn test_now_is_recent() {
        assert!(Timestamp::now() > Timestamp::from_secs(JUNE_13_2019));
    }

    #[test]
    fn test_succ_and_ordering() {
        let t = Timestamp::from_micros(41);
        assert_eq!(t.succ(), Timestamp::from_micros(42));
        assert!(t.is_before(t.succ()));
        assert!(!t.is_before(t));
        assert_eq!(Timestamp::MAX.succ(), Timestamp::MAX);
    }

    #[test]
    fn test_duration_since() {
        let a = Timestamp::from_micros(1_000);
        let b = Timestamp::from_micros(3_500);
        assert_eq!(b.duration_since(a), Some(Duration::from_micros(2_500)));
        assert_eq!(a.duration_since(b), None);
    }

    #[test]
    fn test_rfc3339_rendering() {
        let ts = Timestamp::from_secs(JUNE_13_2019);
        assert_eq!(ts.to_rfc3339(), "2019-06-13T00:00:00.000000Z");
        assert_eq!(ts.to_string(), ts.to_rfc3339());
        assert_eq!(Timestamp::EPOCH.to_rfc3339(), "1970-01-01T00:00:00.000000Z");
    }

    #[test]
    fn test_rfc3339_parse_variants() {
        let midnight = Timestamp::from_secs(JUNE_13_2019);
        for s in [
            "2019-06-13T00:00:00Z",
            "2019-06-13T02:00:00+02:00",
            "2019-06-13T00:00:00",
            "2019-06-13",
        ] {
            assert_eq!(Timestamp::parse_rfc3339(s), Some(midnight), "{s}");
        }
        assert_eq!(Timestamp::parse_rfc3339("13.6.2019 at noon"), None);
        assert_eq!(Timestamp::parse_rfc3339("1969-12-31"), Some(Timestamp::EPOCH));
    }

    #[test]
    fn test_rfc3339_keeps_microseconds() {
        let ts = Timestamp::from_micros(JUNE_13_2019 * 1_000_000 + 123_456);
        assert_eq!(Timestamp::parse_rfc3339(&ts.to_rfc3339()), Some(ts));
    }

    #[test]
    fn test_serde_is_plain_micros() {
        let ts = Timestamp::from_micros(1_234_567);
        assert_eq!(serde_json::to_string(&ts).unwrap(), "1234567");
        let back: Timestamp = serde_json::from_str("1234567").unwrap();
        assert_eq!(back, ts);
    }

    // years 1970..=9999, where the rendering has a fixed width
    const LAST_FIXED_WIDTH: u64 = 253_402_300_799_999_999;

    proptest::proptest! {
        #[test]
        fn prop_rfc3339_round_trips(micros in 0..=LAST_FIXED_WIDTH) {
            let ts = Timestamp::from_micros(micros);
            proptest::prop_assert_eq!(Timestamp::parse_rfc3339(&ts.to_rfc3339()), Some(ts));
        }

        #[test]
        fn prop_rendering_sorts_like_instants(a in 0..=LAST_FIXED_WIDTH, b in 0..=LAST_FIXED_WIDTH) {
            let (a, b) = (Timestamp::from_micros(a), Timestamp::from_micros(b));
            proptest::prop_assert_eq!(a.cmp(&b), a.to_rfc3339().cmp(&b.to_rfc3339()));
        }
    }
}
