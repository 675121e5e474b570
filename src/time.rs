//! Timestamp representation shared by the tag 0/1 handling and the
//! `time_mode` encoder dial.

use chrono::{DateTime, FixedOffset, SecondsFormat, TimeZone};

/// A point in time with nanosecond resolution and an encoding timezone.
///
/// CBOR numeric time (tag 1) has no timezone; `tz_sec_east` only matters for
/// the RFC 3339 text representations and round-trips through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    unix_epoch: i64,
    nanos: u32,
    tz_sec_east: i32,
}

impl Timestamp {
    pub fn new(unix_epoch: i64, nanos: u32, tz_sec_east: i32) -> Self {
        Self {
            unix_epoch,
            nanos,
            tz_sec_east,
        }
    }

    /// The zero time, produced when decoding NaN or infinite numeric times.
    pub fn zero() -> Self {
        Self::new(0, 0, 0)
    }

    pub fn from_rfc3339(s: &str) -> Option<Self> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Timestamp {
                unix_epoch: dt.timestamp(),
                nanos: dt.timestamp_subsec_nanos(),
                tz_sec_east: dt.offset().local_minus_utc(),
            })
            .ok()
    }

    /// Seconds since the Unix epoch as a float, the tag 1 fractional form.
    pub fn from_epoch_f64(seconds: f64) -> Self {
        if seconds.is_nan() || seconds.is_infinite() {
            return Self::zero();
        }
        let whole = seconds.floor();
        Timestamp {
            unix_epoch: whole.clamp(i64::MIN as f64, i64::MAX as f64) as i64,
            nanos: ((seconds - whole) * 1e9).round() as u32,
            tz_sec_east: 0,
        }
    }

    /// timestamp value in seconds since the Unix epoch
    pub fn unix_epoch(&self) -> i64 {
        self.unix_epoch
    }

    /// fractional part in nanoseconds, to be added
    pub fn nanos(&self) -> u32 {
        self.nanos
    }

    /// timezone to use when encoding as a string, in seconds to the east
    pub fn tz_sec_east(&self) -> i32 {
        self.tz_sec_east
    }

    /// Seconds since the epoch as a float with microsecond resolution.
    pub fn epoch_micros_f64(&self) -> f64 {
        let micros = (self.nanos as f64 / 1000.0).round();
        self.unix_epoch as f64 + micros / 1e6
    }

    /// RFC 3339 text; `nanos` selects the subsecond-digits variant.
    pub fn to_rfc3339(&self, nanos: bool) -> Option<String> {
        let offset = FixedOffset::east_opt(self.tz_sec_east)?;
        let dt = offset
            .timestamp_opt(self.unix_epoch, self.nanos)
            .single()?;
        let fmt = if nanos {
            SecondsFormat::AutoSi
        } else {
            SecondsFormat::Secs
        };
        Some(dt.to_rfc3339_opts(fmt, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_roundtrip() {
        let t = Timestamp::from_rfc3339("1983-03-22T12:17:05.345+02:00").unwrap();
        assert_eq!(t, Timestamp::new(417176225, 345_000_000, 7200));
        assert_eq!(
            t.to_rfc3339(true).unwrap(),
            "1983-03-22T12:17:05.345+02:00"
        );
        let t = Timestamp::from_rfc3339("2013-03-21T20:04:00Z").unwrap();
        assert_eq!(t, Timestamp::new(1363896240, 0, 0));
        assert_eq!(t.to_rfc3339(false).unwrap(), "2013-03-21T20:04:00Z");
    }

    #[test]
    fn fractional_epoch() {
        let t = Timestamp::from_epoch_f64(1363896240.5);
        assert_eq!(t, Timestamp::new(1363896240, 500_000_000, 0));
        assert_eq!(t.epoch_micros_f64(), 1363896240.5);

        assert_eq!(Timestamp::from_epoch_f64(f64::NAN), Timestamp::zero());
        assert_eq!(Timestamp::from_epoch_f64(f64::INFINITY), Timestamp::zero());

        // negative fractional times floor towards the epoch's past
        let t = Timestamp::from_epoch_f64(-0.25);
        assert_eq!(t, Timestamp::new(-1, 750_000_000, 0));
    }
}
