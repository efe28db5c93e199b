//! UTC clock abstraction. The core never calls `OffsetDateTime::now_utc()` directly;
//! it asks a `Clock`, so tests can pin time and the business timezone conversion has
//! exactly one place to live.

use time::{OffsetDateTime, UtcOffset};

/// A source of the current UTC instant.
///
/// Production code holds an `Arc<dyn Clock>` (or a concrete `SystemClock`) and never
/// reaches for the OS clock on its own. Tests substitute a `FixedClock`.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

/// The real clock, backed by the OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that always returns the same instant. Used in tests that assert exact
/// lead-time/backoff/cutoff arithmetic.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}

/// The configured business timezone, expressed as a fixed UTC offset.
///
/// Real-world DST-aware timezones would need `jiff`/`chrono-tz`; the source system
/// pins a single local offset per org (`LOCAL_TZ` in the original), so a fixed offset
/// is a faithful port rather than a simplification.
#[derive(Debug, Clone, Copy)]
pub struct BusinessTimezone {
    offset: UtcOffset,
}

impl BusinessTimezone {
    pub fn from_offset_hours(hours: i8) -> Self {
        Self {
            offset: UtcOffset::from_hms(hours, 0, 0).unwrap_or(UtcOffset::UTC),
        }
    }

    pub fn utc() -> Self {
        Self {
            offset: UtcOffset::UTC,
        }
    }

    pub fn to_local(&self, instant: OffsetDateTime) -> OffsetDateTime {
        instant.to_offset(self.offset)
    }

    pub fn local_midnight_to_utc(&self, date: time::Date) -> OffsetDateTime {
        date.with_hms(0, 0, 0)
            .unwrap_or_else(|_| date.midnight())
            .assume_offset(self.offset)
            .to_offset(UtcOffset::UTC)
    }
}

impl Default for BusinessTimezone {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn fixed_clock_is_stable() {
        let clock = FixedClock(datetime!(2026-01-01 00:00:00 UTC));
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn business_timezone_round_trips_through_utc() {
        let tz = BusinessTimezone::from_offset_hours(-5);
        let utc = datetime!(2026-03-01 15:00:00 UTC);
        let local = tz.to_local(utc);
        assert_eq!(local.hour(), 10);
    }
}
