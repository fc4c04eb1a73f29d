//! Expiry policies for blob cache entries.
//!
//! Each policy maps the time an entry was stored to the moment it expires.
//! Calendar policies are evaluated on naive local date-times; the blob cache
//! converts stored UTC timestamps into the context's offset first.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, TimeDelta, Utc};
use std::time::Duration;
use tsdata_core::ReportType;

/// Midnight at the start of the quarter following `t`.
///
/// Quarters start in January, April, July and October.
#[must_use]
pub fn next_quarter_start(t: NaiveDateTime) -> NaiveDateTime {
    let month = ((t.month() - 1) / 3 + 1) * 3 + 1;
    if month > 12 {
        first_of(t.year() + 1, 1)
    } else {
        first_of(t.year(), month)
    }
}

/// Midnight on January 1st of the year following `t`.
#[must_use]
pub fn next_year_start(t: NaiveDateTime) -> NaiveDateTime {
    first_of(t.year() + 1, 1)
}

/// `t + ttl`, saturating at the largest representable date-time.
#[must_use]
pub fn constant_ttl(t: NaiveDateTime, ttl: Duration) -> NaiveDateTime {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| t.checked_add_signed(delta))
        .unwrap_or(NaiveDateTime::MAX)
}

fn first_of(year: i32, month: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MAX)
}

/// Expiry policy selected by a [`ReportType`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Expires at the start of the next calendar year.
    NextYearStart,
    /// Expires at the start of the next calendar quarter.
    NextQuarterStart,
    /// Expires a fixed duration after it was stored.
    Constant(Duration),
}

impl TtlPolicy {
    /// Policy for `report`; tags other than annual and quarter get `fixed_ttl`.
    #[must_use]
    pub const fn for_report(report: &ReportType, fixed_ttl: Duration) -> Self {
        match report {
            ReportType::Annual => Self::NextYearStart,
            ReportType::Quarter => Self::NextQuarterStart,
            ReportType::Other(_) => Self::Constant(fixed_ttl),
        }
    }

    /// Expiry of an entry stored at `stored`.
    #[must_use]
    pub fn expiry(&self, stored: NaiveDateTime) -> NaiveDateTime {
        match self {
            Self::NextYearStart => next_year_start(stored),
            Self::NextQuarterStart => next_quarter_start(stored),
            Self::Constant(ttl) => constant_ttl(stored, *ttl),
        }
    }

    /// Returns true once `now` has reached the expiry of an entry stored at `stored`.
    #[must_use]
    pub fn is_stale(&self, stored: NaiveDateTime, now: NaiveDateTime) -> bool {
        now >= self.expiry(stored)
    }

    /// [`is_stale`](Self::is_stale) for UTC instants, with calendar boundaries
    /// taken at `offset`.
    #[must_use]
    pub fn is_stale_at(
        &self,
        stored: DateTime<Utc>,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> bool {
        self.is_stale(
            stored.with_timezone(&offset).naive_local(),
            now.with_timezone(&offset).naive_local(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use proptest::prelude::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    #[test]
    fn test_next_quarter_start() {
        assert_eq!(next_quarter_start(at(2024, 2, 15, 9, 30, 0)), at(2024, 4, 1, 0, 0, 0));
        assert_eq!(next_quarter_start(at(2024, 4, 1, 0, 0, 0)), at(2024, 7, 1, 0, 0, 0));
        assert_eq!(next_quarter_start(at(2024, 9, 30, 23, 0, 0)), at(2024, 10, 1, 0, 0, 0));
        assert_eq!(next_quarter_start(at(2024, 11, 5, 0, 0, 0)), at(2025, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_quarter_boundary() {
        let policy = TtlPolicy::for_report(&ReportType::Quarter, Duration::from_secs(3600));
        let stored = at(2024, 2, 15, 0, 0, 0);
        assert!(!policy.is_stale(stored, at(2024, 3, 31, 23, 59, 59)));
        assert!(policy.is_stale(stored, at(2024, 4, 1, 0, 0, 0)));
    }

    #[test]
    fn test_annual_boundary() {
        let policy = TtlPolicy::for_report(&ReportType::Annual, Duration::from_secs(3600));
        let stored = at(2024, 6, 1, 0, 0, 0);
        assert_eq!(policy.expiry(stored), at(2025, 1, 1, 0, 0, 0));
        assert!(!policy.is_stale(stored, at(2024, 12, 31, 23, 59, 59)));
        assert!(policy.is_stale(stored, at(2025, 1, 1, 0, 0, 0)));
    }

    #[test]
    fn test_constant_ttl() {
        let policy = TtlPolicy::for_report(&"quote".into(), Duration::from_secs(3600));
        let stored = at(2024, 6, 1, 12, 0, 0);
        assert_eq!(policy, TtlPolicy::Constant(Duration::from_secs(3600)));
        assert!(!policy.is_stale(stored, at(2024, 6, 1, 12, 59, 59)));
        assert!(policy.is_stale(stored, at(2024, 6, 1, 13, 0, 0)));
        assert_eq!(constant_ttl(NaiveDateTime::MAX, Duration::from_secs(1)), NaiveDateTime::MAX);
    }

    #[test]
    fn test_is_stale_at_uses_offset() {
        // 2023-12-31T20:00Z is already 2024-01-01 04:00 at UTC+8.
        let stored = Utc.with_ymd_and_hms(2023, 12, 31, 15, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2023, 12, 31, 20, 0, 0).unwrap();
        let policy = TtlPolicy::NextYearStart;

        assert!(!policy.is_stale_at(stored, now, FixedOffset::east_opt(0).unwrap()));
        assert!(policy.is_stale_at(stored, now, FixedOffset::east_opt(8 * 3600).unwrap()));
    }

    fn any_datetime() -> impl Strategy<Value = NaiveDateTime> {
        (1970i32..2200, 1u32..=12, 1u32..=28, 0u32..24, 0u32..60, 0u32..60)
            .prop_map(|(y, m, d, h, min, s)| at(y, m, d, h, min, s))
    }

    proptest! {
        #[test]
        fn prop_quarter_start_is_next_boundary(t in any_datetime()) {
            let next = next_quarter_start(t);
            prop_assert!(next > t);
            prop_assert_eq!(next.day(), 1);
            prop_assert!(matches!(next.month(), 1 | 4 | 7 | 10));
            prop_assert_eq!(next.hour() + next.minute() + next.second(), 0);
            prop_assert!(next - t <= TimeDelta::days(92));
        }

        #[test]
        fn prop_year_start_follows_stored(t in any_datetime()) {
            let next = next_year_start(t);
            prop_assert_eq!(next.year(), t.year() + 1);
            prop_assert!(next_quarter_start(t) <= next);
        }
    }
}
