//! Calendar-aware time windows
//!
//! Windows are stepped in local wall-clock time for a `chrono_tz::Tz`, so a
//! DST transition shortens or lengthens the window it falls in rather than
//! shifting every later boundary off the hour.
//!
//! Local times are resolved to instants as follows:
//! - an ambiguous local time (clocks going back) takes the earliest instant
//! - a local time inside a gap (clocks going forward) is read with the offset
//!   in effect before the gap, which lands one real hour later

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A half-open window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundaryDates {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BoundaryDates {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// The local calendar day containing `instant`.
    pub fn day_containing(tz: Tz, instant: DateTime<Utc>) -> Self {
        CalendarBoundaryDates::from_midnight_before(tz, instant, instant).boundary_dates()
    }

    /// The local calendar day `date` in `tz`.
    pub fn local_day(tz: Tz, date: NaiveDate) -> Self {
        let start = resolve_local(tz, date.and_time(NaiveTime::MIN));
        let end = match date.succ_opt() {
            Some(next) => resolve_local(tz, next.and_time(NaiveTime::MIN)),
            None => start + Duration::days(1),
        };
        Self { start, end }
    }

    /// The `count` local days ending with `last`, or `None` when `count` is
    /// zero or the first day falls outside the calendar.
    pub fn local_days_ending(tz: Tz, last: NaiveDate, count: u32) -> Option<Self> {
        let back = Duration::try_days(i64::from(count.checked_sub(1)?))?;
        let first = last.checked_sub_signed(back)?;
        Some(Self::new(
            Self::local_day(tz, first).start,
            Self::local_day(tz, last).end,
        ))
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Fraction of the window elapsed at `instant`, clamped to `0.0..=1.0`.
    pub fn progress(&self, instant: DateTime<Utc>) -> f64 {
        if instant <= self.start {
            return 0.0;
        }
        if instant >= self.end {
            return 1.0;
        }

        let elapsed = (instant - self.start).num_milliseconds() as f64;
        let total = self.duration().num_milliseconds() as f64;
        elapsed / total
    }
}

impl std::fmt::Display for BoundaryDates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// A run of whole local days: `start` is the midnight at or before the first
/// instant, `end` the midnight after the local day of the last instant.
///
/// Two values built from different instants on the same days compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarBoundaryDates {
    pub tz: Tz,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarBoundaryDates {
    pub fn from_midnight_before(tz: Tz, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        let start = midnight_before(tz, from);
        let end = midnight_after(tz, to.max(from));
        Self { tz, start, end }
    }

    pub fn boundary_dates(&self) -> BoundaryDates {
        BoundaryDates::new(self.start, self.end)
    }

    pub fn day_boundary_dates(&self) -> Vec<BoundaryDates> {
        day_boundaries(self.tz, self.start, self.end)
    }

    pub fn hour_boundary_dates(&self) -> Vec<BoundaryDates> {
        hour_boundaries(self.tz, self.start, self.end)
    }
}

/// Consecutive windows ending on each local hour between `from` and `to`.
///
/// The first window starts at `from` and ends at the next local hour. A window
/// ending exactly at `to` is included; one that would end after it is not.
pub fn hour_boundaries(tz: Tz, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<BoundaryDates> {
    step_boundaries(from, to, |current, first| {
        let local = current.with_timezone(&tz).naive_local();
        let base = if first {
            local
                .date()
                .and_hms_opt(local.hour(), 0, 0)
                .unwrap_or(local)
        } else {
            local
        };
        resolve_local(tz, base + Duration::hours(1))
    })
}

/// Consecutive windows ending on each local midnight between `from` and `to`.
pub fn day_boundaries(tz: Tz, from: DateTime<Utc>, to: DateTime<Utc>) -> Vec<BoundaryDates> {
    step_boundaries(from, to, |current, _| {
        let local_date = current.with_timezone(&tz).date_naive();
        match local_date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
            Some(next) => resolve_local(tz, next),
            None => current + Duration::days(1),
        }
    })
}

fn step_boundaries<F>(from: DateTime<Utc>, to: DateTime<Utc>, mut next_end: F) -> Vec<BoundaryDates>
where
    F: FnMut(DateTime<Utc>, bool) -> DateTime<Utc>,
{
    let mut boundaries = Vec::new();
    let mut current = from;

    loop {
        let mut end = next_end(current, boundaries.is_empty());
        if end <= current {
            // zone data with back-to-back transitions; never stall
            end = current + Duration::hours(1);
        }
        if end > to {
            break;
        }
        boundaries.push(BoundaryDates::new(current, end));
        current = end;
    }

    boundaries
}

/// Local midnight starting the day that contains `instant`.
pub fn midnight_before(tz: Tz, instant: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = instant.with_timezone(&tz).date_naive();
    match local_date.and_hms_opt(0, 0, 0) {
        Some(midnight) => resolve_local(tz, midnight).min(instant),
        None => instant,
    }
}

/// Local midnight ending the day that contains `instant`.
pub fn midnight_after(tz: Tz, instant: DateTime<Utc>) -> DateTime<Utc> {
    let local_date = instant.with_timezone(&tz).date_naive();
    match local_date.succ_opt().and_then(|d| d.and_hms_opt(0, 0, 0)) {
        Some(midnight) => resolve_local(tz, midnight),
        None => instant,
    }
}

/// Resolve a wall-clock time in `tz` to a single instant.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // a day earlier is safely before the gap
            let before_gap = tz
                .offset_from_utc_datetime(&(naive - Duration::days(1)))
                .fix()
                .local_minus_utc();
            Utc.from_utc_datetime(&(naive - Duration::seconds(before_gap as i64)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::New_York;

    fn local(tz: Tz, y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        tz.with_ymd_and_hms(y, m, d, h, min, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn at(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).unwrap()
    }

    fn lengths(boundaries: &[BoundaryDates]) -> Vec<i64> {
        boundaries.iter().map(|b| b.duration().num_seconds()).collect()
    }

    #[test]
    fn test_normal_day() {
        let boundaries = hour_boundaries(New_York, at(1451624400), at(1451710800));

        assert_eq!(boundaries.len(), 24);
        assert_eq!(boundaries[0], BoundaryDates::new(at(1451624400), at(1451628000)));
        assert_eq!(boundaries[23].end, at(1451710800));
        assert!(lengths(&boundaries).iter().all(|&s| s == 3600));
    }

    #[test]
    fn test_spring_forward_day() {
        let from = local(New_York, 2016, 3, 13, 0, 0);
        let to = local(New_York, 2016, 3, 14, 0, 0);
        let boundaries = hour_boundaries(New_York, from, to);

        assert_eq!(boundaries.len(), 23);
        assert!(lengths(&boundaries).iter().all(|&s| s == 3600));
        // 01:00 EST is followed directly by 03:00 EDT
        assert_eq!(boundaries[1].end, local(New_York, 2016, 3, 13, 3, 0));
    }

    #[test]
    fn test_fall_back_day() {
        let from = local(New_York, 2016, 11, 6, 0, 0);
        let to = local(New_York, 2016, 11, 7, 0, 0);
        let boundaries = hour_boundaries(New_York, from, to);

        let mut expected = vec![3600, 7200];
        expected.extend(std::iter::repeat(3600).take(22));
        assert_eq!(lengths(&boundaries), expected);
        assert_eq!(lengths(&boundaries).iter().sum::<i64>(), 25 * 3600);
    }

    #[test]
    fn test_boundaries_are_contiguous() {
        let from = local(New_York, 2016, 11, 5, 0, 0);
        let to = local(New_York, 2016, 11, 8, 0, 0);
        let boundaries = hour_boundaries(New_York, from, to);

        assert_eq!(boundaries.first().unwrap().start, from);
        assert_eq!(boundaries.last().unwrap().end, to);
        for pair in boundaries.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }

    #[test]
    fn test_unaligned_start() {
        let from = local(New_York, 2016, 1, 1, 0, 30);
        let to = local(New_York, 2016, 1, 1, 3, 0);
        let boundaries = hour_boundaries(New_York, from, to);
        assert_eq!(lengths(&boundaries), vec![1800, 3600, 3600]);
    }

    #[test]
    fn test_partial_trailing_hour_excluded() {
        let from = local(New_York, 2016, 1, 1, 0, 0);
        let to = local(New_York, 2016, 1, 1, 2, 30);
        assert_eq!(hour_boundaries(New_York, from, to).len(), 2);
        assert!(hour_boundaries(New_York, from, from).is_empty());
    }

    #[test]
    fn test_day_boundaries_across_dst() {
        let from = local(New_York, 2016, 3, 12, 0, 0);
        let to = local(New_York, 2016, 3, 15, 0, 0);
        let days = day_boundaries(New_York, from, to);

        assert_eq!(lengths(&days), vec![24 * 3600, 23 * 3600, 24 * 3600]);
    }

    #[test]
    fn test_calendar_boundary_dates_normalised() {
        let a = CalendarBoundaryDates::from_midnight_before(
            New_York,
            local(New_York, 2016, 1, 1, 10, 0),
            local(New_York, 2016, 1, 3, 15, 0),
        );
        let b = CalendarBoundaryDates::from_midnight_before(
            New_York,
            local(New_York, 2016, 1, 1, 0, 0),
            local(New_York, 2016, 1, 3, 23, 59),
        );

        assert_eq!(a, b);
        assert_eq!(a.start, local(New_York, 2016, 1, 1, 0, 0));
        assert_eq!(a.end, local(New_York, 2016, 1, 4, 0, 0));
        assert_eq!(a.day_boundary_dates().len(), 3);
        assert_eq!(a.hour_boundary_dates().len(), 72);
    }

    #[test]
    fn test_day_containing() {
        let day = BoundaryDates::day_containing(New_York, at(1451624400 + 5 * 3600));
        assert_eq!(day, BoundaryDates::new(at(1451624400), at(1451710800)));
    }

    #[test]
    fn test_local_day() {
        let day = BoundaryDates::local_day(New_York, NaiveDate::from_ymd_opt(2016, 11, 6).unwrap());
        assert_eq!(day.duration(), Duration::hours(25));
        assert_eq!(day.start, local(New_York, 2016, 11, 6, 0, 0));
    }

    #[test]
    fn test_local_days_ending() {
        let last = NaiveDate::from_ymd_opt(2016, 3, 14).unwrap();
        let range = BoundaryDates::local_days_ending(New_York, last, 3).unwrap();
        assert_eq!(range.start, local(New_York, 2016, 3, 12, 0, 0));
        assert_eq!(range.end, local(New_York, 2016, 3, 15, 0, 0));
        assert_eq!(range.duration(), Duration::hours(71));

        assert_eq!(BoundaryDates::local_days_ending(New_York, last, 0), None);
        assert_eq!(BoundaryDates::local_days_ending(New_York, NaiveDate::MIN, 2), None);
    }

    #[test]
    fn test_contains_and_progress() {
        let window = BoundaryDates::new(at(1000), at(2000));

        assert!(window.contains(at(1000)));
        assert!(window.contains(at(1999)));
        assert!(!window.contains(at(2000)));
        assert!(!window.contains(at(999)));

        assert_eq!(window.progress(at(0)), 0.0);
        assert_eq!(window.progress(at(1500)), 0.5);
        assert_eq!(window.progress(at(3000)), 1.0);
    }
}
