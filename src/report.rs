//! Windowed step totals over the store
//!
//! One range scan feeds every window: records are bucketed at the widest
//! minute width that still lines up with every window edge, then each
//! window merges the buckets it spans.

use crate::activity_core::boundary::{day_boundaries, hour_boundaries, BoundaryDates};
use crate::activity_core::bucket::bucketed;
use crate::activity_core::minute::{minute_to_datetime, minutes_since_reference};
use crate::activity_core::steps::{merge, Steps};
use crate::activity_core::update::format_mac_address;
use crate::store::{StoreError, UpdateStore};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::ops::Range;

/// Steps merged over one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WindowSteps {
    #[serde(flatten)]
    pub window: BoundaryDates,
    pub steps: Steps,
}

/// One local day with its hourly breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayReport {
    pub date: NaiveDate,
    pub time_zone: String,
    pub source: Option<String>,
    pub total: Steps,
    pub hours: Vec<WindowSteps>,
}

pub struct ActivityReport<'a> {
    store: &'a UpdateStore,
    tz: Tz,
}

impl<'a> ActivityReport<'a> {
    pub fn new(store: &'a UpdateStore, tz: Tz) -> Self {
        Self { store, tz }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    pub fn hour_boundaries(&self, range: &BoundaryDates) -> Vec<BoundaryDates> {
        hour_boundaries(self.tz, range.start, range.end)
    }

    pub fn total_steps(&self, range: &BoundaryDates) -> Result<Steps, StoreError> {
        self.store.steps(minute_range(range), None)
    }

    pub fn device_steps(&self, range: &BoundaryDates, mac_address: i64) -> Result<Steps, StoreError> {
        self.store.steps(minute_range(range), Some(mac_address))
    }

    pub fn hourly_steps(&self, range: &BoundaryDates) -> Result<Vec<WindowSteps>, StoreError> {
        self.windowed(self.hour_boundaries(range), None)
    }

    pub fn daily_steps(&self, range: &BoundaryDates) -> Result<Vec<WindowSteps>, StoreError> {
        self.windowed(day_boundaries(self.tz, range.start, range.end), None)
    }

    /// Totals for the local day `date`, optionally for a single device.
    pub fn day(&self, date: NaiveDate, source: Option<i64>) -> Result<DayReport, StoreError> {
        let day = BoundaryDates::local_day(self.tz, date);
        let hours = self.windowed(self.hour_boundaries(&day), source)?;
        let total: Steps = hours.iter().map(|h| h.steps).sum();

        Ok(DayReport {
            date,
            time_zone: self.tz.name().to_string(),
            source: source.map(|mac| format_mac_address(mac as u64)),
            total,
            hours,
        })
    }

    fn windowed(&self, windows: Vec<BoundaryDates>, source: Option<i64>) -> Result<Vec<WindowSteps>, StoreError> {
        let (first, last) = match (windows.first(), windows.last()) {
            (Some(first), Some(last)) => (first.start, last.end),
            _ => return Ok(Vec::new()),
        };

        let records = self
            .store
            .query(minute_range(&BoundaryDates::new(first, last)), source)?;

        let edges: Vec<i64> = windows
            .iter()
            .flat_map(|w| [ceil_minute(w.start), ceil_minute(w.end)])
            .collect();
        let denominator = common_width(&edges);
        let buckets = bucketed(&records, denominator);

        log::debug!(
            "📊 {} records over {} windows in {}-minute buckets",
            records.len(),
            windows.len(),
            denominator
        );

        Ok(windows
            .into_iter()
            .map(|window| {
                let width = denominator as i64;
                let keys = ceil_minute(window.start).div_euclid(width)..ceil_minute(window.end).div_euclid(width);
                let steps = merge(buckets.range(keys).flat_map(|(_, records)| records.iter()));
                WindowSteps { window, steps }
            })
            .collect())
    }
}

/// First whole minute at or after `instant`.
fn ceil_minute(instant: DateTime<Utc>) -> i64 {
    let minute = minutes_since_reference(instant);
    if minute_to_datetime(minute) < instant {
        minute + 1
    } else {
        minute
    }
}

/// Device minutes whose start lies in `range`.
fn minute_range(range: &BoundaryDates) -> Range<i32> {
    let clamp = |m: i64| m.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    clamp(ceil_minute(range.start))..clamp(ceil_minute(range.end))
}

/// Largest bucket width dividing every edge, capped to `u32`.
fn common_width(edges: &[i64]) -> u32 {
    let width = edges
        .iter()
        .fold(0u64, |acc, &edge| gcd(acc, edge.unsigned_abs()));
    match u32::try_from(width) {
        Ok(0) | Err(_) => 1,
        Ok(width) => width,
    }
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}
