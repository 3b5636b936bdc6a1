//! Device minute counter
//!
//! The wearable timestamps every report as a 23-bit count of minutes since a
//! fixed reference instant. `ActivityMinute` is that counter plus conversions
//! to and from wall-clock instants.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Unix timestamp of minute `0` (2016-01-01T00:00:00Z).
pub const REFERENCE_TIMESTAMP: i64 = 1_451_606_400;

/// Largest minute the device counter can hold (`2^23 - 1`).
pub const ACTIVITY_MINUTE_MAX: u32 = 8_388_607;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityMinuteError {
    OutOfRange(i64),
}

impl std::fmt::Display for ActivityMinuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivityMinuteError::OutOfRange(m) => write!(
                f,
                "Activity minute {} outside supported range 0..={}",
                m, ACTIVITY_MINUTE_MAX
            ),
        }
    }
}

impl std::error::Error for ActivityMinuteError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct ActivityMinute(u32);

impl ActivityMinute {
    pub const MIN: ActivityMinute = ActivityMinute(0);
    pub const MAX: ActivityMinute = ActivityMinute(ACTIVITY_MINUTE_MAX);

    pub fn new(minute: u32) -> Result<Self, ActivityMinuteError> {
        if minute > ACTIVITY_MINUTE_MAX {
            return Err(ActivityMinuteError::OutOfRange(minute as i64));
        }
        Ok(Self(minute))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Minute containing `instant` (seconds are floored away).
    pub fn from_datetime(instant: DateTime<Utc>) -> Result<Self, ActivityMinuteError> {
        let minutes = minutes_since_reference(instant);
        if minutes < 0 || minutes > ACTIVITY_MINUTE_MAX as i64 {
            return Err(ActivityMinuteError::OutOfRange(minutes));
        }
        Ok(Self(minutes as u32))
    }

    /// Like `from_datetime`, clamping to the supported range.
    pub fn saturating_from_datetime(instant: DateTime<Utc>) -> Self {
        let minutes = minutes_since_reference(instant).clamp(0, ACTIVITY_MINUTE_MAX as i64);
        Self(minutes as u32)
    }

    pub fn to_datetime(self) -> DateTime<Utc> {
        minute_to_datetime(self.0 as i64)
    }
}

impl TryFrom<u32> for ActivityMinute {
    type Error = ActivityMinuteError;

    fn try_from(minute: u32) -> Result<Self, Self::Error> {
        ActivityMinute::new(minute)
    }
}

impl From<ActivityMinute> for u32 {
    fn from(minute: ActivityMinute) -> u32 {
        minute.0
    }
}

impl std::fmt::Display for ActivityMinute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Signed minute offset of `instant` from the reference, floored.
pub fn minutes_since_reference(instant: DateTime<Utc>) -> i64 {
    (instant.timestamp() - REFERENCE_TIMESTAMP).div_euclid(60)
}

/// Instant at the start of a (possibly negative) minute offset.
pub fn minute_to_datetime(minute: i64) -> DateTime<Utc> {
    let secs = REFERENCE_TIMESTAMP + minute * 60;
    Utc.timestamp_opt(secs, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
