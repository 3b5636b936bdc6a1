//! Step totals and duplicate-report merging
//!
//! A wearable re-sends the same minute when it resynchronises, and two reads
//! of one counter can disagree while the minute is still open. Reports for the
//! same minute are therefore collapsed to their per-field maximum before being
//! summed across minutes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

const WALKING_STRIDE_FACTOR: f64 = 0.413;
const RUNNING_STRIDE_FACTOR: f64 = 1.17;
const METERS_PER_MILE: f64 = 1609.344;

/// Walking and running step counts.
///
/// `Steps::ZERO` and `+` form a commutative monoid, so totals can be reduced
/// across windows in any order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Steps {
    pub walking_step_count: i64,
    pub running_step_count: i64,
}

impl Steps {
    pub const ZERO: Steps = Steps {
        walking_step_count: 0,
        running_step_count: 0,
    };

    pub fn new(walking_step_count: i64, running_step_count: i64) -> Self {
        Self {
            walking_step_count,
            running_step_count,
        }
    }

    pub fn step_count(&self) -> i64 {
        self.walking_step_count.saturating_add(self.running_step_count)
    }

    /// Estimated distance covered, in the unit `height` is given in.
    ///
    /// Stride is taken as `0.413 × height` walking and 17% longer running.
    pub fn distance(&self, height: f64) -> StepsDistance {
        let stride = height * WALKING_STRIDE_FACTOR;
        StepsDistance {
            walking: stride * self.walking_step_count as f64,
            running: stride * RUNNING_STRIDE_FACTOR * self.running_step_count as f64,
        }
    }

    pub fn combine(self, other: Steps) -> Steps {
        self + other
    }

    /// Per-field maximum of two values.
    fn field_max(self, other: Steps) -> Steps {
        Steps {
            walking_step_count: self.walking_step_count.max(other.walking_step_count),
            running_step_count: self.running_step_count.max(other.running_step_count),
        }
    }

    /// Streaming merge for input already sorted by timestamp (e.g. a store
    /// range scan). Agrees with [`merge`] on sorted input.
    pub fn from_timestamp_grouped<T, I>(sorted: I) -> Steps
    where
        T: TimestampedStepsData,
        I: IntoIterator<Item = T>,
    {
        let mut total = Steps::ZERO;
        let mut current: Option<(i32, Steps)> = None;

        for next in sorted {
            let next_steps = next.steps();
            current = match current {
                Some((timestamp, steps)) if timestamp == next.timestamp() => {
                    Some((timestamp, steps.field_max(next_steps)))
                }
                Some((_, steps)) => {
                    total += steps;
                    Some((next.timestamp(), next_steps))
                }
                None => Some((next.timestamp(), next_steps)),
            };
        }

        if let Some((_, steps)) = current {
            total += steps;
        }

        total
    }
}

impl Add for Steps {
    type Output = Steps;

    fn add(self, rhs: Steps) -> Steps {
        Steps {
            walking_step_count: self.walking_step_count.saturating_add(rhs.walking_step_count),
            running_step_count: self.running_step_count.saturating_add(rhs.running_step_count),
        }
    }
}

impl AddAssign for Steps {
    fn add_assign(&mut self, rhs: Steps) {
        *self = *self + rhs;
    }
}

impl Sum for Steps {
    fn sum<I: Iterator<Item = Steps>>(iter: I) -> Steps {
        iter.fold(Steps::ZERO, Add::add)
    }
}

/// Walking and running distance from [`Steps::distance`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepsDistance {
    pub walking: f64,
    pub running: f64,
}

impl StepsDistance {
    pub fn total(&self) -> f64 {
        self.walking + self.running
    }

    /// Active calories for a distance measured in meters.
    pub fn calories(&self, body_mass_kg: f64) -> f64 {
        let walking_miles = self.walking / METERS_PER_MILE;
        let running_miles = self.running / METERS_PER_MILE;
        (walking_miles * 1.2 + running_miles * 1.5) * body_mass_kg
    }
}

/// Anything carrying a minute timestamp and a pair of step counts.
pub trait TimestampedStepsData {
    fn timestamp(&self) -> i32;
    fn walking_step_count(&self) -> i64;
    fn running_step_count(&self) -> i64;

    fn steps(&self) -> Steps {
        Steps::new(self.walking_step_count(), self.running_step_count())
    }
}

impl<T: TimestampedStepsData> TimestampedStepsData for &T {
    fn timestamp(&self) -> i32 {
        (**self).timestamp()
    }

    fn walking_step_count(&self) -> i64 {
        (**self).walking_step_count()
    }

    fn running_step_count(&self) -> i64 {
        (**self).running_step_count()
    }
}

/// Normalised merge input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampedSteps {
    pub timestamp: i32,
    pub walking_step_count: i64,
    pub running_step_count: i64,
}

impl TimestampedSteps {
    pub fn new(timestamp: i32, walking_step_count: i64, running_step_count: i64) -> Self {
        Self {
            timestamp,
            walking_step_count,
            running_step_count,
        }
    }
}

impl TimestampedStepsData for TimestampedSteps {
    fn timestamp(&self) -> i32 {
        self.timestamp
    }

    fn walking_step_count(&self) -> i64 {
        self.walking_step_count
    }

    fn running_step_count(&self) -> i64 {
        self.running_step_count
    }
}

/// Reduce possibly-overlapping reports to one authoritative total.
///
/// Reports sharing a timestamp collapse to the per-field maximum; the
/// per-timestamp maxima are then summed. Input order is irrelevant.
pub fn merge<T, I>(records: I) -> Steps
where
    T: TimestampedStepsData,
    I: IntoIterator<Item = T>,
{
    let mut by_timestamp: HashMap<i32, Steps> = HashMap::new();

    for record in records {
        let steps = record.steps();
        by_timestamp
            .entry(record.timestamp())
            .and_modify(|existing| *existing = existing.field_max(steps))
            .or_insert(steps);
    }

    by_timestamp.into_values().sum()
}
