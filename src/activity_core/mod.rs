//! Activity Core - pure step-count reconciliation
//!
//! Everything in this module is synchronous, allocation-only and free of I/O.
//!
//! # Flow
//!
//! ```text
//! SourcedUpdate (device minute, MAC, walking/running)
//!     ↓
//! bucketed / bucketed_by_device (fixed-width minute buckets)
//!     ↓
//! hour_boundaries / day_boundaries (DST-aware windows)
//!     ↓
//! merge (per-minute max, then sum) → Steps
//! ```

pub mod boundary;
pub mod bucket;
pub mod minute;
pub mod steps;
pub mod update;

pub use boundary::{day_boundaries, hour_boundaries, BoundaryDates, CalendarBoundaryDates};
pub use bucket::{bucketed, bucketed_by_device, MinuteStamped};
pub use minute::{ActivityMinute, ActivityMinuteError};
pub use steps::{merge, Steps, StepsDistance, TimestampedSteps, TimestampedStepsData};
pub use update::{SourcedUpdate, SourcedUpdateError};
