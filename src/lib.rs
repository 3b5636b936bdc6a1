//! stepledger - step-count reconciliation and storage for wearable activity
//! trackers.
//!
//! ```text
//! SourcedUpdate → store::BufferedUpdateWriter → store::UpdateStore (SQLite)
//!                                                    ↓
//!                     report::ActivityReport ← activity_core (boundaries, buckets, merge)
//! ```

pub mod activity_core;
pub mod config;
pub mod report;
pub mod sqlite_pragma;
pub mod store;

pub use activity_core::{
    bucketed, day_boundaries, hour_boundaries, merge, ActivityMinute, BoundaryDates,
    CalendarBoundaryDates, SourcedUpdate, Steps, TimestampedSteps,
};
pub use config::{ConfigError, StoreConfig};
pub use report::{ActivityReport, DayReport, WindowSteps};
pub use store::{identifier, migrate, StoreError, UpdateId, UpdateRecord, UpdateStore};
