//! Persisted update rows

use super::identifier::{identifier, UpdateId};
use crate::activity_core::bucket::MinuteStamped;
use crate::activity_core::steps::TimestampedStepsData;
use crate::activity_core::update::SourcedUpdate;
use rusqlite::Row;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Device minutes per export bucket.
pub const EXPORT_BUCKET_MINUTES: i32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UpdateRecord {
    #[serde(serialize_with = "serialize_id")]
    pub identifier: UpdateId,
    pub timestamp: i32,
    pub mac_address: i64,
    pub walking_steps: u8,
    pub running_steps: u8,
}

fn serialize_id<S: Serializer>(id: &UpdateId, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

impl UpdateRecord {
    pub fn new(timestamp: i32, mac_address: i64, walking_steps: u8, running_steps: u8) -> Self {
        Self {
            identifier: identifier(timestamp, mac_address),
            timestamp,
            mac_address,
            walking_steps,
            running_steps,
        }
    }

    pub fn step_count(&self) -> u16 {
        self.walking_steps as u16 + self.running_steps as u16
    }

    /// Whether this record should overwrite `persisted` for the same identifier.
    pub fn supersedes(&self, persisted: &UpdateRecord) -> bool {
        self.step_count() > persisted.step_count()
    }

    pub fn export_bucket(&self) -> i32 {
        self.timestamp.div_euclid(EXPORT_BUCKET_MINUTES)
    }

    /// Columns: identifier, timestamp, mac_address, walking_steps, running_steps.
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            identifier: row.get(0)?,
            timestamp: row.get(1)?,
            mac_address: row.get(2)?,
            walking_steps: row.get(3)?,
            running_steps: row.get(4)?,
        })
    }
}

impl From<&SourcedUpdate> for UpdateRecord {
    fn from(update: &SourcedUpdate) -> Self {
        UpdateRecord::new(
            update.timestamp.get() as i32,
            update.mac_address as i64,
            update.walking_steps,
            update.running_steps,
        )
    }
}

impl TimestampedStepsData for UpdateRecord {
    fn timestamp(&self) -> i32 {
        self.timestamp
    }

    fn walking_step_count(&self) -> i64 {
        self.walking_steps as i64
    }

    fn running_step_count(&self) -> i64 {
        self.running_steps as i64
    }
}

impl MinuteStamped for UpdateRecord {
    fn minute(&self) -> i64 {
        self.timestamp as i64
    }
}

/// Keep one record per identifier, preferring the larger step count. Ties are
/// broken on the individual counts so the outcome never depends on input order.
pub(crate) fn collapse_duplicates<I>(records: I) -> BTreeMap<UpdateId, UpdateRecord>
where
    I: IntoIterator<Item = UpdateRecord>,
{
    let mut by_id: BTreeMap<UpdateId, UpdateRecord> = BTreeMap::new();
    for record in records {
        by_id
            .entry(record.identifier)
            .and_modify(|kept| {
                if rank(&record) > rank(kept) {
                    *kept = record;
                }
            })
            .or_insert(record);
    }
    by_id
}

fn rank(record: &UpdateRecord) -> (u16, u8, u8) {
    (record.step_count(), record.walking_steps, record.running_steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_core::minute::ActivityMinute;

    #[test]
    fn test_from_sourced_update() {
        let update = SourcedUpdate::new(0x00_1a_2b_3c_4d_5e, ActivityMinute::new(4321).unwrap(), 200, 55);
        let record = UpdateRecord::from(&update);

        assert_eq!(record.timestamp, 4321);
        assert_eq!(record.mac_address, 0x00_1a_2b_3c_4d_5e);
        assert_eq!(record.identifier, identifier(4321, 0x00_1a_2b_3c_4d_5e));
        assert_eq!(record.step_count(), 255);
    }

    #[test]
    fn test_supersedes_only_when_strictly_larger() {
        let persisted = UpdateRecord::new(10, 1, 10, 10);
        assert!(!UpdateRecord::new(10, 1, 10, 10).supersedes(&persisted));
        assert!(!UpdateRecord::new(10, 1, 15, 0).supersedes(&persisted));
        assert!(UpdateRecord::new(10, 1, 0, 21).supersedes(&persisted));
    }

    #[test]
    fn test_export_bucket() {
        assert_eq!(UpdateRecord::new(0, 1, 1, 0).export_bucket(), 0);
        assert_eq!(UpdateRecord::new(19, 1, 1, 0).export_bucket(), 1);
        assert_eq!(UpdateRecord::new(20, 1, 1, 0).export_bucket(), 2);
    }

    #[test]
    fn test_serializes_identifier_as_hex() {
        let json = serde_json::to_value(UpdateRecord::new(0, 1, 2, 3)).unwrap();
        assert_eq!(json["identifier"], "000000000000000180000000");
        assert_eq!(json["walking_steps"], 2);
    }
}
