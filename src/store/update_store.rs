//! SQLite-backed update store
//!
//! A handle only exists once its file is at the current schema version.
//! Writes go through one `Mutex<Connection>`; extra readers can be opened
//! with [`UpdateStore::open_read_only`] and run alongside it under WAL.

use super::error::StoreError;
use super::migration::{migrate_connection, MigrationSummary};
use super::record::{collapse_duplicates, UpdateRecord, EXPORT_BUCKET_MINUTES};
use super::schema::{self, CURRENT_SCHEMA_VERSION};
use crate::activity_core::minute::minute_to_datetime;
use crate::activity_core::steps::Steps;
use crate::activity_core::update::{format_mac_address, SourcedUpdate};
use crate::sqlite_pragma::{apply_optimized_pragmas, apply_read_only_pragmas};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, TransactionBehavior};
use std::collections::BTreeSet;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SELECT_RECORDS: &str = "SELECT identifier, timestamp, mac_address, walking_steps, running_steps
     FROM update_records";

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long to wait on another connection's lock.
    pub busy_timeout: Duration,
    /// Updates further than this from "now" are dropped on write.
    pub max_update_age: chrono::Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            max_update_age: chrono::Duration::days(30),
        }
    }
}

/// Counts from one `write_sourced_updates` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub received: usize,
    pub zero_steps: usize,
    pub out_of_window: usize,
    pub not_larger: usize,
    pub written: usize,
    pub export_buckets_queued: usize,
}

impl WriteSummary {
    pub fn absorb(&mut self, other: WriteSummary) {
        self.received += other.received;
        self.zero_steps += other.zero_steps;
        self.out_of_window += other.out_of_window;
        self.not_larger += other.not_larger;
        self.written += other.written;
        self.export_buckets_queued += other.export_buckets_queued;
    }
}

pub struct UpdateStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    options: StoreOptions,
    migration: MigrationSummary,
}

/// Open `path`, bringing it to `target_version` before returning.
pub fn migrate(path: impl AsRef<Path>, target_version: i64) -> Result<UpdateStore, StoreError> {
    UpdateStore::migrate_with_options(path, target_version, StoreOptions::default())
}

impl UpdateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        migrate(path, CURRENT_SCHEMA_VERSION)
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self, StoreError> {
        Self::migrate_with_options(path, CURRENT_SCHEMA_VERSION, options)
    }

    pub fn migrate_with_options(
        path: impl AsRef<Path>,
        target_version: i64,
        options: StoreOptions,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path).map_err(StoreError::from_open)?;
        conn.busy_timeout(options.busy_timeout)
            .map_err(StoreError::from_open)?;

        let migration = migrate_connection(&mut conn, target_version)?;

        apply_optimized_pragmas(&conn).map_err(StoreError::from_open)?;

        log::info!(
            "✅ Update store opened: {} (schema v{})",
            path.display(),
            migration.to_version
        );

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            options,
            migration,
        })
    }

    /// Open an existing, fully migrated file for queries only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let options = StoreOptions::default();

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(StoreError::from_open)?;
        conn.busy_timeout(options.busy_timeout)
            .map_err(StoreError::from_open)?;
        apply_read_only_pragmas(&conn).map_err(StoreError::from_open)?;

        let found = schema::detect_version(&conn)?;
        if found != CURRENT_SCHEMA_VERSION {
            return Err(StoreError::MigrationRequired {
                found,
                required: CURRENT_SCHEMA_VERSION,
            });
        }

        log::debug!("📖 Read-only update store opened: {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            options,
            migration: MigrationSummary {
                from_version: found,
                to_version: found,
                ..Default::default()
            },
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// What happened to the file while this handle was being opened.
    pub fn migration(&self) -> &MigrationSummary {
        &self.migration
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // a panic mid-call leaves no open transaction behind, so the
        // connection is still usable
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn schema_version(&self) -> Result<i64, StoreError> {
        Ok(schema::user_version(&self.lock())?)
    }

    pub fn record_count(&self) -> Result<i64, StoreError> {
        let count = self
            .lock()
            .query_row("SELECT COUNT(*) FROM update_records", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn write_sourced_updates(&self, updates: &[SourcedUpdate]) -> Result<WriteSummary, StoreError> {
        self.write_sourced_updates_at(updates, Utc::now())
    }

    /// Persist `updates` as seen at `now`.
    ///
    /// Updates with no steps, or timestamped further than `max_update_age`
    /// from `now`, are dropped. A record already stored under the same
    /// identifier is only replaced by one with strictly more steps. Every
    /// written record queues its export bucket.
    pub fn write_sourced_updates_at(
        &self,
        updates: &[SourcedUpdate],
        now: DateTime<Utc>,
    ) -> Result<WriteSummary, StoreError> {
        let mut summary = WriteSummary {
            received: updates.len(),
            ..Default::default()
        };

        let mut candidates = Vec::with_capacity(updates.len());
        for update in updates {
            if update.step_count() == 0 {
                summary.zero_steps += 1;
                continue;
            }
            let offset = update.timestamp.to_datetime() - now;
            let max_age = self.options.max_update_age;
            if offset >= max_age || -offset >= max_age {
                summary.out_of_window += 1;
                continue;
            }
            candidates.push(UpdateRecord::from(update));
        }

        if candidates.is_empty() {
            return Ok(summary);
        }

        let deduped = collapse_duplicates(candidates.iter().copied());
        summary.not_larger += candidates.len() - deduped.len();

        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut buckets = BTreeSet::new();
        {
            let mut existing = tx.prepare(&format!("{} WHERE identifier = ?1", SELECT_RECORDS))?;
            let mut upsert = tx.prepare(
                "INSERT INTO update_records (identifier, timestamp, mac_address, walking_steps, running_steps)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(identifier) DO UPDATE SET
                    walking_steps = excluded.walking_steps,
                    running_steps = excluded.running_steps",
            )?;
            let mut enqueue = tx.prepare("INSERT OR IGNORE INTO queued_export_buckets (time_value) VALUES (?1)")?;

            for record in deduped.values() {
                let persisted = existing
                    .query_row([record.identifier], UpdateRecord::from_row)
                    .optional()?;
                if let Some(persisted) = persisted {
                    if !record.supersedes(&persisted) {
                        summary.not_larger += 1;
                        continue;
                    }
                }

                upsert.execute(params![
                    record.identifier,
                    record.timestamp,
                    record.mac_address,
                    record.walking_steps,
                    record.running_steps,
                ])?;
                summary.written += 1;

                if buckets.insert(record.export_bucket()) {
                    summary.export_buckets_queued += enqueue.execute([record.export_bucket()])?;
                }
            }
        }
        tx.commit()?;

        let sources: BTreeSet<String> = updates.iter().map(|u| format_mac_address(u.mac_address)).collect();
        let first = deduped.values().map(|r| r.timestamp).min().unwrap_or_default();
        let last = deduped.values().map(|r| r.timestamp).max().unwrap_or_default();
        log::info!(
            "📝 Wrote {} of {} updates from {:?}, minute {} to {}",
            summary.written,
            summary.received,
            sources,
            first,
            last
        );
        log::debug!(
            "   ├─ dropped: {} zero-step, {} out of window, {} not larger",
            summary.zero_steps,
            summary.out_of_window,
            summary.not_larger
        );

        Ok(summary)
    }

    /// Records with `range.start <= timestamp < range.end`, ordered by
    /// timestamp then source.
    pub fn query(&self, range: Range<i32>, source: Option<i64>) -> Result<Vec<UpdateRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(&format!(
            "{} WHERE timestamp >= ?1 AND timestamp < ?2 AND (?3 IS NULL OR mac_address = ?3)
             ORDER BY timestamp, mac_address",
            SELECT_RECORDS
        ))?;

        let records = stmt
            .query_map(params![range.start, range.end, source], UpdateRecord::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Merged step total for `range`.
    pub fn steps(&self, range: Range<i32>, source: Option<i64>) -> Result<Steps, StoreError> {
        Ok(Steps::from_timestamp_grouped(self.query(range, source)?))
    }

    /// Earliest (`ascending`) or latest stored minute, optionally limited to
    /// one source and a minute range.
    pub fn boundary_timestamp(
        &self,
        ascending: bool,
        source: Option<i64>,
        within: Option<Range<i32>>,
    ) -> Result<Option<i32>, StoreError> {
        let aggregate = if ascending { "MIN" } else { "MAX" };
        let (low, high) = match within {
            Some(range) => (range.start as i64, range.end as i64),
            None => (i32::MIN as i64, i32::MAX as i64 + 1),
        };

        let conn = self.lock();
        let timestamp = conn.query_row(
            &format!(
                "SELECT {}(timestamp) FROM update_records
                 WHERE timestamp >= ?1 AND timestamp < ?2 AND (?3 IS NULL OR mac_address = ?3)",
                aggregate
            ),
            params![low, high, source],
            |row| row.get::<_, Option<i32>>(0),
        )?;
        Ok(timestamp)
    }

    /// Earliest and latest stored minute as instants.
    pub fn boundary_dates(&self, source: Option<i64>) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>, StoreError> {
        let first = self.boundary_timestamp(true, source, None)?;
        let last = self.boundary_timestamp(false, source, None)?;
        Ok(first.zip(last).map(|(first, last)| {
            (
                minute_to_datetime(first as i64),
                minute_to_datetime(last as i64 + 1),
            )
        }))
    }

    pub fn sources(&self) -> Result<Vec<i64>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT mac_address FROM update_records ORDER BY mac_address")?;
        let sources = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sources)
    }

    pub fn queued_export_buckets(&self) -> Result<Vec<i32>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT time_value FROM queued_export_buckets ORDER BY time_value")?;
        let buckets = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(buckets)
    }

    /// Records covered by one export bucket.
    pub fn export_bucket_records(&self, bucket: i32) -> Result<Vec<UpdateRecord>, StoreError> {
        let start = bucket.saturating_mul(EXPORT_BUCKET_MINUTES);
        self.query(start..start.saturating_add(EXPORT_BUCKET_MINUTES), None)
    }

    /// Remove buckets the exporter has handled. Returns how many were queued.
    pub fn fulfill_export_buckets(&self, buckets: &[i32]) -> Result<usize, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM queued_export_buckets WHERE time_value = ?1")?;
            for bucket in buckets {
                removed += stmt.execute([bucket])?;
            }
        }
        tx.commit()?;

        log::debug!("📤 Fulfilled {} export buckets", removed);
        Ok(removed)
    }

    /// Queue every stored record for export again.
    pub fn requeue_all_for_export(&self) -> Result<usize, StoreError> {
        let queued = self.lock().execute(
            "INSERT OR IGNORE INTO queued_export_buckets (time_value)
             SELECT DISTINCT (timestamp - (CASE WHEN timestamp < 0 THEN ?1 - 1 ELSE 0 END)) / ?1
             FROM update_records",
            [EXPORT_BUCKET_MINUTES],
        )?;

        log::info!("🔁 Requeued {} export buckets", queued);
        Ok(queued)
    }

    /// Remove every record and queued export bucket.
    pub fn delete_all(&self) -> Result<(), StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM update_records", [])?;
        tx.execute("DELETE FROM queued_export_buckets", [])?;
        tx.commit()?;

        log::warn!("🗑️  Deleted all stored updates from {}", self.path.display());
        Ok(())
    }
}
