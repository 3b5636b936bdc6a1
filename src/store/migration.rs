//! Forward migration to the current layout
//!
//! All work happens inside one `IMMEDIATE` transaction. Either the old layout
//! survives untouched or the file ends at the current version with every
//! legacy row re-keyed.

use super::error::StoreError;
use super::identifier::legacy_folded_identifier;
use super::record::{collapse_duplicates, UpdateRecord};
use super::schema::{self, CURRENT_DDL, CURRENT_SCHEMA_VERSION};
use rusqlite::{params, Connection, Transaction, TransactionBehavior};

/// Outcome of bringing a file up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MigrationSummary {
    pub from_version: i64,
    pub to_version: i64,
    pub legacy_rows: usize,
    pub records_written: usize,
    pub duplicates_merged: usize,
}

impl MigrationSummary {
    pub fn migrated(&self) -> bool {
        self.from_version != self.to_version
    }
}

/// Bring `conn` up to `target_version`.
///
/// A file already at or above `target_version` (but not above the current
/// version) is left alone. Only the current version can be migrated to.
pub fn migrate_connection(conn: &mut Connection, target_version: i64) -> Result<MigrationSummary, StoreError> {
    if !(1..=CURRENT_SCHEMA_VERSION).contains(&target_version) {
        return Err(StoreError::UnsupportedTarget(target_version));
    }

    let found = schema::detect_version(conn)?;
    if found >= target_version {
        log::debug!("📊 Store at schema v{}, no migration needed", found);
        return Ok(MigrationSummary {
            from_version: found,
            to_version: found,
            ..Default::default()
        });
    }
    if target_version != CURRENT_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedTarget(target_version));
    }

    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(StoreError::from_migration)?;

    // another process may have migrated between detection and the lock
    let found = schema::detect_version(&tx)?;
    if found == CURRENT_SCHEMA_VERSION {
        return Ok(MigrationSummary {
            from_version: found,
            to_version: found,
            ..Default::default()
        });
    }

    log::info!("🔧 Migrating store from schema v{} to v{}", found, CURRENT_SCHEMA_VERSION);

    let summary = backfill(&tx, found)?;
    tx.commit().map_err(StoreError::from_migration)?;

    log::info!(
        "✅ Migration complete: {} legacy rows → {} records ({} duplicates merged)",
        summary.legacy_rows,
        summary.records_written,
        summary.duplicates_merged
    );

    Ok(summary)
}

fn backfill(tx: &Transaction<'_>, found: i64) -> Result<MigrationSummary, StoreError> {
    tx.execute_batch(CURRENT_DDL).map_err(StoreError::from_migration)?;

    let mut summary = MigrationSummary {
        from_version: found,
        to_version: CURRENT_SCHEMA_VERSION,
        ..Default::default()
    };

    if found > 0 {
        let legacy = read_legacy_rows(tx, found)?;
        summary.legacy_rows = legacy.len();

        let records = collapse_duplicates(legacy.iter().map(|row| row.record));
        summary.duplicates_merged = summary.legacy_rows - records.len();
        summary.records_written = write_records(tx, records.values())?;

        if found == 2 {
            let mismatched = legacy
                .iter()
                .filter(|row| {
                    row.legacy_identifier
                        != Some(legacy_folded_identifier(row.record.timestamp, row.record.mac_address))
                })
                .count();
            if mismatched > 0 {
                log::warn!("⚠️  {} legacy rows carried a stale identifier, re-keyed", mismatched);
            }
        }

        tx.execute_batch("DROP TABLE updates")
            .map_err(StoreError::from_migration)?;
    }

    schema::set_user_version(tx, CURRENT_SCHEMA_VERSION).map_err(StoreError::from_migration)?;
    Ok(summary)
}

struct LegacyRow {
    record: UpdateRecord,
    legacy_identifier: Option<i64>,
}

fn read_legacy_rows(tx: &Transaction<'_>, version: i64) -> Result<Vec<LegacyRow>, StoreError> {
    let sql = if version == 2 {
        "SELECT timestamp, source_hash, walking_backing, running_backing, identifier FROM updates"
    } else {
        "SELECT timestamp, source_hash, walking_backing, running_backing, NULL FROM updates"
    };

    let mut stmt = tx.prepare(sql).map_err(StoreError::from_open)?;
    let raw = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<i64>>(4)?,
            ))
        })
        .map_err(StoreError::from_open)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::FileCorrupt(format!("unreadable legacy row: {}", e)))?;

    raw.into_iter()
        .map(|(timestamp, source_hash, walking, running, legacy_identifier)| {
            let timestamp = i32::try_from(timestamp)
                .map_err(|_| StoreError::FileCorrupt(format!("legacy timestamp {} out of range", timestamp)))?;
            Ok(LegacyRow {
                record: UpdateRecord::new(
                    timestamp,
                    source_hash,
                    steps_from_backing(walking)?,
                    steps_from_backing(running)?,
                ),
                legacy_identifier,
            })
        })
        .collect()
}

/// Legacy step counts were stored as the signed reading of a `u8`.
fn steps_from_backing(backing: i64) -> Result<u8, StoreError> {
    if let Ok(signed) = i8::try_from(backing) {
        return Ok(signed as u8);
    }
    u8::try_from(backing)
        .map_err(|_| StoreError::FileCorrupt(format!("legacy step count {} out of range", backing)))
}

fn write_records<'a, I>(tx: &Transaction<'_>, records: I) -> Result<usize, StoreError>
where
    I: IntoIterator<Item = &'a UpdateRecord>,
{
    let mut stmt = tx
        .prepare(
            "INSERT INTO update_records (identifier, timestamp, mac_address, walking_steps, running_steps)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(identifier) DO UPDATE SET
                walking_steps = excluded.walking_steps,
                running_steps = excluded.running_steps
             WHERE excluded.walking_steps + excluded.running_steps
                 > update_records.walking_steps + update_records.running_steps",
        )
        .map_err(StoreError::from_migration)?;

    let mut written = 0;
    for record in records {
        stmt.execute(params![
            record.identifier,
            record.timestamp,
            record.mac_address,
            record.walking_steps,
            record.running_steps,
        ])
        .map_err(StoreError::from_migration)?;
        written += 1;
    }
    Ok(written)
}
