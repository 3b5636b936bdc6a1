//! Legacy layouts must migrate to the same store as data written directly
//! to the current layout.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use stepledger::activity_core::minute::REFERENCE_TIMESTAMP;
use stepledger::store::identifier::legacy_folded_identifier;
use stepledger::store::schema::{user_version, LEGACY_V1_DDL, LEGACY_V2_DDL};
use stepledger::store::{StoreOptions, CURRENT_SCHEMA_VERSION};
use stepledger::{ActivityMinute, SourcedUpdate, StoreError, UpdateRecord, UpdateStore};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

/// (timestamp, source_hash, walking_backing, running_backing)
const LEGACY_ROWS: &[(i64, i64, i64, i64)] = &[(10, 10, 10, 10), (11, 10, 11, 11), (12, 10, 12, 12)];

fn now() -> DateTime<Utc> {
    Utc.timestamp_opt(REFERENCE_TIMESTAMP, 0).unwrap()
}

fn expected_records() -> Vec<UpdateRecord> {
    LEGACY_ROWS
        .iter()
        .map(|&(ts, mac, walking, running)| UpdateRecord::new(ts as i32, mac, walking as u8, running as u8))
        .collect()
}

fn create_v1(path: &Path, rows: &[(i64, i64, i64, i64)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(LEGACY_V1_DDL).unwrap();
    for row in rows {
        conn.execute(
            "INSERT INTO updates (timestamp, source_hash, walking_backing, running_backing)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.0, row.1, row.2, row.3],
        )
        .unwrap();
    }
}

fn create_v2(path: &Path, rows: &[(i64, i64, i64, i64)]) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(LEGACY_V2_DDL).unwrap();
    for row in rows {
        conn.execute(
            "INSERT INTO updates (identifier, timestamp, source_hash, walking_backing, running_backing)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                legacy_folded_identifier(row.0 as i32, row.1),
                row.0,
                row.1,
                row.2,
                row.3
            ],
        )
        .unwrap();
    }
}

fn table_exists(path: &Path, table: &str) -> bool {
    let conn = Connection::open(path).unwrap();
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get::<_, i64>(0),
    )
    .unwrap()
        > 0
}

#[test]
fn test_every_layout_converges() {
    let dir = tempdir().unwrap();
    let v1_path = dir.path().join("v1.db");
    let v2_path = dir.path().join("v2.db");
    let v3_path = dir.path().join("v3.db");

    create_v1(&v1_path, LEGACY_ROWS);
    create_v2(&v2_path, LEGACY_ROWS);

    let current = UpdateStore::open(&v3_path).unwrap();
    let updates: Vec<SourcedUpdate> = LEGACY_ROWS
        .iter()
        .map(|&(ts, mac, walking, running)| {
            SourcedUpdate::new(
                mac as u64,
                ActivityMinute::new(ts as u32).unwrap(),
                walking as u8,
                running as u8,
            )
        })
        .collect();
    current.write_sourced_updates_at(&updates, now()).unwrap();

    let from_v1 = UpdateStore::open(&v1_path).unwrap();
    let from_v2 = UpdateStore::open(&v2_path).unwrap();

    assert_eq!(from_v1.migration().from_version, 1);
    assert_eq!(from_v2.migration().from_version, 2);
    assert_eq!(from_v1.migration().records_written, 3);

    let expected = expected_records();
    for store in [&from_v1, &from_v2, &current] {
        assert_eq!(store.schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
        assert_eq!(store.query(0..100, None).unwrap(), expected);
    }

    assert!(!table_exists(&v1_path, "updates"));
    assert!(!table_exists(&v2_path, "updates"));
}

#[test]
fn test_reopen_is_a_no_op() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("v1.db");
    create_v1(&path, LEGACY_ROWS);

    let first = UpdateStore::open(&path).unwrap();
    assert!(first.migration().migrated());
    let records = first.query(0..100, None).unwrap();
    drop(first);

    let second = UpdateStore::open(&path).unwrap();
    assert!(!second.migration().migrated());
    assert_eq!(second.migration().from_version, CURRENT_SCHEMA_VERSION);
    assert_eq!(second.query(0..100, None).unwrap(), records);
}

#[test]
fn test_folded_collisions_kept_apart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("v1.db");

    // both sources fold to the same 32-bit value
    let wide_mac = 0x1_0000_0001_i64;
    assert_eq!(legacy_folded_identifier(5, wide_mac), legacy_folded_identifier(5, 0));
    create_v1(&path, &[(5, wide_mac, 3, 0), (5, 0, 4, 0)]);

    let store = UpdateStore::open(&path).unwrap();
    let records = store.query(0..10, None).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(store.sources().unwrap(), vec![0, wide_mac]);
    // one minute from two devices merges to the larger report
    assert_eq!(store.steps(0..10, None).unwrap().walking_step_count, 4);
}

#[test]
fn test_duplicate_legacy_rows_keep_largest() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("v1.db");
    create_v1(&path, &[(20, 7, 1, 1), (20, 7, 5, 0), (20, 7, 2, 2)]);

    let store = UpdateStore::open(&path).unwrap();
    assert_eq!(store.migration().legacy_rows, 3);
    assert_eq!(store.migration().duplicates_merged, 2);
    assert_eq!(store.query(0..100, None).unwrap(), vec![UpdateRecord::new(20, 7, 5, 0)]);
}

#[test]
fn test_schema_too_new() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("future.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch("CREATE TABLE future (x INTEGER); PRAGMA user_version = 4;")
        .unwrap();

    match UpdateStore::open(&path) {
        Err(StoreError::SchemaTooNew { found, supported }) => {
            assert_eq!(found, 4);
            assert_eq!(supported, CURRENT_SCHEMA_VERSION);
        }
        other => panic!("expected SchemaTooNew, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_garbage_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("garbage.db");
    std::fs::write(&path, vec![b'x'; 4096]).unwrap();

    assert!(matches!(UpdateStore::open(&path), Err(StoreError::FileCorrupt(_))));
}

#[test]
fn test_declared_version_without_tables_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hollow.db");
    Connection::open(&path)
        .unwrap()
        .execute_batch("PRAGMA user_version = 2;")
        .unwrap();

    assert!(matches!(UpdateStore::open(&path), Err(StoreError::FileCorrupt(_))));
}

#[test]
fn test_locked_file_left_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("locked.db");
    create_v1(&path, LEGACY_ROWS);

    let holder = Connection::open(&path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE").unwrap();

    let options = StoreOptions {
        busy_timeout: Duration::ZERO,
        ..StoreOptions::default()
    };
    assert!(matches!(
        UpdateStore::open_with_options(&path, options.clone()),
        Err(StoreError::MigrationIoFailure(_))
    ));

    holder.execute_batch("ROLLBACK").unwrap();
    drop(holder);

    let check = Connection::open(&path).unwrap();
    assert_eq!(user_version(&check).unwrap(), 1);
    drop(check);
    assert!(table_exists(&path, "updates"));
    assert!(!table_exists(&path, "update_records"));

    let store = UpdateStore::open_with_options(&path, options).unwrap();
    assert_eq!(store.query(0..100, None).unwrap(), expected_records());
}

#[test]
fn test_read_only_requires_migration() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("v1.db");
    create_v1(&path, LEGACY_ROWS);

    assert!(matches!(
        UpdateStore::open_read_only(&path),
        Err(StoreError::MigrationRequired { found: 1, required: CURRENT_SCHEMA_VERSION })
    ));

    UpdateStore::open(&path).unwrap();
    let reader = UpdateStore::open_read_only(&path).unwrap();
    assert_eq!(reader.record_count().unwrap(), 3);
}

#[test]
fn test_unsupported_targets() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("v1.db");
    create_v1(&path, LEGACY_ROWS);

    assert!(matches!(stepledger::migrate(&path, 0), Err(StoreError::UnsupportedTarget(0))));
    assert!(matches!(stepledger::migrate(&path, 9), Err(StoreError::UnsupportedTarget(9))));
    assert!(matches!(stepledger::migrate(&path, 2), Err(StoreError::UnsupportedTarget(2))));

    // already at or past the target
    let store = stepledger::migrate(&path, 1).unwrap();
    assert!(!store.migration().migrated());
}
