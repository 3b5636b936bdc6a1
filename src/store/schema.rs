//! On-disk layouts and version detection
//!
//! Versions are recorded in `PRAGMA user_version`:
//!
//! | version | tables |
//! |---------|--------|
//! | 0       | empty file |
//! | 1       | `updates` without a key |
//! | 2       | `updates` keyed by the folded 64-bit identifier |
//! | 3       | `update_records`, `queued_export_buckets` |

use super::error::StoreError;
use rusqlite::{Connection, OptionalExtension};

pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// DDL for the current version. Every statement is `IF NOT EXISTS`.
pub const CURRENT_DDL: &str = concat!(
    include_str!("../../sql/00_update_records.sql"),
    "\n",
    include_str!("../../sql/01_queued_export_buckets.sql"),
);

/// Version 1 layout. Step counts were kept as signed-byte bit patterns.
pub const LEGACY_V1_DDL: &str = "
    CREATE TABLE updates (
        timestamp INTEGER NOT NULL,
        source_hash INTEGER NOT NULL,
        walking_backing INTEGER NOT NULL,
        running_backing INTEGER NOT NULL
    );
    PRAGMA user_version = 1;
";

/// Version 2 layout.
pub const LEGACY_V2_DDL: &str = "
    CREATE TABLE updates (
        identifier INTEGER PRIMARY KEY,
        timestamp INTEGER NOT NULL,
        source_hash INTEGER NOT NULL,
        walking_backing INTEGER NOT NULL,
        running_backing INTEGER NOT NULL
    );
    PRAGMA user_version = 2;
";

const LEGACY_COLUMNS: &[&str] = &["timestamp", "source_hash", "walking_backing", "running_backing"];
const UPDATE_RECORD_COLUMNS: &[&str] = &[
    "identifier",
    "timestamp",
    "mac_address",
    "walking_steps",
    "running_steps",
];

pub fn user_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

pub fn set_user_version(conn: &Connection, version: i64) -> rusqlite::Result<()> {
    conn.pragma_update(None, "user_version", version)
}

fn table_exists(conn: &Connection, table: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
}

fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn user_table_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )
}

fn require_columns(conn: &Connection, table: &str, expected: &[&str], version: i64) -> Result<(), StoreError> {
    if !table_exists(conn, table).map_err(StoreError::from_open)? {
        return Err(StoreError::FileCorrupt(format!(
            "table {} missing for schema version {}",
            table, version
        )));
    }

    let columns = table_columns(conn, table).map_err(StoreError::from_open)?;
    if let Some(missing) = expected.iter().find(|c| !columns.iter().any(|have| have == *c)) {
        return Err(StoreError::FileCorrupt(format!(
            "column {}.{} missing for schema version {}",
            table, missing, version
        )));
    }
    Ok(())
}

/// Read the declared version and check the file's tables agree with it.
pub fn detect_version(conn: &Connection) -> Result<i64, StoreError> {
    let version = user_version(conn).map_err(StoreError::from_open)?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::SchemaTooNew {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }

    match version {
        0 => {
            if user_table_count(conn).map_err(StoreError::from_open)? > 0 {
                return Err(StoreError::FileCorrupt(
                    "tables present without a schema version".to_string(),
                ));
            }
        }
        1 => require_columns(conn, "updates", LEGACY_COLUMNS, version)?,
        2 => {
            require_columns(conn, "updates", LEGACY_COLUMNS, version)?;
            require_columns(conn, "updates", &["identifier"], version)?;
        }
        CURRENT_SCHEMA_VERSION => {
            require_columns(conn, "update_records", UPDATE_RECORD_COLUMNS, version)?;
            require_columns(conn, "queued_export_buckets", &["time_value"], version)?;
        }
        negative => {
            return Err(StoreError::FileCorrupt(format!(
                "invalid schema version {}",
                negative
            )))
        }
    }

    Ok(version)
}
