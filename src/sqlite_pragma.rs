//! Connection tuning shared by every store handle
//!
//! WAL lets read-only report handles run while the writer holds its lock.

use rusqlite::Connection;

/// Apply WAL, NORMAL sync, MEMORY temp store, mmap, cache and autocheckpoint.
pub fn apply_optimized_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    conn.pragma_update(None, "cache_size", -16_000i64)?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000i64)?;

    log::debug!("⚙️  SQLite pragmas applied (WAL, NORMAL, MEMORY, mmap 256MB)");
    Ok(())
}

/// Pragmas for a reader that must never write.
pub fn apply_read_only_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "query_only", true)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "cache_size", -16_000i64)?;
    Ok(())
}
