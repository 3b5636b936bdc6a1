use rusqlite::ErrorCode;

#[derive(Debug)]
pub enum StoreError {
    /// The file is not a database, or its tables do not match its version.
    FileCorrupt(String),
    /// The file was written by a newer build.
    SchemaTooNew { found: i64, supported: i64 },
    /// A write failed while moving rows to the current schema. The file is
    /// left at its previous version.
    MigrationIoFailure(rusqlite::Error),
    /// The file needs migrating but was opened read-only.
    MigrationRequired { found: i64, required: i64 },
    /// A target version this build cannot migrate to.
    UnsupportedTarget(i64),
    Database(rusqlite::Error),
    Io(std::io::Error),
}

impl StoreError {
    /// Map an error raised while inspecting an unknown file.
    pub(crate) fn from_open(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
                StoreError::FileCorrupt(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }

    /// Map an error raised inside the migration transaction.
    pub(crate) fn from_migration(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::NotADatabase) | Some(ErrorCode::DatabaseCorrupt) => {
                StoreError::FileCorrupt(err.to_string())
            }
            _ => StoreError::MigrationIoFailure(err),
        }
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::FileCorrupt(msg) => write!(f, "Store file corrupt: {}", msg),
            StoreError::SchemaTooNew { found, supported } => write!(
                f,
                "Store schema version {} is newer than supported version {}",
                found, supported
            ),
            StoreError::MigrationIoFailure(e) => write!(f, "Migration write failed: {}", e),
            StoreError::MigrationRequired { found, required } => write!(
                f,
                "Store schema version {} must be migrated to {} before read-only use",
                found, required
            ),
            StoreError::UnsupportedTarget(v) => {
                write!(f, "Cannot migrate to unsupported schema version {}", v)
            }
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::MigrationIoFailure(e) | StoreError::Database(e) => Some(e),
            StoreError::Io(e) => Some(e),
            _ => None,
        }
    }
}
