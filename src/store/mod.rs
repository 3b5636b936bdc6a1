//! Persistent Update Store
//!
//! Owns the on-disk representation of device updates: identifiers, schema
//! versions, forward migration and the buffered ingestion path.
//!
//! # Architecture
//!
//! ```text
//! SourcedUpdate → BufferedUpdateWriter (batch 100 / 5s)
//!     ↓
//! UpdateStore::write_sourced_updates (filter, de-duplicate, upsert, queue export)
//!     ↓
//! update_records (12-byte identifier key) + queued_export_buckets
//! ```
//!
//! Every handle is opened through [`migrate`], so a file is always at the
//! current schema version before any query runs against it.

pub mod error;
pub mod identifier;
pub mod migration;
pub mod record;
pub mod schema;
pub mod update_store;
pub mod writer;

pub use error::StoreError;
pub use identifier::{identifier, UpdateId};
pub use migration::MigrationSummary;
pub use record::UpdateRecord;
pub use schema::CURRENT_SCHEMA_VERSION;
pub use update_store::{migrate, StoreOptions, UpdateStore, WriteSummary};
pub use writer::{BufferedUpdateWriter, UpdateSinkBackend};
