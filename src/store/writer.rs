//! Buffered ingestion sink
//!
//! Device reads arrive one minute at a time. Batching them keeps one
//! transaction per flush instead of one per update.

use super::error::StoreError;
use super::update_store::{UpdateStore, WriteSummary};
use crate::activity_core::update::SourcedUpdate;
use crate::config::StoreConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Destination for decoded device updates.
#[async_trait]
pub trait UpdateSinkBackend: Send {
    /// Buffer a single update, flushing if the batch is due.
    async fn write(&mut self, update: &SourcedUpdate) -> Result<(), StoreError>;

    /// Persist everything buffered so far.
    async fn flush(&mut self) -> Result<(), StoreError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}

pub struct BufferedUpdateWriter {
    store: Arc<UpdateStore>,
    batch: Vec<SourcedUpdate>,
    batch_size: usize,
    flush_interval: Duration,
    last_flush: Instant,
    clock: Option<DateTime<Utc>>,
    totals: WriteSummary,
}

impl BufferedUpdateWriter {
    pub fn new(store: Arc<UpdateStore>) -> Self {
        Self::with_limits(store, DEFAULT_BATCH_SIZE, DEFAULT_FLUSH_INTERVAL)
    }

    pub fn with_limits(store: Arc<UpdateStore>, batch_size: usize, flush_interval: Duration) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            flush_interval,
            last_flush: Instant::now(),
            clock: None,
            totals: WriteSummary::default(),
        }
    }

    pub fn from_config(store: Arc<UpdateStore>, config: &StoreConfig) -> Self {
        Self::with_limits(store, config.write_batch_size, config.flush_interval)
    }

    /// Judge update age against a fixed instant rather than the wall clock.
    pub fn with_fixed_now(mut self, now: DateTime<Utc>) -> Self {
        self.clock = Some(now);
        self
    }

    pub fn pending(&self) -> usize {
        self.batch.len()
    }

    /// Running totals across every flush so far.
    pub fn totals(&self) -> WriteSummary {
        self.totals
    }

    fn flush_batch(&mut self) -> Result<(), StoreError> {
        if self.batch.is_empty() {
            return Ok(());
        }

        let now = self.clock.unwrap_or_else(Utc::now);
        let summary = self.store.write_sourced_updates_at(&self.batch, now)?;
        self.totals.absorb(summary);

        log::debug!("✅ Flushed {} updates ({} written)", self.batch.len(), summary.written);
        self.batch.clear();
        self.last_flush = Instant::now();

        Ok(())
    }
}

#[async_trait]
impl UpdateSinkBackend for BufferedUpdateWriter {
    async fn write(&mut self, update: &SourcedUpdate) -> Result<(), StoreError> {
        self.batch.push(*update);

        if self.batch.len() >= self.batch_size || self.last_flush.elapsed() >= self.flush_interval {
            self.flush_batch()?;
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), StoreError> {
        self.flush_batch()
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity_core::minute::{ActivityMinute, REFERENCE_TIMESTAMP};
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(REFERENCE_TIMESTAMP + 500 * 60, 0).unwrap()
    }

    fn update(minute: u32) -> SourcedUpdate {
        SourcedUpdate::new(42, ActivityMinute::new(minute).unwrap(), 3, 1)
    }

    #[tokio::test]
    async fn test_buffers_until_flush() {
        let dir = tempdir().unwrap();
        let store = Arc::new(UpdateStore::open(dir.path().join("writer.db")).unwrap());
        let mut writer = BufferedUpdateWriter::with_limits(store.clone(), 10, Duration::from_secs(3600))
            .with_fixed_now(now());

        for minute in 0..5 {
            writer.write(&update(minute)).await.unwrap();
        }
        assert_eq!(writer.pending(), 5);
        assert_eq!(store.record_count().unwrap(), 0);

        writer.flush().await.unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(store.record_count().unwrap(), 5);
        assert_eq!(writer.backend_type(), "SQLite");
    }

    #[tokio::test]
    async fn test_batch_flush() {
        let dir = tempdir().unwrap();
        let store = Arc::new(UpdateStore::open(dir.path().join("writer.db")).unwrap());
        let mut writer = BufferedUpdateWriter::with_limits(store.clone(), 100, Duration::from_secs(3600))
            .with_fixed_now(now());

        // 150 updates should trigger one auto-flush at 100
        for minute in 0..150 {
            writer.write(&update(minute)).await.unwrap();
        }
        assert_eq!(store.record_count().unwrap(), 100);
        assert_eq!(writer.pending(), 50);

        writer.flush().await.unwrap();
        assert_eq!(store.record_count().unwrap(), 150);
        assert_eq!(writer.totals().written, 150);
    }

    #[tokio::test]
    async fn test_elapsed_interval_flushes() {
        let dir = tempdir().unwrap();
        let store = Arc::new(UpdateStore::open(dir.path().join("writer.db")).unwrap());
        let mut writer = BufferedUpdateWriter::with_limits(store.clone(), 100, Duration::ZERO)
            .with_fixed_now(now());

        writer.write(&update(1)).await.unwrap();
        assert_eq!(writer.pending(), 0);
        assert_eq!(store.record_count().unwrap(), 1);
    }
}
