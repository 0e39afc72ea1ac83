//! Durable, capacity-bounded content store
//!
//! Generated documents are stored under their fingerprint with a TTL. The
//! layout on disk is:
//!
//! ```text
//! <cache_dir>/index.json              versioned snapshot of every entry
//! <cache_dir>/entries/<sha256>.data   one payload per key
//! ```
//!
//! Both files are written with write-temp-then-rename, so a crash leaves
//! either the old or the new version. On [`ContentStore::open`] the index is
//! reconciled with the payload files and anything that does not match is
//! dropped.
//!
//! Eviction is by insertion order (oldest `created_at` first, ties broken by
//! insertion sequence), not by access recency.

use bytes::Bytes;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::clock::{to_datetime, Clock, SystemClock};
use crate::config::StoreConfig;
use crate::constants::{STORE_ENTRIES_DIR, STORE_INDEX_FILE};
use crate::metrics::GenerationMetrics;

pub mod backend;
mod error;
mod index;
mod stats;
pub mod tokio_backend;
mod types;
mod utils;

pub use self::backend::DiskBackend;
pub use self::error::StoreError;
pub use self::stats::StoreStats;
pub use self::tokio_backend::TokioFsBackend;
pub use self::types::{CacheEntry, EntryMetadata, OversizedPolicy};

use self::index::StoreIndex;
use self::utils::{checksum, payload_file_name};



/// Disk-backed content store keyed by fingerprint
pub struct ContentStore {
    entries_dir: PathBuf,
    index_path: PathBuf,
    capacity_bytes: u64,
    default_ttl: Duration,
    oversized: OversizedPolicy,
    backend: Arc<dyn DiskBackend>,
    index: StoreIndex,
    clock: Arc<dyn Clock>,
    /// Serialises purge/evict/write/index sequences
    write_lock: Mutex<()>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ContentStore {
    /// Open (or create) a store, repairing whatever a previous run left behind
    pub async fn open(
        config: &StoreConfig,
        backend: Arc<dyn DiskBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let root = config.cache_dir.clone();
        let entries_dir = root.join(STORE_ENTRIES_DIR);
        let index_path = root.join(STORE_INDEX_FILE);

        backend.create_dir_all(&entries_dir).await?;

        let index = StoreIndex::load_from_file(&index_path, backend.as_ref()).await?;
        let report = index
            .validate_and_repair(&entries_dir, backend.as_ref(), clock.now_millis())
            .await?;

        let store = Self {
            entries_dir,
            index_path,
            capacity_bytes: config.capacity_bytes(),
            default_ttl: config.default_ttl(),
            oversized: config.oversized_entries,
            backend,
            index,
            clock,
            write_lock: Mutex::new(()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        };

        // Capacity may have been reduced since the last run
        let evicted = {
            let _guard = store.write_lock.lock().await;
            store.evict_until_fits(0, None).await
        };
        store.persist_index().await?;
        store.publish_occupancy();

        info!(
            cache_dir = %root.display(),
            entries = store.index.entry_count(),
            size_bytes = store.index.total_size(),
            capacity_bytes = store.capacity_bytes,
            expired = report.expired,
            dropped = report.dropped,
            orphans_removed = report.orphans_removed,
            evicted = evicted,
            "Content store opened"
        );

        Ok(store)
    }

    /// Open a store on the local filesystem with the system clock
    pub async fn open_on_disk(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::open(
            config,
            Arc::new(TokioFsBackend::new()),
            Arc::new(SystemClock),
        )
        .await
    }

    /// Look up an entry
    ///
    /// Expired, unreadable and corrupt entries are purged and reported as a
    /// miss; read problems never surface as errors.
    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let Some(meta) = self.index.get(key) else {
            self.record_miss();
            return Ok(None);
        };

        if meta.is_expired(self.clock.now_millis()) {
            debug!(key = %key, "Store entry expired");
            GenerationMetrics::global().store_expired.inc();
            self.purge_if_unchanged(&meta).await;
            self.record_miss();
            return Ok(None);
        }

        let path = self.payload_path(&meta.file_name);
        let payload = match self.backend.read_file(&path).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key = %key, error = %e, "Store payload unreadable, discarding entry");
                GenerationMetrics::global().store_corrupt.inc();
                self.purge_if_unchanged(&meta).await;
                self.record_miss();
                return Ok(None);
            }
        };

        if checksum(&payload) != meta.checksum {
            warn!(key = %key, "Store payload checksum mismatch, discarding entry");
            GenerationMetrics::global().store_corrupt.inc();
            self.purge_if_unchanged(&meta).await;
            self.record_miss();
            return Ok(None);
        }

        self.record_hit();
        Ok(Some(CacheEntry::from_parts(meta, payload)))
    }

    /// Store `payload` under `key`, replacing any previous entry
    ///
    /// `ttl` falls back to the configured default. Oldest entries are
    /// evicted until the new one fits.
    pub async fn set(
        &self,
        key: &str,
        payload: Bytes,
        ttl: Option<Duration>,
        metadata: Value,
    ) -> Result<(), StoreError> {
        let ttl = ttl.unwrap_or(self.default_ttl);
        if ttl.is_zero() {
            return Err(StoreError::InvalidTtl);
        }
        let ttl_ms = (ttl.as_millis() as u64).max(1);

        let size = payload.len() as u64;
        if size > self.capacity_bytes && self.oversized == OversizedPolicy::Reject {
            return Err(StoreError::Capacity {
                size,
                capacity: self.capacity_bytes,
            });
        }

        let _guard = self.write_lock.lock().await;
        let now = self.clock.now_millis();

        self.purge_expired(now).await;
        let file_name = payload_file_name(key);
        let path = self.payload_path(&file_name);
        // The entry being replaced stays readable until the new payload lands
        let replacing = self.index.get(key);
        if replacing.is_some() {
            debug!(key = %key, "Replacing existing store entry");
        }

        let evicted = self.evict_until_fits(size, replacing.as_ref()).await;
        if size > self.capacity_bytes {
            warn!(
                key = %key,
                size_bytes = size,
                capacity_bytes = self.capacity_bytes,
                "Admitting entry larger than store capacity"
            );
        }

        if let Err(e) = self.backend.write_file_atomic(&path, payload.clone()).await {
            if replacing.is_none() {
                let _ = self.backend.delete_file(&path).await;
            }
            if let Err(persist_err) = self.persist_index().await {
                warn!(error = %persist_err, "Failed to persist store index after write failure");
            }
            self.publish_occupancy();
            return Err(e);
        }

        let meta = EntryMetadata {
            key: key.to_string(),
            file_name,
            size_bytes: size,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            checksum: checksum(&payload),
            seq: self.index.next_seq(),
            metadata,
        };
        self.index.insert(meta);

        if let Err(e) = self.persist_index().await {
            // Roll back so memory never claims more than disk can recover
            self.index.remove(key);
            let _ = self.backend.delete_file(&path).await;
            self.publish_occupancy();
            return Err(e);
        }

        GenerationMetrics::global().store_sets.inc();
        self.publish_occupancy();

        debug!(
            key = %key,
            size_bytes = size,
            ttl_ms = ttl_ms,
            evicted = evicted,
            total_bytes = self.index.total_size(),
            "Stored entry"
        );

        Ok(())
    }

    /// Remove an entry; returns whether one was present
    pub async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let _guard = self.write_lock.lock().await;

        let Some(meta) = self.index.remove(key) else {
            return Ok(false);
        };
        self.backend
            .delete_file(&self.payload_path(&meta.file_name))
            .await?;
        self.persist_index().await?;
        self.publish_occupancy();

        Ok(true)
    }

    /// Remove every expired entry, returning how many were removed
    pub async fn sweep_expired(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;

        let removed = self.purge_expired(self.clock.now_millis()).await;
        if removed > 0 {
            self.persist_index().await?;
            self.publish_occupancy();
            info!(removed = removed, "Swept expired store entries");
        }

        Ok(removed)
    }

    /// Remove every entry, returning how many were removed
    pub async fn clear(&self) -> Result<usize, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut removed = 0;
        for key in self.index.keys() {
            if let Some(meta) = self.index.remove(&key) {
                self.backend
                    .delete_file(&self.payload_path(&meta.file_name))
                    .await?;
                removed += 1;
            }
        }
        self.persist_index().await?;
        self.publish_occupancy();

        info!(removed = removed, "Cleared content store");
        Ok(removed)
    }

    pub fn stats(&self) -> StoreStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let range = self.index.created_range();

        StoreStats {
            count: self.index.entry_count() as u64,
            total_size_bytes: self.index.total_size(),
            capacity_bytes: self.capacity_bytes,
            oldest_entry: range.map(|(oldest, _)| to_datetime(oldest)),
            newest_entry: range.map(|(_, newest)| to_datetime(newest)),
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate: StoreStats::compute_hit_rate(hits, misses),
        }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    pub fn len(&self) -> usize {
        self.index.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    fn payload_path(&self, file_name: &str) -> PathBuf {
        self.entries_dir.join(file_name)
    }

    /// Drop expired entries; caller holds the write lock
    async fn purge_expired(&self, now: u64) -> usize {
        let expired = self.index.expired(now);
        for meta in &expired {
            self.index.remove(&meta.key);
            if let Err(e) = self
                .backend
                .delete_file(&self.payload_path(&meta.file_name))
                .await
            {
                warn!(key = %meta.key, error = %e, "Failed to delete expired payload");
            }
        }
        if !expired.is_empty() {
            GenerationMetrics::global()
                .store_expired
                .inc_by(expired.len() as u64);
        }
        expired.len()
    }

    /// Evict oldest entries until `incoming` more bytes fit; caller holds the
    /// write lock. Stops when the store is empty.
    async fn evict_until_fits(&self, incoming: u64, replacing: Option<&EntryMetadata>) -> usize {
        let freed = replacing.map_or(0, |meta| meta.size_bytes);
        let keep = replacing.map(|meta| meta.key.as_str());
        let mut evicted = 0;
        while self
            .index
            .total_size()
            .saturating_sub(freed)
            .saturating_add(incoming)
            > self.capacity_bytes
        {
            let Some(oldest) = self.index.oldest(keep) else {
                break;
            };
            self.index.remove(&oldest.key);
            if let Err(e) = self
                .backend
                .delete_file(&self.payload_path(&oldest.file_name))
                .await
            {
                warn!(key = %oldest.key, error = %e, "Failed to delete evicted payload");
            }
            debug!(
                key = %oldest.key,
                size_bytes = oldest.size_bytes,
                "Evicted store entry"
            );
            evicted += 1;
        }

        if evicted > 0 {
            self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
            GenerationMetrics::global()
                .store_evictions
                .inc_by(evicted as u64);
        }
        evicted
    }

    /// Remove an entry found stale during a read, unless a writer replaced it
    async fn purge_if_unchanged(&self, stale: &EntryMetadata) {
        let _guard = self.write_lock.lock().await;

        let unchanged = self
            .index
            .get(&stale.key)
            .is_some_and(|current| current.seq == stale.seq);
        if !unchanged {
            return;
        }

        self.index.remove(&stale.key);
        if let Err(e) = self
            .backend
            .delete_file(&self.payload_path(&stale.file_name))
            .await
        {
            warn!(key = %stale.key, error = %e, "Failed to delete stale payload");
        }
        if let Err(e) = self.persist_index().await {
            warn!(error = %e, "Failed to persist store index after purge");
        }
        self.publish_occupancy();
    }

    async fn persist_index(&self) -> Result<(), StoreError> {
        self.index
            .save_to_file(&self.index_path, self.backend.as_ref())
            .await
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        GenerationMetrics::global().store_hits.inc();
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        GenerationMetrics::global().store_misses.inc();
    }

    fn publish_occupancy(&self) {
        GenerationMetrics::global()
            .set_store_occupancy(self.index.entry_count(), self.index.total_size());
    }
}
