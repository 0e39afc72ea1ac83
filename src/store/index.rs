//! Store index management

use super::backend::DiskBackend;
use super::error::StoreError;
use super::types::EntryMetadata;
use crate::constants::STORE_INDEX_VERSION;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Thread-safe in-memory index of stored entries
pub struct StoreIndex {
    entries: RwLock<HashMap<String, EntryMetadata>>,
    total_size: AtomicU64,
    next_seq: AtomicU64,
}

/// Outcome of reconciling a loaded index with the files on disk
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub kept: usize,
    pub expired: usize,
    pub dropped: usize,
    pub orphans_removed: usize,
}

impl StoreIndex {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            total_size: AtomicU64::new(0),
            next_seq: AtomicU64::new(0),
        }
    }

    fn from_entries(entries: Vec<EntryMetadata>) -> Self {
        let mut map = HashMap::with_capacity(entries.len());
        let mut total_size = 0u64;
        let mut max_seq = 0u64;
        for entry in entries {
            max_seq = max_seq.max(entry.seq);
            if let Some(previous) = map.insert(entry.key.clone(), entry.clone()) {
                total_size -= previous.size_bytes;
            }
            total_size += entry.size_bytes;
        }

        Self {
            entries: RwLock::new(map),
            total_size: AtomicU64::new(total_size),
            next_seq: AtomicU64::new(max_seq + 1),
        }
    }

    pub fn get(&self, key: &str) -> Option<EntryMetadata> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }

    /// Insert an entry, replacing (and un-accounting) any previous one
    pub fn insert(&self, metadata: EntryMetadata) {
        let size = metadata.size_bytes;
        let previous = self
            .entries
            .write()
            .insert(metadata.key.clone(), metadata);
        if let Some(previous) = previous {
            self.total_size
                .fetch_sub(previous.size_bytes, Ordering::SeqCst);
        }
        self.total_size.fetch_add(size, Ordering::SeqCst);
    }

    pub fn remove(&self, key: &str) -> Option<EntryMetadata> {
        let removed = self.entries.write().remove(key);
        if let Some(ref metadata) = removed {
            self.total_size
                .fetch_sub(metadata.size_bytes, Ordering::SeqCst);
        }
        removed
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::SeqCst)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Allocate the next insertion sequence number
    pub fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Find the oldest inserted entry (eviction candidate)
    /// Oldest entry by eviction order, ignoring `except`
    pub fn oldest(&self, except: Option<&str>) -> Option<EntryMetadata> {
        self.entries
            .read()
            .values()
            .filter(|meta| except != Some(meta.key.as_str()))
            .min_by_key(|meta| meta.age_rank())
            .cloned()
    }

    pub fn expired(&self, now: u64) -> Vec<EntryMetadata> {
        self.entries
            .read()
            .values()
            .filter(|meta| meta.is_expired(now))
            .cloned()
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// (oldest created_at, newest created_at) across resident entries
    pub fn created_range(&self) -> Option<(u64, u64)> {
        let entries = self.entries.read();
        let oldest = entries.values().map(|m| m.created_at).min()?;
        let newest = entries.values().map(|m| m.created_at).max()?;
        Some((oldest, newest))
    }

    /// Save index to a JSON file, atomically
    pub async fn save_to_file(
        &self,
        path: &Path,
        backend: &dyn DiskBackend,
    ) -> Result<(), StoreError> {
        let mut entries: Vec<EntryMetadata> = self.entries.read().values().cloned().collect();
        entries.sort_by_key(|meta| meta.age_rank());

        let snapshot = IndexSnapshot {
            version: STORE_INDEX_VERSION,
            entries,
        };

        let json = serde_json::to_vec_pretty(&snapshot)?;
        backend.write_file_atomic(path, Bytes::from(json)).await?;

        Ok(())
    }

    /// Load index from a JSON file
    ///
    /// A missing file yields an empty index. An unparsable file is logged and
    /// also yields an empty index; the payload files it referenced become
    /// orphans and are removed by [`StoreIndex::validate_and_repair`].
    pub async fn load_from_file(
        path: &Path,
        backend: &dyn DiskBackend,
    ) -> Result<Self, StoreError> {
        let data = match backend.read_file(path).await {
            Ok(d) => d,
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::new());
            }
            Err(e) => return Err(e),
        };

        let snapshot: IndexSnapshot = match serde_json::from_slice(&data) {
            Ok(s) => s,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse store index, starting with an empty index"
                );
                return Ok(Self::new());
            }
        };

        if snapshot.version != STORE_INDEX_VERSION {
            warn!(
                found = snapshot.version,
                expected = STORE_INDEX_VERSION,
                "Store index version mismatch, starting with an empty index"
            );
            return Ok(Self::new());
        }

        Ok(Self::from_entries(snapshot.entries))
    }

    /// Reconcile the index with the payload files on disk
    ///
    /// - expired entries are dropped and their payloads deleted
    /// - entries whose payload is missing or has the wrong size are dropped
    /// - payload files nobody references and leftover `.tmp` files are deleted
    pub async fn validate_and_repair(
        &self,
        entries_dir: &Path,
        backend: &dyn DiskBackend,
        now: u64,
    ) -> Result<RepairReport, StoreError> {
        let mut report = RepairReport::default();

        let files = match backend.read_dir(entries_dir).await {
            Ok(f) => f,
            Err(_) => Vec::new(),
        };

        let mut data_files = HashSet::new();
        for file_path in files {
            let Some(file_name) = file_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if file_name.ends_with(".data") {
                data_files.insert(file_name.to_string());
            } else if file_name.ends_with(".tmp") {
                // Leftover from an interrupted write
                let _ = backend.delete_file(&file_path).await;
            }
        }

        let snapshot: Vec<EntryMetadata> = self.entries.read().values().cloned().collect();
        let mut accounted = HashSet::new();

        for meta in snapshot {
            let path = entries_dir.join(&meta.file_name);
            accounted.insert(meta.file_name.clone());

            if meta.is_expired(now) {
                self.remove(&meta.key);
                let _ = backend.delete_file(&path).await;
                report.expired += 1;
                continue;
            }

            if !data_files.contains(&meta.file_name) {
                debug!(key = %meta.key, "Dropping index entry with missing payload");
                self.remove(&meta.key);
                report.dropped += 1;
                continue;
            }

            match backend.file_size(&path).await {
                Ok(size) if size == meta.size_bytes => {
                    report.kept += 1;
                }
                Ok(size) => {
                    warn!(
                        key = %meta.key,
                        expected = meta.size_bytes,
                        actual = size,
                        "Dropping index entry with truncated or resized payload"
                    );
                    self.remove(&meta.key);
                    let _ = backend.delete_file(&path).await;
                    report.dropped += 1;
                }
                Err(e) => {
                    warn!(key = %meta.key, error = %e, "Dropping index entry with unreadable payload");
                    self.remove(&meta.key);
                    let _ = backend.delete_file(&path).await;
                    report.dropped += 1;
                }
            }
        }

        for file_name in data_files.difference(&accounted) {
            let _ = backend.delete_file(&entries_dir.join(file_name)).await;
            report.orphans_removed += 1;
        }

        Ok(report)
    }
}

impl Default for StoreIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable snapshot of the store index
#[derive(Serialize, Deserialize)]
struct IndexSnapshot {
    version: u32,
    entries: Vec<EntryMetadata>,
}
