//! Type definitions for the content store

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::to_datetime;

/// Index record for one stored payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub key: String,
    /// Payload file name under the entries directory
    pub file_name: String,
    pub size_bytes: u64,
    /// Epoch milliseconds
    pub created_at: u64,
    /// Epoch milliseconds
    pub expires_at: u64,
    /// SHA-256 hex of the payload
    pub checksum: String,
    /// Insertion sequence, breaks `created_at` ties in eviction order
    #[serde(default)]
    pub seq: u64,
    /// Caller-supplied metadata stored alongside the payload
    #[serde(default)]
    pub metadata: Value,
}

impl EntryMetadata {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    /// Sort key used for eviction: oldest insertion first
    pub fn age_rank(&self) -> (u64, u64) {
        (self.created_at, self.seq)
    }
}

/// A stored generation result returned by `ContentStore::get`
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub payload: Bytes,
    pub metadata: Value,
    pub created_at: u64,
    pub expires_at: u64,
    pub size_bytes: u64,
}

impl CacheEntry {
    pub(crate) fn from_parts(meta: EntryMetadata, payload: Bytes) -> Self {
        Self {
            key: meta.key,
            payload,
            metadata: meta.metadata,
            created_at: meta.created_at,
            expires_at: meta.expires_at,
            size_bytes: meta.size_bytes,
        }
    }

    pub fn created_at_utc(&self) -> DateTime<Utc> {
        to_datetime(self.created_at)
    }

    pub fn expires_at_utc(&self) -> DateTime<Utc> {
        to_datetime(self.expires_at)
    }
}

/// What to do with an entry larger than the whole store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizedPolicy {
    /// Evict everything else, then admit the entry
    #[default]
    Admit,
    /// Refuse the entry with a capacity error, leaving the store untouched
    Reject,
}
