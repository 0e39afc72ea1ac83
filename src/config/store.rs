//! Content store configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_DIR, DEFAULT_STORE_MAX_SIZE_MB, DEFAULT_STORE_OPERATION_TIMEOUT_SECS,
    DEFAULT_STORE_TTL_SECONDS,
};
use crate::store::OversizedPolicy;

fn default_cache_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CACHE_DIR)
}

fn default_max_size_mb() -> u64 {
    DEFAULT_STORE_MAX_SIZE_MB
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_STORE_TTL_SECONDS
}

fn default_operation_timeout_secs() -> u64 {
    DEFAULT_STORE_OPERATION_TIMEOUT_SECS
}

/// Disk-backed content store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory holding `index.json` and `entries/`
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Capacity in megabytes (default: 512)
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
    /// Exact capacity in bytes, overrides `max_size_mb` when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    /// TTL applied when a `set` does not pass one (default: 24h)
    #[serde(default = "default_ttl_seconds")]
    pub default_ttl_seconds: u64,
    /// Handling of entries larger than the whole store (default: admit)
    #[serde(default)]
    pub oversized_entries: OversizedPolicy,
    /// Upper bound on a single store read or write (default: 10s)
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_size_mb: default_max_size_mb(),
            max_size_bytes: None,
            default_ttl_seconds: default_ttl_seconds(),
            oversized_entries: OversizedPolicy::default(),
            operation_timeout_secs: default_operation_timeout_secs(),
        }
    }
}

impl StoreConfig {
    /// Store rooted at `cache_dir` with an exact byte capacity
    pub fn with_capacity(cache_dir: impl Into<PathBuf>, capacity_bytes: u64) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            max_size_bytes: Some(capacity_bytes),
            ..Default::default()
        }
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.max_size_bytes
            .unwrap_or_else(|| self.max_size_mb.saturating_mul(1024 * 1024))
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_seconds)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err("store.cache_dir cannot be empty".to_string());
        }
        if self.capacity_bytes() == 0 {
            return Err("store capacity must be greater than 0".to_string());
        }
        if self.default_ttl_seconds == 0 {
            return Err("store.default_ttl_seconds must be greater than 0".to_string());
        }
        if self.operation_timeout_secs == 0 {
            return Err("store.operation_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
