//! Content store statistics

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of store occupancy and effectiveness
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    /// Number of resident entries
    pub count: u64,
    /// Sum of resident payload sizes
    pub total_size_bytes: u64,
    /// Configured capacity
    pub capacity_bytes: u64,
    /// Creation time of the oldest resident entry
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Creation time of the newest resident entry
    pub newest_entry: Option<DateTime<Utc>>,
    pub hits: u64,
    pub misses: u64,
    /// Entries removed to make room (expiry is not counted)
    pub evictions: u64,
    /// hits / (hits + misses), absent before the first lookup
    pub hit_rate: Option<f64>,
}

impl StoreStats {
    pub(crate) fn compute_hit_rate(hits: u64, misses: u64) -> Option<f64> {
        let total = hits + misses;
        if total == 0 {
            None
        } else {
            Some(hits as f64 / total as f64)
        }
    }

    /// Fraction of capacity in use
    pub fn utilization(&self) -> f64 {
        if self.capacity_bytes == 0 {
            0.0
        } else {
            self.total_size_bytes as f64 / self.capacity_bytes as f64
        }
    }
}
