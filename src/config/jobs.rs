//! Job ledger configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{DEFAULT_JOB_RETENTION_SECONDS, DEFAULT_SWEEP_INTERVAL_SECS};

fn default_retention_seconds() -> u64 {
    DEFAULT_JOB_RETENTION_SECONDS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

/// Job retention and maintenance configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobsConfig {
    /// How long a job record is kept after creation (default: 1h)
    #[serde(default = "default_retention_seconds")]
    pub retention_seconds: u64,
    /// Period of the background sweep over jobs and the store (default: 60s)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            retention_seconds: default_retention_seconds(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl JobsConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.retention_seconds == 0 {
            return Err("jobs.retention_seconds must be greater than 0".to_string());
        }
        if self.sweep_interval_secs == 0 {
            return Err("jobs.sweep_interval_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
