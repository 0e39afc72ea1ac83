//! Render coalescing configuration types.
//!
//! Default: enabled, so identical concurrent jobs render once.

use serde::{Deserialize, Serialize};

/// Default enabled state
fn default_enabled() -> bool {
    true
}

/// Render coalescing configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoalescingConfig {
    /// Enable render coalescing (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for CoalescingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}
