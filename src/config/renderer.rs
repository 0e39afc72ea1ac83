//! Renderer configuration types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CHROMIUM_PATH, DEFAULT_OUTPUT_DIR, DEFAULT_RENDER_TIMEOUT_SECS, DEFAULT_TEMPLATES_DIR,
};

fn default_templates_dir() -> PathBuf {
    PathBuf::from(DEFAULT_TEMPLATES_DIR)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_chromium_path() -> String {
    DEFAULT_CHROMIUM_PATH.to_string()
}

fn default_render_timeout_secs() -> u64 {
    DEFAULT_RENDER_TIMEOUT_SECS
}

/// Template rendering and PDF conversion configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Base directory for template and asset paths
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
    /// Directory generated documents are persisted to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Headless browser executable (name on PATH or absolute path)
    #[serde(default = "default_chromium_path")]
    pub chromium_path: String,
    /// Extra arguments passed to the browser
    #[serde(default)]
    pub chromium_args: Vec<String>,
    /// Upper bound on one render or one conversion (default: 60s)
    #[serde(default = "default_render_timeout_secs")]
    pub render_timeout_secs: u64,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            output_dir: default_output_dir(),
            chromium_path: default_chromium_path(),
            chromium_args: Vec::new(),
            render_timeout_secs: default_render_timeout_secs(),
        }
    }
}

impl RendererConfig {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chromium_path.trim().is_empty() {
            return Err("renderer.chromium_path cannot be empty".to_string());
        }
        if self.render_timeout_secs == 0 {
            return Err("renderer.render_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}
