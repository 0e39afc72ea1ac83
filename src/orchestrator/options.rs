//! Typed view over the raw generation options
//!
//! The raw JSON is what gets fingerprinted, so keys this view does not know
//! about (quality hints and the like) still separate cache entries.

use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::GenerationError;
use crate::renderer::{sanitize_filename, PageOverrides};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GenerationOptions {
    /// Overrides the template locale
    pub locale: Option<String>,
    /// Overrides the template page settings
    pub page: Option<PageOverrides>,
    /// `false` skips the store lookup and the store write
    pub cache: bool,
    pub cache_ttl_seconds: Option<u64>,
    /// Output file name; `.pdf` is appended when missing
    pub filename: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            locale: None,
            page: None,
            cache: true,
            cache_ttl_seconds: None,
            filename: None,
        }
    }
}

impl GenerationOptions {
    /// Parse the options a job was submitted with; `null` means defaults
    pub fn from_value(value: &Value) -> Result<Self, GenerationError> {
        let options: Self = match value {
            Value::Null => Self::default(),
            Value::Object(_) => serde_json::from_value(value.clone())
                .map_err(|e| GenerationError::Validation(format!("invalid options: {}", e)))?,
            other => {
                return Err(GenerationError::Validation(format!(
                    "options must be an object, got {}",
                    json_type(other)
                )))
            }
        };

        if options.cache_ttl_seconds == Some(0) {
            return Err(GenerationError::Validation(
                "invalid options: cache_ttl_seconds must be greater than zero".to_string(),
            ));
        }
        Ok(options)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_seconds.map(Duration::from_secs)
    }

    /// File name for the generated document
    ///
    /// Uses the requested name when given, otherwise the template id and a
    /// digest prefix of the fingerprint.
    pub fn output_filename(&self, template_id: &str, fingerprint: &str) -> String {
        let default_stem = default_stem(template_id, fingerprint);
        let stem = match &self.filename {
            Some(name) => {
                let trimmed = name.trim();
                let stem = if trimmed.to_ascii_lowercase().ends_with(".pdf") {
                    &trimmed[..trimmed.len() - 4]
                } else {
                    trimmed
                };
                sanitize_filename(stem, &default_stem)
            }
            None => default_stem,
        };
        format!("{}.pdf", stem)
    }
}

const FILENAME_DIGEST_LEN: usize = 12;

fn default_stem(template_id: &str, fingerprint: &str) -> String {
    let digest = fingerprint.rsplit('-').next().unwrap_or(fingerprint);
    let digest = &digest[..digest.len().min(FILENAME_DIGEST_LEN)];
    sanitize_filename(&format!("{} {}", template_id, digest), "document")
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
