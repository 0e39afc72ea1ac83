//! Result persistence

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::ResultSink;
use crate::error::GenerationError;

/// Sanitize a string to be used as a file name stem.
///
/// Lowercases ASCII alphanumerics, collapses whitespace, `-` and `_` runs into
/// one `-`, drops everything else. Falls back to `fallback` when nothing is left.
pub fn sanitize_filename(name: &str, fallback: &str) -> String {
    let mut result = String::new();
    let mut last_dash = false;

    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            result.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if (ch.is_whitespace() || ch == '-' || ch == '_' || ch == '.')
            && !last_dash
            && !result.is_empty()
        {
            result.push('-');
            last_dash = true;
        }
    }

    let result = result.trim_matches('-');
    if result.is_empty() {
        return fallback.to_string();
    }
    result.to_string()
}

/// Writes documents into an output directory
#[derive(Debug, Clone)]
pub struct FsResultSink {
    output_dir: PathBuf,
}

impl FsResultSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

#[async_trait]
impl ResultSink for FsResultSink {
    async fn persist(&self, filename: &str, document: &Bytes) -> Result<PathBuf, GenerationError> {
        // Never let a filename escape the output directory
        let name = Path::new(filename)
            .file_name()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| GenerationError::Storage(format!("invalid output filename '{}'", filename)))?;

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| GenerationError::Storage(format!("cannot create output dir: {}", e)))?;

        let path = self.output_dir.join(name);
        let temp_path = path.with_extension("tmp");
        if let Err(e) = tokio::fs::write(&temp_path, document).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(GenerationError::Storage(format!(
                "cannot write {}: {}",
                path.display(),
                e
            )));
        }
        tokio::fs::rename(&temp_path, &path).await.map_err(|e| {
            GenerationError::Storage(format!("cannot write {}: {}", path.display(), e))
        })?;

        debug!(path = %path.display(), size_bytes = document.len(), "Persisted document");
        Ok(path)
    }
}
