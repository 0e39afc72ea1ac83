//! Backend trait for filesystem operations

use super::error::StoreError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

/// Abstraction over the filesystem calls the content store makes
#[async_trait]
pub trait DiskBackend: Send + Sync {
    /// Read entire file contents
    async fn read_file(&self, path: &Path) -> Result<Bytes, StoreError>;

    /// Write file contents atomically (temp file + rename)
    async fn write_file_atomic(&self, path: &Path, data: Bytes) -> Result<(), StoreError>;

    /// Delete a file; deleting a missing file is not an error
    async fn delete_file(&self, path: &Path) -> Result<(), StoreError>;

    /// Create directory and all parent directories
    async fn create_dir_all(&self, path: &Path) -> Result<(), StoreError>;

    /// Size of a file in bytes
    async fn file_size(&self, path: &Path) -> Result<u64, StoreError>;

    /// List all files in a directory
    async fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, StoreError>;
}
