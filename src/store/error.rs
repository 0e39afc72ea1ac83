//! Error types for content store operations

use thiserror::Error;

use crate::error::GenerationError;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage full: cannot store entry")]
    StorageFull,

    #[error("entry of {size} bytes exceeds store capacity of {capacity} bytes")]
    Capacity { size: u64, capacity: u64 },

    #[error("TTL must be greater than zero")]
    InvalidTtl,
}

// Conversion to GenerationError
impl From<StoreError> for GenerationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Capacity { size, capacity } => GenerationError::Capacity { size, capacity },
            other => GenerationError::Storage(other.to_string()),
        }
    }
}
