// Error types module

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Centralized error type for document generation
///
/// Every failure a job can end with maps onto one of these variants. The
/// variant tag is kept on the job (see [`ErrorKind`]) so callers can tell a
/// caller fault (unknown template, validation) from an engine or I/O fault.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GenerationError {
    /// Template id does not resolve to a registered template
    #[error("unknown template '{0}'")]
    UnknownTemplate(String),

    /// Input data does not satisfy the template schema
    #[error("validation failed: {0}")]
    Validation(String),

    /// Template engine fault (malformed template, data access fault, missing asset)
    #[error("render failed: {0}")]
    Render(String),

    /// Intermediate document could not be converted to the final output
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// Persistence I/O fault
    #[error("storage error: {0}")]
    Storage(String),

    /// Entry larger than the whole store under the reject policy
    #[error("entry of {size} bytes exceeds store capacity of {capacity} bytes")]
    Capacity { size: u64, capacity: u64 },

    /// A bounded operation did not finish in time
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// Job was cancelled before processing started
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl GenerationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::UnknownTemplate(_) => ErrorKind::UnknownTemplate,
            GenerationError::Validation(_) => ErrorKind::Validation,
            GenerationError::Render(_) => ErrorKind::Render,
            GenerationError::Conversion(_) => ErrorKind::Conversion,
            GenerationError::Storage(_) => ErrorKind::Storage,
            GenerationError::Capacity { .. } => ErrorKind::Capacity,
            GenerationError::Timeout { .. } => ErrorKind::Timeout,
            GenerationError::Cancelled(_) => ErrorKind::Cancelled,
        }
    }

    /// Caller faults are reported immediately and never worth retrying
    pub fn is_caller_fault(&self) -> bool {
        matches!(
            self,
            GenerationError::UnknownTemplate(_) | GenerationError::Validation(_)
        )
    }
}

/// Serializable tag of a [`GenerationError`] variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnknownTemplate,
    Validation,
    Render,
    Conversion,
    Storage,
    Capacity,
    Timeout,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::UnknownTemplate => "unknown_template",
            ErrorKind::Validation => "validation",
            ErrorKind::Render => "render",
            ErrorKind::Conversion => "conversion",
            ErrorKind::Storage => "storage",
            ErrorKind::Capacity => "capacity",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}
