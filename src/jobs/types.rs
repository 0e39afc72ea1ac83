//! Job records and their serializable views

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

use crate::error::{ErrorKind, GenerationError};

/// Lifecycle state of a generation job
///
/// `Pending -> Processing -> {Completed | Failed}`, plus `Pending -> Failed`
/// for cancellation. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status '{0}' (expected pending, processing, completed or failed)")]
pub struct ParseJobStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseJobStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(ParseJobStatusError(s.to_string())),
        }
    }
}

/// Outcome of a completed job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobResult {
    pub fingerprint: String,
    pub filename: String,
    /// Where the document was persisted, if it was
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    pub size_bytes: u64,
    pub page_count: u32,
    pub elapsed_ms: u64,
    pub from_cache: bool,
    /// The generated PDF
    #[serde(skip)]
    pub document: Bytes,
}

/// Failure recorded on a failed job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&GenerationError> for JobError {
    fn from(err: &GenerationError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<GenerationError> for JobError {
    fn from(err: GenerationError) -> Self {
        Self::from(&err)
    }
}

/// A generation job as held by the ledger
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationJob {
    pub id: String,
    pub template_id: String,
    pub input_data: Value,
    pub options: Value,
    pub status: JobStatus,
    pub progress: u8,
    pub result: Option<JobResult>,
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Externally visible job state (without the input payload)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView {
    pub id: String,
    pub template_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl From<GenerationJob> for JobView {
    fn from(job: GenerationJob) -> Self {
        Self {
            id: job.id,
            template_id: job.template_id,
            status: job.status,
            progress: job.progress,
            result: job.result,
            error: job.error,
            created_at: job.created_at,
            updated_at: job.updated_at,
            expires_at: job.expires_at,
        }
    }
}

/// Row returned by job listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub template_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&GenerationJob> for JobSummary {
    fn from(job: &GenerationJob) -> Self {
        Self {
            id: job.id.clone(),
            template_id: job.template_id.clone(),
            status: job.status,
            progress: job.progress,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}
