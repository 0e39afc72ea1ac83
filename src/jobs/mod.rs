//! Generation job records and their lifecycle

mod ledger;
mod types;

pub use ledger::{JobLedger, LedgerError};
pub use types::{
    GenerationJob, JobError, JobResult, JobStatus, JobSummary, JobView, ParseJobStatusError,
};
