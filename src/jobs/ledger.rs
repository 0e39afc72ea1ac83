//! In-memory job ledger
//!
//! Holds every job record and enforces the lifecycle state machine. Each job
//! carries a `watch` channel of its status so waiters can block on a
//! transition instead of polling.

use chrono::Duration as ChronoDuration;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

use super::types::{GenerationJob, JobError, JobResult, JobStatus};
use crate::clock::{to_datetime, Clock};
use crate::constants::{PROGRESS_DONE, PROGRESS_STARTED};
use crate::error::GenerationError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("job '{0}' not found")]
    NotFound(String),

    #[error("job '{id}' cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

impl From<LedgerError> for GenerationError {
    fn from(err: LedgerError) -> Self {
        GenerationError::Validation(err.to_string())
    }
}

/// Cap for retention values chrono cannot represent
const MAX_RETENTION_DAYS: i64 = 36_500;

struct JobSlot {
    job: GenerationJob,
    /// Creation order, stable even when timestamps collide
    seq: u64,
    status_tx: watch::Sender<JobStatus>,
}

/// Thread-safe store of generation jobs
pub struct JobLedger {
    jobs: RwLock<HashMap<String, JobSlot>>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    next_seq: AtomicU64,
}

impl JobLedger {
    pub fn new(clock: Arc<dyn Clock>, retention: Duration) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            clock,
            retention,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Record a new pending job
    pub fn create(&self, template_id: &str, input_data: Value, options: Value) -> GenerationJob {
        let now = to_datetime(self.clock.now_millis());
        let retention = ChronoDuration::from_std(self.retention)
            .unwrap_or_else(|_| ChronoDuration::days(MAX_RETENTION_DAYS));
        let job = GenerationJob {
            id: Uuid::new_v4().to_string(),
            template_id: template_id.to_string(),
            input_data,
            options,
            status: JobStatus::Pending,
            progress: 0,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            expires_at: now.checked_add_signed(retention).unwrap_or(now),
        };

        let (status_tx, _) = watch::channel(JobStatus::Pending);
        let slot = JobSlot {
            job: job.clone(),
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            status_tx,
        };
        self.jobs.write().insert(job.id.clone(), slot);

        debug!(job_id = %job.id, template_id = %template_id, "Job created");
        job
    }

    pub fn get(&self, id: &str) -> Option<GenerationJob> {
        self.jobs.read().get(id).map(|slot| slot.job.clone())
    }

    pub fn status(&self, id: &str) -> Option<JobStatus> {
        self.jobs.read().get(id).map(|slot| slot.job.status)
    }

    /// Jobs in creation order, optionally restricted to one status
    pub fn list(&self, filter: Option<JobStatus>) -> Vec<GenerationJob> {
        let jobs = self.jobs.read();
        let mut slots: Vec<&JobSlot> = jobs
            .values()
            .filter(|slot| filter.map_or(true, |status| slot.job.status == status))
            .collect();
        slots.sort_by_key(|slot| (slot.job.created_at, slot.seq));
        slots.into_iter().map(|slot| slot.job.clone()).collect()
    }

    /// `pending -> processing`
    pub fn start(&self, id: &str) -> Result<(), LedgerError> {
        self.transition(id, JobStatus::Processing, |job| {
            job.progress = PROGRESS_STARTED;
        })
    }

    /// Raise progress of a processing job; lower values are ignored
    pub fn advance(&self, id: &str, progress: u8) -> Result<(), LedgerError> {
        let now = to_datetime(self.clock.now_millis());
        let mut jobs = self.jobs.write();
        let slot = jobs
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        if slot.job.status != JobStatus::Processing {
            return Err(LedgerError::InvalidTransition {
                id: id.to_string(),
                from: slot.job.status,
                to: JobStatus::Processing,
            });
        }

        let progress = progress.min(PROGRESS_DONE);
        if progress > slot.job.progress {
            slot.job.progress = progress;
            slot.job.updated_at = now.max(slot.job.updated_at);
        }
        Ok(())
    }

    /// `processing -> completed`
    pub fn complete(&self, id: &str, result: JobResult) -> Result<(), LedgerError> {
        self.transition(id, JobStatus::Completed, move |job| {
            job.progress = PROGRESS_DONE;
            job.result = Some(result);
        })
    }

    /// `pending | processing -> failed`
    pub fn fail(&self, id: &str, error: JobError) -> Result<(), LedgerError> {
        self.transition(id, JobStatus::Failed, move |job| {
            job.error = Some(error);
        })
    }

    /// Cancel a job that has not started; returns whether it was cancelled
    pub fn cancel(&self, id: &str) -> Result<bool, LedgerError> {
        match self.status(id) {
            None => Err(LedgerError::NotFound(id.to_string())),
            Some(JobStatus::Pending) => {
                let error = JobError::from(GenerationError::Cancelled(
                    "job cancelled before processing started".to_string(),
                ));
                match self.fail(id, error) {
                    Ok(()) => Ok(true),
                    // Lost the race against the worker picking it up
                    Err(LedgerError::InvalidTransition { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Some(_) => Ok(false),
        }
    }

    /// Receiver that observes every status change of a job
    pub fn subscribe(&self, id: &str) -> Option<watch::Receiver<JobStatus>> {
        self.jobs
            .read()
            .get(id)
            .map(|slot| slot.status_tx.subscribe())
    }

    /// Drop jobs past their retention, whatever their state
    pub fn sweep_expired(&self) -> usize {
        let now = to_datetime(self.clock.now_millis());
        let mut jobs = self.jobs.write();
        let before = jobs.len();
        jobs.retain(|_, slot| slot.job.expires_at > now);
        before - jobs.len()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn transition<F>(&self, id: &str, to: JobStatus, apply: F) -> Result<(), LedgerError>
    where
        F: FnOnce(&mut GenerationJob),
    {
        let now = to_datetime(self.clock.now_millis());
        let mut jobs = self.jobs.write();
        let slot = jobs
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(id.to_string()))?;

        let from = slot.job.status;
        if !is_allowed(from, to) {
            return Err(LedgerError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }

        slot.job.status = to;
        slot.job.updated_at = now.max(slot.job.updated_at);
        apply(&mut slot.job);
        slot.status_tx.send_replace(to);

        debug!(job_id = %id, from = %from, to = %to, "Job transitioned");
        Ok(())
    }
}

fn is_allowed(from: JobStatus, to: JobStatus) -> bool {
    matches!(
        (from, to),
        (JobStatus::Pending, JobStatus::Processing)
            | (JobStatus::Pending, JobStatus::Failed)
            | (JobStatus::Processing, JobStatus::Completed)
            | (JobStatus::Processing, JobStatus::Failed)
    )
}
