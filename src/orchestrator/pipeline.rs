//! Job processing pipeline
//!
//! Runs one job from `processing` to a terminal state:
//! validate, fingerprint, store lookup, assets, render, convert, persist,
//! store write. A store hit short-circuits everything after the lookup.

use bytes::Bytes;
use regex::bytes::Regex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::options::GenerationOptions;
use crate::coalescing::{CoalescingSlot, LeaderGuard, RenderCoalescer};
use crate::constants::{
    PROGRESS_ASSETS_LOADED, PROGRESS_CACHE_MISS, PROGRESS_CONVERTED, PROGRESS_RENDERED,
    PROGRESS_VALIDATED,
};
use crate::error::GenerationError;
use crate::fingerprint::fingerprint;
use crate::jobs::{GenerationJob, JobError, JobLedger, JobResult, LedgerError};
use crate::metrics::GenerationMetrics;
use crate::renderer::{
    EngineHandle, ResultSink, SchemaValidator, TemplateDescriptor, TemplateRenderer,
    TemplateRegistry,
};
use crate::store::{CacheEntry, ContentStore};

/// Everything a running job needs, shared by all job tasks
pub(crate) struct GeneratorCore {
    pub(crate) registry: TemplateRegistry,
    pub(crate) validator: Arc<dyn SchemaValidator>,
    pub(crate) renderer: Arc<dyn TemplateRenderer>,
    pub(crate) engine: EngineHandle,
    pub(crate) sink: Arc<dyn ResultSink>,
    pub(crate) store: Arc<ContentStore>,
    pub(crate) ledger: Arc<JobLedger>,
    pub(crate) coalescer: Option<RenderCoalescer>,
    pub(crate) render_timeout: Duration,
    pub(crate) operation_timeout: Duration,
}

/// Output of a full render
struct Generated {
    document: Bytes,
    output_path: PathBuf,
}

/// Outcome of [`GeneratorCore::claim`]
enum Claim {
    Hit(CacheEntry),
    /// Render; holding the guard when this job leads the fingerprint
    Render(Option<LeaderGuard>),
}

/// Metadata kept with every cached document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct StoredDocument {
    pub(crate) template_id: String,
    pub(crate) filename: String,
    pub(crate) page_count: u32,
    /// Time the original generation took
    pub(crate) elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) output_path: Option<PathBuf>,
}

/// Bound a fallible future by a deadline
async fn bounded<T, F>(operation: &'static str, after: Duration, fut: F) -> Result<T, GenerationError>
where
    F: Future<Output = Result<T, GenerationError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(GenerationError::Timeout { operation, after }),
    }
}

fn page_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"/Type\s*/Page[^s]").expect("Invalid page pattern"))
}

/// Count page objects in a PDF
pub(crate) fn count_pages(document: &[u8]) -> u32 {
    page_pattern().find_iter(document).count() as u32
}

impl GeneratorCore {
    /// Drive a job to a terminal state
    pub(crate) async fn run_job(self: Arc<Self>, job: GenerationJob, template: Arc<TemplateDescriptor>) {
        match self.ledger.start(&job.id) {
            Ok(()) => {}
            Err(LedgerError::InvalidTransition { from, .. }) => {
                debug!(job_id = %job.id, status = %from, "Job no longer pending, skipping");
                return;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "Job vanished before processing");
                return;
            }
        }

        let metrics = GenerationMetrics::global();
        metrics.jobs_processing.inc();
        let started = Instant::now();

        let outcome = self.process(&job, &template, started).await;
        metrics.observe_stage("total", started.elapsed());

        match outcome {
            Ok(result) => {
                info!(
                    job_id = %job.id,
                    template_id = %job.template_id,
                    fingerprint = %result.fingerprint,
                    from_cache = result.from_cache,
                    size_bytes = result.size_bytes,
                    elapsed_ms = result.elapsed_ms,
                    "Job completed"
                );
                metrics.jobs_completed.inc();
                if let Err(e) = self.ledger.complete(&job.id, result) {
                    warn!(job_id = %job.id, error = %e, "Could not record job completion");
                }
            }
            Err(err) => {
                warn!(
                    job_id = %job.id,
                    template_id = %job.template_id,
                    kind = %err.kind(),
                    error = %err,
                    "Job failed"
                );
                metrics.jobs_failed.inc();
                if let Err(e) = self.ledger.fail(&job.id, JobError::from(&err)) {
                    warn!(job_id = %job.id, error = %e, "Could not record job failure");
                }
            }
        }
        metrics.jobs_processing.dec();
    }

    async fn process(
        &self,
        job: &GenerationJob,
        template: &TemplateDescriptor,
        started: Instant,
    ) -> Result<JobResult, GenerationError> {
        let metrics = GenerationMetrics::global();

        let stage = Instant::now();
        let options = GenerationOptions::from_value(&job.options)?;
        self.validator.validate(template, &job.input_data)?;
        metrics.observe_stage("validate", stage.elapsed());
        self.progress(&job.id, PROGRESS_VALIDATED);

        let key = fingerprint(&template.id, &job.input_data, &job.options)?;
        let filename = options.output_filename(&template.id, &key);
        debug!(job_id = %job.id, fingerprint = %key, "Fingerprinted request");

        if options.cache {
            if let Some(entry) = self.lookup(&key).await? {
                return Ok(cached_result(key, filename, entry, started));
            }
        }
        self.progress(&job.id, PROGRESS_CACHE_MISS);

        let leader = if options.cache {
            match self.claim(&job.id, &key).await? {
                Claim::Hit(entry) => return Ok(cached_result(key, filename, entry, started)),
                Claim::Render(leader) => leader,
            }
        } else {
            None
        };

        let generated = self.generate(job, template, &options, &filename).await?;
        let stored = StoredDocument {
            template_id: template.id.clone(),
            filename,
            page_count: count_pages(&generated.document),
            elapsed_ms: started.elapsed().as_millis() as u64,
            output_path: Some(generated.output_path),
        };

        if options.cache {
            self.remember(&key, &generated.document, &options, &stored, leader)
                .await?;
        }

        Ok(JobResult {
            fingerprint: key,
            filename: stored.filename,
            output_path: stored.output_path,
            size_bytes: generated.document.len() as u64,
            page_count: stored.page_count,
            elapsed_ms: started.elapsed().as_millis() as u64,
            from_cache: false,
            document: generated.document,
        })
    }

    /// Decide who renders `key` after this job's own store miss
    async fn claim(&self, job_id: &str, key: &str) -> Result<Claim, GenerationError> {
        let Some(coalescer) = &self.coalescer else {
            return Ok(Claim::Render(None));
        };

        match coalescer.acquire(key).await {
            CoalescingSlot::Leader(guard) => {
                // An earlier leader may have finished since our miss
                if let Some(entry) = self.lookup(key).await? {
                    guard.succeed();
                    debug!(job_id = %job_id, fingerprint = %key, "Stored while acquiring, skipping render");
                    return Ok(Claim::Hit(entry));
                }
                Ok(Claim::Render(Some(guard)))
            }
            CoalescingSlot::Follower { leader_succeeded } => {
                if leader_succeeded {
                    if let Some(entry) = self.lookup(key).await? {
                        GenerationMetrics::global().coalesced_renders.inc();
                        debug!(job_id = %job_id, fingerprint = %key, "Served by coalesced render");
                        return Ok(Claim::Hit(entry));
                    }
                }
                debug!(job_id = %job_id, fingerprint = %key, "Coalesced render unavailable, rendering");
                Ok(Claim::Render(None))
            }
        }
    }

    /// Assets, render, convert, persist
    async fn generate(
        &self,
        job: &GenerationJob,
        template: &TemplateDescriptor,
        options: &GenerationOptions,
        filename: &str,
    ) -> Result<Generated, GenerationError> {
        let metrics = GenerationMetrics::global();

        let assets = bounded("load assets", self.operation_timeout, template.load_assets()).await?;
        self.progress(&job.id, PROGRESS_ASSETS_LOADED);

        let locale = options.locale.as_deref().unwrap_or(&template.locale);
        let stage = Instant::now();
        let html = bounded(
            "render",
            self.render_timeout,
            self.renderer
                .render(&template.path, &job.input_data, locale, &assets),
        )
        .await?;
        metrics.observe_stage("render", stage.elapsed());
        self.progress(&job.id, PROGRESS_RENDERED);

        let page = match &options.page {
            Some(overrides) => overrides.apply(&template.page),
            None => template.page.clone(),
        };
        let stage = Instant::now();
        let document = bounded("convert", self.render_timeout, async {
            let lease = self.engine.acquire().await?;
            lease.convert(&html, &page).await
        })
        .await?;
        metrics.observe_stage("convert", stage.elapsed());
        self.progress(&job.id, PROGRESS_CONVERTED);

        let stage = Instant::now();
        let output_path = bounded(
            "persist",
            self.operation_timeout,
            self.sink.persist(filename, &document),
        )
        .await?;
        metrics.observe_stage("persist", stage.elapsed());

        Ok(Generated {
            document,
            output_path,
        })
    }

    /// Store read; read faults degrade to a miss
    async fn lookup(&self, key: &str) -> Result<Option<CacheEntry>, GenerationError> {
        let read = tokio::time::timeout(self.operation_timeout, self.store.get(key)).await;
        match read {
            Ok(Ok(entry)) => Ok(entry),
            Ok(Err(e)) => {
                warn!(fingerprint = %key, error = %e, "Store lookup failed, treating as miss");
                Ok(None)
            }
            Err(_) => Err(GenerationError::Timeout {
                operation: "store lookup",
                after: self.operation_timeout,
            }),
        }
    }

    /// Store write; releases coalesced followers once the entry is visible
    async fn remember(
        &self,
        key: &str,
        document: &Bytes,
        options: &GenerationOptions,
        stored: &StoredDocument,
        leader: Option<LeaderGuard>,
    ) -> Result<(), GenerationError> {
        let metadata = serde_json::to_value(stored).map_err(|e| {
            GenerationError::Storage(format!("failed to encode cache metadata: {}", e))
        })?;
        bounded("store write", self.operation_timeout, async {
            self.store
                .set(key, document.clone(), options.cache_ttl(), metadata)
                .await
                .map_err(GenerationError::from)
        })
        .await?;

        if let Some(guard) = leader {
            guard.succeed();
        }
        Ok(())
    }

    fn progress(&self, job_id: &str, progress: u8) {
        if let Err(e) = self.ledger.advance(job_id, progress) {
            debug!(job_id = %job_id, progress = progress, error = %e, "Progress not recorded");
        }
    }
}

fn cached_result(key: String, filename: String, entry: CacheEntry, started: Instant) -> JobResult {
    // Entries written without metadata still serve, minus the output path
    let stored = serde_json::from_value::<StoredDocument>(entry.metadata.clone()).ok();
    let page_count = stored
        .as_ref()
        .map(|s| s.page_count)
        .unwrap_or_else(|| count_pages(&entry.payload));

    debug!(fingerprint = %key, size_bytes = entry.size_bytes, "Store hit");
    JobResult {
        fingerprint: key,
        filename,
        output_path: stored.and_then(|s| s.output_path),
        size_bytes: entry.size_bytes,
        page_count,
        elapsed_ms: started.elapsed().as_millis() as u64,
        from_cache: true,
        document: entry.payload,
    }
}
