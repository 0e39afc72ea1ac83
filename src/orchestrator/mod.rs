//! Document generation orchestrator
//!
//! [`DocumentGenerator`] accepts jobs, runs each on its own task through the
//! pipeline and answers status queries from the job ledger.

mod options;
mod pipeline;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::SystemClock;
use crate::coalescing::RenderCoalescer;
use crate::config::Config;
use crate::constants::{
    DEFAULT_CHROMIUM_PATH, DEFAULT_OUTPUT_DIR, DEFAULT_RENDER_TIMEOUT_SECS,
    DEFAULT_STORE_OPERATION_TIMEOUT_SECS, MIN_SWEEP_INTERVAL_MILLIS,
};
use crate::error::GenerationError;
use crate::jobs::{JobError, JobLedger, JobStatus, JobSummary, JobView, LedgerError};
use crate::metrics::GenerationMetrics;
use crate::renderer::{
    ChromiumLauncher, EngineHandle, FsResultSink, PlaceholderRenderer, ResultSink,
    SchemaValidator, TemplateRegistry, TemplateRenderer, TemplateSchemaValidator,
};
use crate::store::{ContentStore, StoreStats};

pub use options::GenerationOptions;
use pipeline::GeneratorCore;

/// Handle returned by [`DocumentGenerator::submit`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmittedJob {
    pub job_id: String,
    pub status: JobStatus,
}

/// Counts removed by one maintenance sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub jobs_removed: usize,
    pub entries_removed: usize,
}

/// Builder for [`DocumentGenerator`]
///
/// Registry, store and ledger are required; every other component has a
/// production default.
pub struct DocumentGeneratorBuilder {
    registry: TemplateRegistry,
    store: Arc<ContentStore>,
    ledger: Arc<JobLedger>,
    validator: Option<Arc<dyn SchemaValidator>>,
    renderer: Option<Arc<dyn TemplateRenderer>>,
    engine: Option<EngineHandle>,
    sink: Option<Arc<dyn ResultSink>>,
    coalescing: bool,
    render_timeout: Duration,
    operation_timeout: Duration,
}

impl DocumentGeneratorBuilder {
    pub fn validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn TemplateRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn engine(mut self, engine: EngineHandle) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn coalescing(mut self, enabled: bool) -> Self {
        self.coalescing = enabled;
        self
    }

    pub fn render_timeout(mut self, timeout: Duration) -> Self {
        self.render_timeout = timeout;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn build(self) -> DocumentGenerator {
        let core = GeneratorCore {
            registry: self.registry,
            validator: self
                .validator
                .unwrap_or_else(|| Arc::new(TemplateSchemaValidator::new())),
            renderer: self
                .renderer
                .unwrap_or_else(|| Arc::new(PlaceholderRenderer::new())),
            engine: self.engine.unwrap_or_else(|| {
                EngineHandle::new(Arc::new(ChromiumLauncher::new(
                    DEFAULT_CHROMIUM_PATH,
                    Vec::new(),
                )))
            }),
            sink: self
                .sink
                .unwrap_or_else(|| Arc::new(FsResultSink::new(DEFAULT_OUTPUT_DIR))),
            store: self.store,
            ledger: self.ledger,
            coalescer: self.coalescing.then(RenderCoalescer::new),
            render_timeout: self.render_timeout,
            operation_timeout: self.operation_timeout,
        };
        let (shutdown_tx, _) = watch::channel(false);

        DocumentGenerator {
            core: Arc::new(core),
            shutdown_tx,
        }
    }
}

/// Asynchronous document generation service
pub struct DocumentGenerator {
    core: Arc<GeneratorCore>,
    shutdown_tx: watch::Sender<bool>,
}

impl DocumentGenerator {
    pub fn builder(
        registry: TemplateRegistry,
        store: Arc<ContentStore>,
        ledger: Arc<JobLedger>,
    ) -> DocumentGeneratorBuilder {
        DocumentGeneratorBuilder {
            registry,
            store,
            ledger,
            validator: None,
            renderer: None,
            engine: None,
            sink: None,
            coalescing: true,
            render_timeout: Duration::from_secs(DEFAULT_RENDER_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(DEFAULT_STORE_OPERATION_TIMEOUT_SECS),
        }
    }

    /// Wire up the production components described by `config`
    pub async fn from_config(config: &Config) -> Result<Self, GenerationError> {
        let store = ContentStore::open_on_disk(&config.store).await?;
        let ledger = JobLedger::new(Arc::new(SystemClock), config.jobs.retention());
        let registry = TemplateRegistry::from_config(&config.renderer, &config.templates);

        info!(
            templates = registry.len(),
            cache_dir = %config.store.cache_dir.display(),
            coalescing = config.coalescing.enabled,
            "Document generator ready"
        );

        Ok(Self::builder(registry, Arc::new(store), Arc::new(ledger))
            .engine(EngineHandle::new(Arc::new(ChromiumLauncher::from_config(
                &config.renderer,
            ))))
            .sink(Arc::new(FsResultSink::new(config.renderer.output_dir.clone())))
            .coalescing(config.coalescing.enabled)
            .render_timeout(config.renderer.render_timeout())
            .operation_timeout(config.store.operation_timeout())
            .build())
    }

    /// Build from `config` and start the periodic maintenance sweep
    ///
    /// The sweep runs every `jobs.sweep_interval_secs` until
    /// [`DocumentGenerator::shutdown`].
    pub async fn start(config: &Config) -> Result<Arc<Self>, GenerationError> {
        let generator = Arc::new(Self::from_config(config).await?);
        // Detached; the task exits on shutdown
        let _maintenance = generator.spawn_maintenance(config.jobs.sweep_interval());
        Ok(generator)
    }

    /// Queue a job and return immediately
    ///
    /// An unknown template fails the job before this returns. Must be called
    /// from within a tokio runtime.
    pub fn submit(&self, template_id: &str, data: Value, options: Value) -> SubmittedJob {
        let metrics = GenerationMetrics::global();
        let job = self.core.ledger.create(template_id, data, options);
        metrics.jobs_submitted.inc();

        let Some(template) = self.core.registry.get(template_id) else {
            let err = GenerationError::UnknownTemplate(template_id.to_string());
            warn!(job_id = %job.id, template_id = %template_id, "Rejected job for unknown template");
            metrics.jobs_failed.inc();
            if let Err(e) = self.core.ledger.fail(&job.id, JobError::from(&err)) {
                warn!(job_id = %job.id, error = %e, "Could not record job failure");
            }
            return SubmittedJob {
                job_id: job.id,
                status: JobStatus::Failed,
            };
        };

        debug!(job_id = %job.id, template_id = %template_id, "Job submitted");
        let job_id = job.id.clone();
        tokio::spawn(Arc::clone(&self.core).run_job(job, template));

        SubmittedJob {
            job_id,
            status: JobStatus::Pending,
        }
    }

    pub fn get_job(&self, job_id: &str) -> Option<JobView> {
        self.core.ledger.get(job_id).map(JobView::from)
    }

    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        self.core.ledger.status(job_id)
    }

    /// Jobs in submission order; `filter` is a status name
    pub fn list_jobs(&self, filter: Option<&str>) -> Result<Vec<JobSummary>, GenerationError> {
        let status = filter
            .map(str::parse::<JobStatus>)
            .transpose()
            .map_err(|e| GenerationError::Validation(e.to_string()))?;

        Ok(self
            .core
            .ledger
            .list(status)
            .iter()
            .map(JobSummary::from)
            .collect())
    }

    /// Cancel a pending job; returns whether it was cancelled
    pub fn cancel_job(&self, job_id: &str) -> bool {
        match self.core.ledger.cancel(job_id) {
            Ok(true) => {
                info!(job_id = %job_id, "Job cancelled");
                GenerationMetrics::global().jobs_cancelled.inc();
                true
            }
            Ok(false) => false,
            Err(LedgerError::NotFound(_)) => false,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Cancel failed");
                false
            }
        }
    }

    pub fn cache_stats(&self) -> StoreStats {
        self.core.store.stats()
    }

    /// Block until the job is terminal or `timeout` elapses
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        timeout: Duration,
    ) -> Result<JobView, GenerationError> {
        let not_found = || GenerationError::Validation(format!("job '{}' not found", job_id));
        let mut status = self.core.ledger.subscribe(job_id).ok_or_else(not_found)?;

        let waited = tokio::time::timeout(
            timeout,
            status.wait_for(JobStatus::is_terminal),
        )
        .await
        .map(|changed| changed.map(|_| ()));

        match waited {
            Ok(Ok(())) => self.get_job(job_id).ok_or_else(not_found),
            // Sender dropped: the job was swept while we waited
            Ok(Err(_)) => Err(not_found()),
            Err(_) => Err(GenerationError::Timeout {
                operation: "wait for job",
                after: timeout,
            }),
        }
    }

    /// Submit a job and wait for it to finish
    pub async fn generate_and_wait(
        &self,
        template_id: &str,
        data: Value,
        options: Value,
        timeout: Duration,
    ) -> Result<JobView, GenerationError> {
        let submitted = self.submit(template_id, data, options);
        self.wait_for_completion(&submitted.job_id, timeout).await
    }

    /// Drop expired jobs and store entries
    pub async fn sweep(&self) -> Result<SweepReport, GenerationError> {
        let jobs_removed = self.core.ledger.sweep_expired();
        let entries_removed = self.core.store.sweep_expired().await?;
        if jobs_removed > 0 || entries_removed > 0 {
            info!(
                jobs_removed = jobs_removed,
                entries_removed = entries_removed,
                "Maintenance sweep"
            );
        }
        Ok(SweepReport {
            jobs_removed,
            entries_removed,
        })
    }

    /// Run [`DocumentGenerator::sweep`] every `interval` until shutdown
    ///
    /// Intervals shorter than 100ms are raised to 100ms.
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let generator = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let floor = Duration::from_millis(MIN_SWEEP_INTERVAL_MILLIS);
        if interval < floor {
            warn!(
                requested_ms = interval.as_millis() as u64,
                using_ms = MIN_SWEEP_INTERVAL_MILLIS,
                "Maintenance interval too short, clamping"
            );
        }
        let interval = interval.max(floor);
        debug!(interval_ms = interval.as_millis() as u64, "Starting maintenance task");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = generator.sweep().await {
                            warn!(error = %e, "Maintenance sweep failed");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        debug!("Maintenance task stopping");
                        break;
                    }
                }
            }
        })
    }

    /// Stop maintenance and tear down the document engine once in-flight
    /// conversions have released it
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        self.core.engine.shutdown().await;
        info!("Document generator shut down");
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.core.registry
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.core.store
    }
}
