// Test harness for integration tests
// Wires a DocumentGenerator to a temp directory with fake engine components

use async_trait::async_trait;
use bytes::Bytes;
use docpress::clock::{Clock, ManualClock};
use docpress::config::StoreConfig;
use docpress::error::GenerationError;
use docpress::jobs::{JobLedger, JobStatus};
use docpress::orchestrator::DocumentGenerator;
use docpress::renderer::schema::{FieldKind, FieldRule};
use docpress::renderer::{
    Asset, DocumentEngine, EngineHandle, EngineLauncher, FsResultSink, PageOptions,
    PlaceholderRenderer, RenderedDocument, TemplateDescriptor, TemplateRegistry,
    TemplateRenderer,
};
use docpress::store::{ContentStore, TokioFsBackend};
use parking_lot::Mutex;
use serde_json::Value;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const START_MILLIS: u64 = 1_700_000_000_000;

const INVOICE_TEMPLATE: &str = "<html><head><title>Invoice</title></head><body>\
<h1>Invoice {{number}}</h1>\
{{#each items}}<p>{{@index}}: {{this.name}}</p>{{/each}}\
<footer>{{@locale}}</footer>\
</body></html>";

const BROKEN_TEMPLATE: &str = "<p>{{#each items}}<span>{{this}}</span></p>";

/// Renderer that counts calls and can be slowed down
///
/// Records the progress of every processing job when a render starts and
/// again just before it returns.
pub struct CountingRenderer {
    inner: PlaceholderRenderer,
    calls: AtomicUsize,
    delay: Duration,
    ledger: Arc<JobLedger>,
    observed: Mutex<Vec<u8>>,
}

impl CountingRenderer {
    pub fn new(delay: Duration, ledger: Arc<JobLedger>) -> Self {
        Self {
            inner: PlaceholderRenderer::new(),
            calls: AtomicUsize::new(0),
            delay,
            ledger,
            observed: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn observed_progress(&self) -> Vec<u8> {
        self.observed.lock().clone()
    }

    fn observe(&self) {
        let processing = self.ledger.list(Some(JobStatus::Processing));
        self.observed
            .lock()
            .extend(processing.iter().map(|job| job.progress));
    }
}

#[async_trait]
impl TemplateRenderer for CountingRenderer {
    async fn render(
        &self,
        template_path: &Path,
        data: &Value,
        locale: &str,
        assets: &[Asset],
    ) -> Result<RenderedDocument, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.observe();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let rendered = self.inner.render(template_path, data, locale, assets).await;
        self.observe();
        rendered
    }
}

/// Engine producing a one-page fake PDF wrapping the HTML
pub struct FakeEngine {
    conversions: AtomicUsize,
    fail: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            conversions: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn conversions(&self) -> usize {
        self.conversions.load(Ordering::SeqCst)
    }

    pub fn fail_conversions(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentEngine for FakeEngine {
    async fn convert(
        &self,
        document: &RenderedDocument,
        page: &PageOptions,
    ) -> Result<Bytes, GenerationError> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(GenerationError::Conversion("engine crashed".to_string()));
        }
        Ok(Bytes::from(format!(
            "%PDF-1.7\n<< /Type /Pages /Count 1 >>\n<< /Type /Page >>\n% {}\n{}\n%%EOF",
            page.to_css(),
            document.html
        )))
    }

    fn is_connected(&self) -> bool {
        true
    }

    async fn shutdown(&self) {}
}

struct SharedLauncher(Arc<FakeEngine>);

#[async_trait]
impl EngineLauncher for SharedLauncher {
    async fn launch(&self) -> Result<Arc<dyn DocumentEngine>, GenerationError> {
        Ok(Arc::clone(&self.0) as Arc<dyn DocumentEngine>)
    }
}

pub struct HarnessOptions {
    pub render_delay: Duration,
    pub coalescing: bool,
    pub capacity_bytes: u64,
    pub render_timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            render_delay: Duration::ZERO,
            coalescing: true,
            capacity_bytes: 1024 * 1024,
            render_timeout: Duration::from_secs(10),
        }
    }
}

/// Generator over a temp directory with real store, sink and templates
pub struct GeneratorHarness {
    pub dir: TempDir,
    pub generator: DocumentGenerator,
    pub renderer: Arc<CountingRenderer>,
    pub engine: Arc<FakeEngine>,
    pub store: Arc<ContentStore>,
    pub clock: Arc<ManualClock>,
}

impl GeneratorHarness {
    pub async fn start() -> Self {
        Self::start_with(HarnessOptions::default()).await
    }

    pub async fn start_with(options: HarnessOptions) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let templates = dir.path().join("templates");
        std::fs::create_dir_all(&templates).expect("Failed to create templates dir");
        std::fs::write(templates.join("invoice.html"), INVOICE_TEMPLATE).unwrap();
        std::fs::write(templates.join("invoice.css"), "h1 { color: #123456; }").unwrap();
        std::fs::write(templates.join("broken.html"), BROKEN_TEMPLATE).unwrap();

        let mut registry = TemplateRegistry::new();
        registry.register(
            TemplateDescriptor::new("invoice", templates.join("invoice.html"))
                .with_asset("style", templates.join("invoice.css"))
                .with_schema(vec![
                    FieldRule::required("number", FieldKind::String),
                    FieldRule::required("items", FieldKind::Array),
                    FieldRule::optional("customer.email", FieldKind::String),
                ]),
        );
        registry.register(TemplateDescriptor::new("broken", templates.join("broken.html")));
        registry.register(TemplateDescriptor::new(
            "missing-asset",
            templates.join("invoice.html"),
        )
        .with_asset("logo", templates.join("logo.png")));

        let clock = Arc::new(ManualClock::new(START_MILLIS));
        let store = Arc::new(
            ContentStore::open(
                &StoreConfig::with_capacity(dir.path().join("cache"), options.capacity_bytes),
                Arc::new(TokioFsBackend::new()),
                Arc::clone(&clock) as Arc<dyn Clock>,
            )
            .await
            .expect("Failed to open content store"),
        );
        let ledger = Arc::new(JobLedger::new(
            Arc::clone(&clock) as Arc<dyn Clock>,
            Duration::from_secs(3600),
        ));

        let renderer = Arc::new(CountingRenderer::new(
            options.render_delay,
            Arc::clone(&ledger),
        ));
        let engine = Arc::new(FakeEngine::new());

        let generator = DocumentGenerator::builder(registry, Arc::clone(&store), ledger)
            .renderer(Arc::clone(&renderer) as Arc<dyn TemplateRenderer>)
            .engine(EngineHandle::new(Arc::new(SharedLauncher(Arc::clone(&engine)))))
            .sink(Arc::new(FsResultSink::new(dir.path().join("output"))))
            .coalescing(options.coalescing)
            .render_timeout(options.render_timeout)
            .build();

        Self {
            dir,
            generator,
            renderer,
            engine,
            store,
            clock,
        }
    }

    pub fn output_dir(&self) -> std::path::PathBuf {
        self.dir.path().join("output")
    }
}
