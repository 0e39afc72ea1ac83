// Generation Prometheus metrics
//
// Counters for job outcomes and content store operations, plus stage
// duration histograms. Registered once in the default registry.

use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntGauge, TextEncoder,
};
use std::sync::OnceLock;

/// Global metrics for the generation pipeline
pub struct GenerationMetrics {
    /// Jobs accepted by `submit`
    pub jobs_submitted: IntCounter,
    /// Jobs that reached `completed`
    pub jobs_completed: IntCounter,
    /// Jobs that reached `failed` (excluding cancellation)
    pub jobs_failed: IntCounter,
    /// Jobs cancelled while pending
    pub jobs_cancelled: IntCounter,
    /// Jobs currently processing
    pub jobs_processing: IntGauge,

    pub store_hits: IntCounter,
    pub store_misses: IntCounter,
    pub store_sets: IntCounter,
    pub store_evictions: IntCounter,
    pub store_expired: IntCounter,
    /// Payloads discarded because they were unreadable or failed checksum
    pub store_corrupt: IntCounter,
    pub store_size_bytes: IntGauge,
    pub store_entries: IntGauge,

    /// Renders avoided because an identical render was in flight
    pub coalesced_renders: IntCounter,

    /// Stage duration histogram (in seconds), labelled by stage
    pub stage_duration: HistogramVec,
}

static METRICS: OnceLock<GenerationMetrics> = OnceLock::new();

impl GenerationMetrics {
    /// Initialize and return the global metrics instance
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let jobs = register_int_counter_vec!(
                "docpress_jobs_total",
                "Total number of generation jobs by outcome",
                &["outcome"] // submitted, completed, failed, cancelled
            )
            .expect("Failed to register jobs_total metric");

            let jobs_processing = register_int_gauge!(
                "docpress_jobs_processing",
                "Current number of jobs being processed"
            )
            .expect("Failed to register jobs_processing metric");

            let store_ops = register_int_counter_vec!(
                "docpress_store_operations_total",
                "Total number of content store operations by type",
                &["operation"] // hit, miss, set, eviction, expired, corrupt
            )
            .expect("Failed to register store_operations_total metric");

            let store_size_bytes = register_int_gauge!(
                "docpress_store_size_bytes",
                "Current size of resident content store payloads"
            )
            .expect("Failed to register store_size_bytes metric");

            let store_entries = register_int_gauge!(
                "docpress_store_entries",
                "Current number of resident content store entries"
            )
            .expect("Failed to register store_entries metric");

            let coalesced_renders = register_int_counter!(
                "docpress_coalesced_renders_total",
                "Renders skipped because an identical render was in flight"
            )
            .expect("Failed to register coalesced_renders_total metric");

            let stage_duration = register_histogram_vec!(
                "docpress_stage_duration_seconds",
                "Duration of generation stages in seconds",
                &["stage"], // validate, render, convert, persist, total
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
            )
            .expect("Failed to register stage_duration_seconds metric");

            GenerationMetrics {
                jobs_submitted: jobs.with_label_values(&["submitted"]),
                jobs_completed: jobs.with_label_values(&["completed"]),
                jobs_failed: jobs.with_label_values(&["failed"]),
                jobs_cancelled: jobs.with_label_values(&["cancelled"]),
                jobs_processing,
                store_hits: store_ops.with_label_values(&["hit"]),
                store_misses: store_ops.with_label_values(&["miss"]),
                store_sets: store_ops.with_label_values(&["set"]),
                store_evictions: store_ops.with_label_values(&["eviction"]),
                store_expired: store_ops.with_label_values(&["expired"]),
                store_corrupt: store_ops.with_label_values(&["corrupt"]),
                store_size_bytes,
                store_entries,
                coalesced_renders,
                stage_duration,
            }
        })
    }

    /// Record a stage duration
    pub fn observe_stage(&self, stage: &str, elapsed: std::time::Duration) {
        self.stage_duration
            .with_label_values(&[stage])
            .observe(elapsed.as_secs_f64());
    }

    /// Publish the store occupancy gauges
    pub fn set_store_occupancy(&self, entries: usize, size_bytes: u64) {
        self.store_entries.set(entries as i64);
        self.store_size_bytes.set(size_bytes as i64);
    }
}

/// Render every registered metric in the Prometheus text format
pub fn export_text() -> String {
    // Make sure our metrics exist even if nothing has been recorded yet
    let _ = GenerationMetrics::global();

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
