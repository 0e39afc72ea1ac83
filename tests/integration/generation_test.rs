// Generation Integration Tests
//
// Drives DocumentGenerator end to end with a real store and result sink and
// a fake document engine

#[cfg(test)]
mod tests {
    use super::super::test_harness::{GeneratorHarness, HarnessOptions};
    use docpress::config::{Config, StoreConfig};
    use docpress::error::{ErrorKind, GenerationError};
    use docpress::jobs::{JobStatus, JobView};
    use docpress::orchestrator::DocumentGenerator;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn invoice_data() -> Value {
        json!({
            "number": "INV-001",
            "items": [{ "name": "Widget" }, { "name": "Gadget" }],
            "customer": { "email": "budi@example.com" }
        })
    }

    async fn run(harness: &GeneratorHarness, template: &str, data: Value, options: Value) -> JobView {
        harness
            .generator
            .generate_and_wait(template, data, options, WAIT)
            .await
            .expect("job should finish in time")
    }

    /// Poll a job until it is terminal, recording every (status, progress) seen
    async fn sample_until_done(harness: &GeneratorHarness, job_id: &str) -> Vec<(JobStatus, u8)> {
        tokio::time::timeout(WAIT, async {
            let mut samples = Vec::new();
            loop {
                let view = harness.generator.get_job(job_id).expect("job exists");
                samples.push((view.status, view.progress));
                if view.status.is_terminal() {
                    return samples;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("job should finish in time")
    }

    const CHECKPOINTS: [u8; 8] = [0, 10, 20, 30, 40, 70, 90, 100];

    #[tokio::test]
    async fn test_job_lifecycle_on_cache_miss() {
        let harness = GeneratorHarness::start().await;

        let submitted = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        assert_eq!(submitted.status, JobStatus::Pending);

        let view = harness
            .generator
            .wait_for_completion(&submitted.job_id, WAIT)
            .await
            .unwrap();

        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.progress, 100);
        assert!(view.error.is_none());
        assert!(view.updated_at >= view.created_at);

        let result = view.result.expect("completed job has a result");
        assert!(!result.from_cache);
        assert_eq!(result.page_count, 1);
        assert_eq!(result.size_bytes, result.document.len() as u64);
        assert!(result.fingerprint.starts_with("invoice-"));
        assert!(result.filename.starts_with("invoice-"));
        assert!(result.filename.ends_with(".pdf"));

        let pdf = String::from_utf8(result.document.to_vec()).unwrap();
        assert!(pdf.starts_with("%PDF"));
        assert!(pdf.contains("<h1>Invoice INV-001</h1>"));
        assert!(pdf.contains("<p>0: Widget</p><p>1: Gadget</p>"));
        assert!(pdf.contains("<footer>en-US</footer>"));
        assert!(pdf.contains("color: #123456"));
        assert!(pdf.contains("size: A4"));

        let output_path = result.output_path.expect("document persisted");
        assert_eq!(output_path, harness.output_dir().join(&result.filename));
        assert_eq!(std::fs::read(&output_path).unwrap(), result.document.to_vec());

        assert_eq!(harness.renderer.calls(), 1);
        assert_eq!(harness.engine.conversions(), 1);
        assert_eq!(harness.generator.cache_stats().count, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_rendering() {
        let harness = GeneratorHarness::start().await;

        let first = run(&harness, "invoice", invoice_data(), Value::Null).await;
        let second = run(&harness, "invoice", invoice_data(), Value::Null).await;

        let first = first.result.unwrap();
        let second = second.result.unwrap();
        assert!(second.from_cache);
        assert_eq!(second.output_path, first.output_path);
        assert_eq!(second.fingerprint, first.fingerprint);
        assert_eq!(second.document, first.document);
        assert_eq!(second.page_count, 1);

        assert_eq!(harness.renderer.calls(), 1);
        assert_eq!(harness.engine.conversions(), 1);
        let stats = harness.generator.cache_stats();
        assert_eq!(stats.count, 1);
        assert!(stats.hits >= 1);
    }

    #[tokio::test]
    async fn test_cache_entry_records_generation_metadata() {
        let harness = GeneratorHarness::start().await;

        let view = run(&harness, "invoice", invoice_data(), Value::Null).await;
        let result = view.result.unwrap();

        let entry = harness
            .store
            .get(&result.fingerprint)
            .await
            .unwrap()
            .expect("result is cached");
        let metadata = entry.metadata;
        assert_eq!(metadata["template_id"], "invoice");
        assert_eq!(metadata["filename"], result.filename.as_str());
        assert_eq!(metadata["page_count"], 1);
        assert!(metadata["elapsed_ms"].is_u64());
        let output_path = result.output_path.expect("document persisted");
        assert_eq!(metadata["output_path"], &*output_path.to_string_lossy());
    }

    #[tokio::test]
    async fn test_progress_moves_through_checkpoints() {
        let harness = GeneratorHarness::start_with(HarnessOptions {
            render_delay: Duration::from_millis(100),
            ..Default::default()
        })
        .await;

        let submitted = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        let samples = sample_until_done(&harness, &submitted.job_id).await;

        assert!(samples.windows(2).all(|w| w[0].1 <= w[1].1));
        assert!(samples.iter().all(|(_, p)| CHECKPOINTS.contains(p)));
        assert!(samples.contains(&(JobStatus::Processing, 40)));
        assert_eq!(samples.last(), Some(&(JobStatus::Completed, 100)));
        // Still at 40 while rendering, both on entry and on the way out
        assert_eq!(harness.renderer.observed_progress(), vec![40, 40]);
    }

    #[tokio::test]
    async fn test_cache_hit_never_reaches_render_checkpoints() {
        let harness = GeneratorHarness::start().await;
        run(&harness, "invoice", invoice_data(), Value::Null).await;

        let submitted = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        let samples = sample_until_done(&harness, &submitted.job_id).await;

        assert!(samples
            .iter()
            .all(|(_, p)| [0, 10, 20, 100].contains(p)));
        assert_eq!(samples.last(), Some(&(JobStatus::Completed, 100)));
        let view = harness.generator.get_job(&submitted.job_id).unwrap();
        assert!(view.result.unwrap().from_cache);
        assert_eq!(harness.renderer.calls(), 1);
        assert_eq!(harness.renderer.observed_progress().len(), 2);
    }

    #[tokio::test]
    async fn test_key_order_does_not_change_fingerprint() {
        let harness = GeneratorHarness::start().await;

        let reordered = json!({
            "customer": { "email": "budi@example.com" },
            "items": [{ "name": "Widget" }, { "name": "Gadget" }],
            "number": "INV-001"
        });
        run(&harness, "invoice", invoice_data(), Value::Null).await;
        let view = run(&harness, "invoice", reordered, Value::Null).await;

        assert!(view.result.unwrap().from_cache);
        assert_eq!(harness.renderer.calls(), 1);
    }

    #[tokio::test]
    async fn test_options_participate_in_fingerprint() {
        let harness = GeneratorHarness::start().await;

        let a4 = run(&harness, "invoice", invoice_data(), Value::Null).await;
        let letter = run(
            &harness,
            "invoice",
            invoice_data(),
            json!({ "page": { "format": "letter", "landscape": true } }),
        )
        .await;

        let a4 = a4.result.unwrap();
        let letter = letter.result.unwrap();
        assert_ne!(a4.fingerprint, letter.fingerprint);
        assert!(!letter.from_cache);
        assert!(String::from_utf8_lossy(&letter.document).contains("size: letter landscape"));
        assert_eq!(harness.generator.cache_stats().count, 2);
    }

    #[tokio::test]
    async fn test_cache_disabled_always_renders() {
        let harness = GeneratorHarness::start().await;
        let options = json!({ "cache": false });

        run(&harness, "invoice", invoice_data(), options.clone()).await;
        let view = run(&harness, "invoice", invoice_data(), options).await;

        assert_eq!(view.status, JobStatus::Completed);
        assert!(!view.result.unwrap().from_cache);
        assert_eq!(harness.renderer.calls(), 2);
        assert_eq!(harness.generator.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn test_cache_ttl_option_expires_entry() {
        let harness = GeneratorHarness::start().await;
        let options = json!({ "cache_ttl_seconds": 60 });

        run(&harness, "invoice", invoice_data(), options.clone()).await;
        harness.clock.advance(Duration::from_secs(61));
        let view = run(&harness, "invoice", invoice_data(), options).await;

        assert!(!view.result.unwrap().from_cache);
        assert_eq!(harness.renderer.calls(), 2);
    }

    #[tokio::test]
    async fn test_requested_filename_is_sanitized() {
        let harness = GeneratorHarness::start().await;

        let view = run(
            &harness,
            "invoice",
            invoice_data(),
            json!({ "filename": "../Invoice March.pdf" }),
        )
        .await;

        let result = view.result.unwrap();
        assert_eq!(result.filename, "invoice-march.pdf");
        assert!(harness.output_dir().join("invoice-march.pdf").exists());
    }

    #[tokio::test]
    async fn test_validation_failure() {
        let harness = GeneratorHarness::start().await;

        let view = run(&harness, "invoice", json!({ "items": [] }), Value::Null).await;

        assert_eq!(view.status, JobStatus::Failed);
        assert!(view.result.is_none());
        let error = view.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Validation);
        assert!(error.message.contains("[number] is required"));
        assert_eq!(harness.renderer.calls(), 0);
        assert_eq!(harness.generator.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn test_invalid_options_fail_validation() {
        let harness = GeneratorHarness::start().await;

        let view = run(&harness, "invoice", invoice_data(), json!("fast")).await;

        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.unwrap().kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_render_failure() {
        let harness = GeneratorHarness::start().await;

        let view = run(&harness, "broken", json!({ "items": [1] }), Value::Null).await;

        assert_eq!(view.status, JobStatus::Failed);
        let error = view.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Render);
        assert!(error.message.contains("malformed template"));
        assert_eq!(harness.engine.conversions(), 0);
        assert_eq!(harness.generator.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn test_missing_asset_is_render_failure() {
        let harness = GeneratorHarness::start().await;

        let view = run(&harness, "missing-asset", invoice_data(), Value::Null).await;

        let error = view.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Render);
        assert!(error.message.contains("logo"));
        assert_eq!(harness.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_conversion_failure_stores_nothing() {
        let harness = GeneratorHarness::start().await;
        harness.engine.fail_conversions();

        let view = run(&harness, "invoice", invoice_data(), Value::Null).await;

        let error = view.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Conversion);
        assert!(error.message.contains("engine crashed"));
        assert_eq!(harness.generator.cache_stats().count, 0);
        assert!(!harness.output_dir().exists());
    }

    #[tokio::test]
    async fn test_render_timeout_fails_job() {
        let harness = GeneratorHarness::start_with(HarnessOptions {
            render_delay: Duration::from_millis(500),
            render_timeout: Duration::from_millis(20),
            ..Default::default()
        })
        .await;

        let view = run(&harness, "invoice", invoice_data(), Value::Null).await;

        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_unknown_template_fails_synchronously() {
        let harness = GeneratorHarness::start().await;

        let submitted = harness.generator.submit("nope", json!({}), Value::Null);
        assert_eq!(submitted.status, JobStatus::Failed);

        let view = harness.generator.get_job(&submitted.job_id).unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        let error = view.error.unwrap();
        assert_eq!(error.kind, ErrorKind::UnknownTemplate);
        assert!(error.message.contains("nope"));
        assert_eq!(harness.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let harness = GeneratorHarness::start().await;

        // The job task cannot run before this test yields
        let submitted = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        assert!(harness.generator.cancel_job(&submitted.job_id));

        let view = harness
            .generator
            .wait_for_completion(&submitted.job_id, WAIT)
            .await
            .unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error.unwrap().kind, ErrorKind::Cancelled);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            harness.generator.job_status(&submitted.job_id),
            Some(JobStatus::Failed)
        );
        assert_eq!(harness.renderer.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancel_finished_or_unknown_job() {
        let harness = GeneratorHarness::start().await;

        let view = run(&harness, "invoice", invoice_data(), Value::Null).await;
        assert!(!harness.generator.cancel_job(&view.id));
        assert_eq!(
            harness.generator.job_status(&view.id),
            Some(JobStatus::Completed)
        );
        assert!(!harness.generator.cancel_job("no-such-job"));
    }

    #[tokio::test]
    async fn test_duplicate_submissions_render_once_with_coalescing() {
        let harness = GeneratorHarness::start_with(HarnessOptions {
            render_delay: Duration::from_millis(50),
            ..Default::default()
        })
        .await;
        let before = harness.generator.cache_stats().count;

        let first = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        let second = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);

        let first = harness
            .generator
            .wait_for_completion(&first.job_id, WAIT)
            .await
            .unwrap();
        let second = harness
            .generator
            .wait_for_completion(&second.job_id, WAIT)
            .await
            .unwrap();

        assert_eq!(first.status, JobStatus::Completed);
        assert_eq!(second.status, JobStatus::Completed);
        let first = first.result.unwrap();
        let second = second.result.unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(first.from_cache != second.from_cache);

        assert_eq!(harness.renderer.calls(), 1);
        assert_eq!(harness.generator.cache_stats().count, before + 1);
    }

    #[tokio::test]
    async fn test_duplicate_submissions_without_coalescing_share_one_entry() {
        let harness = GeneratorHarness::start_with(HarnessOptions {
            render_delay: Duration::from_millis(50),
            coalescing: false,
            ..Default::default()
        })
        .await;

        let first = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        let second = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        for id in [&first.job_id, &second.job_id] {
            let view = harness.generator.wait_for_completion(id, WAIT).await.unwrap();
            assert_eq!(view.status, JobStatus::Completed);
        }

        assert_eq!(harness.renderer.calls(), 2);
        assert_eq!(harness.generator.cache_stats().count, 1);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let harness = GeneratorHarness::start_with(HarnessOptions {
            render_delay: Duration::from_millis(500),
            ..Default::default()
        })
        .await;

        let submitted = harness
            .generator
            .submit("invoice", invoice_data(), Value::Null);
        let err = harness
            .generator
            .wait_for_completion(&submitted.job_id, Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::Timeout { .. }));
        assert!(!harness
            .generator
            .job_status(&submitted.job_id)
            .unwrap()
            .is_terminal());
    }

    #[tokio::test]
    async fn test_wait_for_unknown_job() {
        let harness = GeneratorHarness::start().await;

        let err = harness
            .generator
            .wait_for_completion("missing", WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_list_jobs_with_filter() {
        let harness = GeneratorHarness::start().await;

        let ok = run(&harness, "invoice", invoice_data(), Value::Null).await;
        let bad = run(&harness, "invoice", json!({}), Value::Null).await;
        harness.generator.submit("nope", json!({}), Value::Null);

        let all = harness.generator.list_jobs(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].id, ok.id);
        assert_eq!(all[1].id, bad.id);

        let failed = harness.generator.list_jobs(Some("failed")).unwrap();
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|job| job.status == JobStatus::Failed));

        let completed = harness.generator.list_jobs(Some("Completed")).unwrap();
        assert_eq!(completed.len(), 1);

        let err = harness.generator.list_jobs(Some("finished")).unwrap_err();
        assert!(matches!(err, GenerationError::Validation(_)));
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_jobs_and_entries() {
        let harness = GeneratorHarness::start().await;

        let view = run(&harness, "invoice", invoice_data(), Value::Null).await;
        let report = harness.generator.sweep().await.unwrap();
        assert_eq!(report.jobs_removed, 0);
        assert_eq!(report.entries_removed, 0);

        harness.clock.advance(Duration::from_secs(25 * 3600));
        let report = harness.generator.sweep().await.unwrap();

        assert_eq!(report.jobs_removed, 1);
        assert_eq!(report.entries_removed, 1);
        assert!(harness.generator.get_job(&view.id).is_none());
        assert_eq!(harness.generator.cache_stats().count, 0);
    }

    #[tokio::test]
    async fn test_maintenance_task_stops_on_shutdown() {
        let harness = GeneratorHarness::start().await;
        let generator = std::sync::Arc::new(harness.generator);

        let handle = generator.spawn_maintenance(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(30)).await;
        generator.shutdown().await;

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance task should stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_zero_maintenance_interval_is_clamped() {
        let harness = GeneratorHarness::start().await;
        let view = run(&harness, "invoice", invoice_data(), Value::Null).await;
        harness.clock.advance(Duration::from_secs(25 * 3600));
        let generator = Arc::new(harness.generator);

        let handle = generator.spawn_maintenance(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(generator.get_job(&view.id).is_none());
        assert_eq!(generator.cache_stats().count, 0);

        generator.shutdown().await;
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("maintenance task should stop")
            .expect("maintenance task should not panic");
    }

    #[tokio::test]
    async fn test_started_generator_sweeps_on_configured_interval() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.store = StoreConfig::with_capacity(dir.path().join("cache"), 1024 * 1024);
        config.renderer.output_dir = dir.path().join("output");
        config.jobs.sweep_interval_secs = 1;
        config.validate().unwrap();

        let generator = DocumentGenerator::start(&config).await.unwrap();
        generator
            .store()
            .set(
                "short-lived",
                bytes::Bytes::from_static(b"%PDF"),
                Some(Duration::from_secs(1)),
                Value::Null,
            )
            .await
            .unwrap();
        assert_eq!(generator.store().len(), 1);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(generator.store().is_empty());

        generator.shutdown().await;
    }
}
