//! Ingest, job processing, status broadcast, and restart.

mod common;

use std::time::Duration;

use common::{FakeCapture, Harness, INVOICE_TEXT, PDF_BYTES};
use taxon_core::defaults::{URL_FALLBACK_CONCEPT, URL_FALLBACK_CONFIDENCE};
use taxon_core::{
    Error, JobRepository, JobStatus, ResourceRepository, ResourceStatus, SignalMethod,
};
use taxon_inference::mock::MockLlmClient;
use taxon_jobs::{NoProgress, ProcessorConfig};
use uuid::Uuid;

fn drain(rx: &mut tokio::sync::mpsc::Receiver<taxon_core::EventEnvelope>) -> Vec<JobStatus> {
    let mut statuses = Vec::new();
    while let Ok(event) = rx.try_recv() {
        statuses.push(event.payload.status);
    }
    statuses
}

#[tokio::test]
async fn test_text_job_completes_and_broadcasts() {
    let h = Harness::new(None).await;
    let mut rx = h.events.subscribe();
    let data_source = Uuid::new_v4();

    let job = h
        .ingest()
        .submit_text(data_source, "march invoice", INVOICE_TEXT)
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);

    let handled = h.processor().run_once().await.unwrap();
    assert_eq!(handled, 1);

    let job = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.started_at.is_some() && job.completed_at.is_some());
    let resource_id = job.result_file_id.unwrap();
    assert_eq!(resource_id.to_string(), job.resource_identifier);

    let resource = h.resource(resource_id).await;
    assert_eq!(resource.filename, "march invoice.txt");
    assert_eq!(resource.data_source_id, Some(data_source));
    assert_eq!(resource.status, ResourceStatus::Done);
    assert_eq!(
        resource.classification.unwrap().primary_concept_id,
        "Invoice"
    );

    let statuses = drain(&mut rx);
    assert_eq!(statuses.first(), Some(&JobStatus::Queued));
    assert_eq!(statuses.last(), Some(&JobStatus::Completed));
    // queued, processing, three stage progress updates, completed
    assert_eq!(statuses.len(), 6);
    assert!(statuses[1..5].iter().all(|s| *s == JobStatus::Processing));
}

#[tokio::test]
async fn test_file_job_stores_upload_and_matches_path() {
    let h = Harness::new(None).await;
    let upload_dir = tempfile::tempdir().unwrap();
    let path = upload_dir.path().join("invoice_march.txt");
    std::fs::write(&path, "Please find the attached.\n").unwrap();

    let job = h.ingest().enqueue_file(Uuid::new_v4(), &path).await.unwrap();
    h.processor().run_once().await.unwrap();

    let job = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error_message);
    let resource = h.resource(job.result_file_id.unwrap()).await;
    assert_eq!(resource.filename, "invoice_march.txt");
    assert_eq!(resource.mime_type, "text/plain");
    assert_ne!(resource.stored_path, path.to_string_lossy());
    let classification = resource.classification.unwrap();
    assert_eq!(classification.primary_concept_id, "Invoice");
    assert!(classification
        .signals
        .iter()
        .any(|s| s.method == SignalMethod::FilePattern));
}

#[tokio::test]
async fn test_ingest_validation() {
    let h = Harness::new(None).await;
    let ingest = h.ingest();

    let err = ingest
        .enqueue_file(Uuid::new_v4(), "/definitely/not/here.pdf")
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let err = ingest
        .enqueue_url(Uuid::new_v4(), "ftp://example.com/file")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    let err = ingest
        .submit_text(Uuid::new_v4(), "empty", "   ")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(h.jobs.queue_stats().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_failed_job_records_truncated_error() {
    let h = Harness::new(None).await;
    let job = h
        .ingest()
        .enqueue_url(Uuid::new_v4(), "https://example.com")
        .await
        .unwrap();

    // No screenshot capture configured.
    h.processor().run_once().await.unwrap();

    let job = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("screenshot"));
    assert!(message.chars().count() <= 1_000);
    assert!(job.result_file_id.is_none());
}

#[tokio::test]
async fn test_url_job_without_submissions_falls_back_to_document() {
    let llm = MockLlmClient::new().with_no_tool_calls();
    let h = Harness::new(Some(llm.clone()))
        .await
        .with_screenshot(FakeCapture);

    let job = h
        .ingest()
        .enqueue_url(Uuid::new_v4(), "https://example.com")
        .await
        .unwrap();
    h.processor().run_once().await.unwrap();

    let job = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error_message);
    assert_eq!(llm.call_count("image_tools"), 1);

    let resource = h.resource(job.result_file_id.unwrap()).await;
    assert_eq!(resource.mime_type, "image/png");
    assert_eq!(resource.status, ResourceStatus::Done);
    let classification = resource.classification.unwrap();
    assert_eq!(classification.primary_concept_id, URL_FALLBACK_CONCEPT);
    assert_eq!(classification.confidence, URL_FALLBACK_CONFIDENCE);
    assert_eq!(classification.signals[0].method, SignalMethod::Fallback);
}

#[tokio::test]
async fn test_url_job_with_submission_uses_model_result() {
    let llm = MockLlmClient::new().with_tool_call(
        "submit_document",
        serde_json::json!({
            "concept_id": "WebPage",
            "confidence": 0.8,
            "extracted_properties": {"url": "https://example.com", "site_name": "Example"}
        }),
    );
    let h = Harness::new(Some(llm)).await.with_screenshot(FakeCapture);

    let job = h
        .ingest()
        .enqueue_url(Uuid::new_v4(), "https://example.com")
        .await
        .unwrap();
    h.processor().run_once().await.unwrap();

    let job = h.queue().get_job(job.id).await.unwrap();
    let resource = h.resource(job.result_file_id.unwrap()).await;
    assert_eq!(
        resource.classification.unwrap().primary_concept_id,
        "WebPage"
    );
    assert!(resource.metadata.contains_key("site_name"));
}

#[tokio::test]
async fn test_url_auth_failure_has_distinct_message() {
    let llm = MockLlmClient::new().failing_tools(Some(401), "invalid api key");
    let h = Harness::new(Some(llm)).await.with_screenshot(FakeCapture);

    let job = h
        .ingest()
        .enqueue_url(Uuid::new_v4(), "https://example.com")
        .await
        .unwrap();
    h.processor().run_once().await.unwrap();

    let job = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    let message = job.error_message.unwrap();
    assert!(message.contains("LLM_API_KEY"), "{}", message);
    assert!(message.contains("401"));
}

#[tokio::test]
async fn test_restart_only_from_terminal_states() {
    let h = Harness::new(None).await;
    let queue = h.queue();
    let job = h
        .ingest()
        .submit_text(Uuid::new_v4(), "note", INVOICE_TEXT)
        .await
        .unwrap();

    let err = queue.restart_job(job.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    h.jobs.mark_processing(job.id).await.unwrap();
    let err = queue.restart_job(job.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));

    h.jobs.requeue(job.id).await.unwrap();
    h.processor().run_once().await.unwrap();
    let done = queue.get_job(job.id).await.unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    let resource_id = done.result_file_id.unwrap();

    let restarted = queue.restart_job(job.id).await.unwrap();
    assert_eq!(restarted.status, JobStatus::Queued);
    assert!(restarted.result_file_id.is_none());
    assert!(restarted.completed_at.is_none());

    // The text input survives, reset for the rerun.
    let resource = h.resource(resource_id).await;
    assert_eq!(resource.status, ResourceStatus::Pending);
    assert!(resource.classification.is_none());

    h.processor().run_once().await.unwrap();
    let again = queue.get_job(job.id).await.unwrap();
    assert_eq!(again.status, JobStatus::Completed);
    assert_eq!(again.result_file_id, Some(resource_id));
}

#[tokio::test]
async fn test_restart_url_job_deletes_previous_result() {
    let h = Harness::new(Some(MockLlmClient::new().with_no_tool_calls()))
        .await
        .with_screenshot(FakeCapture);
    let job = h
        .ingest()
        .enqueue_url(Uuid::new_v4(), "https://example.com")
        .await
        .unwrap();
    h.processor().run_once().await.unwrap();
    let done = h.queue().get_job(job.id).await.unwrap();
    let old = h.resource(done.result_file_id.unwrap()).await;
    let old_file = h.dir.path().join(&old.stored_path);
    assert!(old_file.exists());

    h.queue().restart_job(job.id).await.unwrap();
    assert!(h.resources.get(old.id).await.unwrap().is_none());
    assert!(!old_file.exists());

    h.processor().run_once().await.unwrap();
    let rerun = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(rerun.status, JobStatus::Completed);
    assert_ne!(rerun.result_file_id, Some(old.id));
}

#[tokio::test]
async fn test_queries_and_stats() {
    let h = Harness::new(None).await;
    let ingest = h.ingest();
    let ds = Uuid::new_v4();
    let first = ingest.submit_text(ds, "a", "alpha").await.unwrap();
    ingest.submit_text(ds, "b", "beta").await.unwrap();
    ingest.enqueue_url(ds, "https://example.com").await.unwrap();

    let processor = h.processor_with(ProcessorConfig::default().with_batch_size(1));
    assert_eq!(processor.run_once().await.unwrap(), 1);

    let stats = h.queue().stats().await.unwrap();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.queued, 2);
    assert_eq!(stats.total(), 3);

    let completed = h
        .queue()
        .list_jobs(Some(JobStatus::Completed), None)
        .await
        .unwrap();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].id, first.id);
    assert_eq!(h.queue().list_jobs(None, Some(2)).await.unwrap().len(), 2);

    assert!(h.queue().get_job(Uuid::new_v4()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_processor_loop_runs_until_shutdown() {
    let h = Harness::new(None).await;
    let job = h
        .ingest()
        .submit_text(Uuid::new_v4(), "loop", INVOICE_TEXT)
        .await
        .unwrap();

    let handle = h
        .processor_with(ProcessorConfig::default().with_poll_interval(10))
        .start();

    let mut status = JobStatus::Queued;
    for _ in 0..200 {
        status = h.queue().get_job(job.id).await.unwrap().status;
        if status == JobStatus::Completed {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, JobStatus::Completed);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_disabled_processor_does_nothing() {
    let h = Harness::new(None).await;
    let job = h
        .ingest()
        .submit_text(Uuid::new_v4(), "idle", INVOICE_TEXT)
        .await
        .unwrap();

    let handle = h
        .processor_with(ProcessorConfig::default().with_enabled(false))
        .start();
    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.shutdown().await.unwrap();

    assert_eq!(
        h.queue().get_job(job.id).await.unwrap().status,
        JobStatus::Queued
    );
}

#[tokio::test]
async fn test_restart_of_failed_file_job_replaces_its_resource() {
    let h = Harness::new(Some(MockLlmClient::new().with_no_tool_calls())).await;
    let upload_dir = tempfile::tempdir().unwrap();
    let path = upload_dir.path().join("scan.pdf");
    std::fs::write(&path, PDF_BYTES).unwrap();
    let job = h.ingest().enqueue_file(Uuid::new_v4(), &path).await.unwrap();

    h.processor().run_once().await.unwrap();
    let failed = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    let first = h.resource(failed.result_file_id.unwrap()).await;
    assert_eq!(first.status, ResourceStatus::Error);
    let first_file = h.dir.path().join(&first.stored_path);
    assert!(first_file.exists());
    assert_eq!(h.resources.len(), 1);

    h.queue().restart_job(job.id).await.unwrap();
    assert!(h.resources.is_empty());
    assert!(!first_file.exists());

    h.processor().run_once().await.unwrap();
    let again = h.queue().get_job(job.id).await.unwrap();
    assert_eq!(again.status, JobStatus::Failed);
    assert_ne!(again.result_file_id, Some(first.id));
    assert_eq!(h.resources.len(), 1);
}

#[tokio::test]
async fn test_reprocess_keeps_upload_path_signal() {
    let h = Harness::new(None).await;
    let upload_dir = tempfile::tempdir().unwrap();
    let folder = upload_dir.path().join("invoices");
    std::fs::create_dir(&folder).unwrap();
    let path = folder.join("scan.txt");
    std::fs::write(&path, "Please find attached.\n").unwrap();

    let job = h.ingest().enqueue_file(Uuid::new_v4(), &path).await.unwrap();
    h.processor().run_once().await.unwrap();
    let job = h.queue().get_job(job.id).await.unwrap();
    let resource = h.resource(job.result_file_id.unwrap()).await;
    assert_eq!(
        resource.source_path.as_deref(),
        Some(path.to_string_lossy().as_ref())
    );
    let first = resource.classification.unwrap();
    assert_eq!(first.primary_concept_id, "Invoice");
    assert!(first.confidence > 0.0);

    let outcome = h
        .lifecycle()
        .reprocess(resource.id, None, &NoProgress)
        .await
        .unwrap();
    let second = outcome.root.classification.unwrap();
    assert_eq!(second.primary_concept_id, first.primary_concept_id);
    assert_eq!(second.confidence, first.confidence);
    assert_eq!(second.signals, first.signals);
}

#[tokio::test]
async fn test_reprocess_captured_page_uses_vision_fallback() {
    let llm = MockLlmClient::new().with_no_tool_calls();
    let h = Harness::new(Some(llm.clone()))
        .await
        .with_screenshot(FakeCapture);
    let job = h
        .ingest()
        .enqueue_url(Uuid::new_v4(), "https://example.com")
        .await
        .unwrap();
    h.processor().run_once().await.unwrap();
    let job = h.queue().get_job(job.id).await.unwrap();
    let resource = h.resource(job.result_file_id.unwrap()).await;
    assert_eq!(resource.source_url.as_deref(), Some("https://example.com"));

    let outcome = h
        .lifecycle()
        .reprocess(resource.id, None, &NoProgress)
        .await
        .unwrap();
    assert_eq!(llm.call_count("image_tools"), 2);
    assert_eq!(outcome.root.status, ResourceStatus::Done);
    let classification = outcome.root.classification.unwrap();
    assert_eq!(classification.primary_concept_id, URL_FALLBACK_CONCEPT);
    assert_eq!(classification.confidence, URL_FALLBACK_CONFIDENCE);
}
