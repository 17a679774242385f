//! Pipeline, tool-calling split, reprocessing, and group deletion.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use common::{Harness, INVOICE_TEXT, PDF_BYTES, PNG_BYTES};
use taxon_core::{
    Error, FieldValue, LlmExtraction, PageRange, Resource, ResourceRepository, ResourceStatus,
    Result, SignalMethod,
};
use taxon_db::MemoryResourceRepository;
use taxon_inference::mock::MockLlmClient;
use taxon_jobs::split::NO_SUBMISSIONS_MSG;
use taxon_jobs::{NoProgress, ProcessOptions};

fn splitting_llm() -> MockLlmClient {
    let submit = |range: &str, number: &str| {
        json!({
            "concept_id": "Invoice",
            "confidence": 0.92,
            "reasoning": "invoice header",
            "page_range": range,
            "extracted_properties": {
                "invoice_number": number,
                "total_amount": "1,250.50",
                "iban": "NL91ABNA0417164300"
            },
            "summary": format!("Invoice {}", number)
        })
    };
    MockLlmClient::new()
        .with_tool_call("get_extraction_schema", json!({"concept_id": "Invoice"}))
        .with_tool_call("submit_document", submit("1", "A-1"))
        .with_tool_call("submit_document", submit("2-3", "A-2"))
        .with_tool_call("submit_document", submit("4", "A-3"))
}

#[tokio::test]
async fn test_text_resource_runs_standard_stages() {
    let h = Harness::new(None).await;
    let resource = h
        .stored_resource("march.txt", "text/plain", INVOICE_TEXT.as_bytes())
        .await;

    let outcome = h
        .pipeline
        .process(resource.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();

    assert!(outcome.children.is_empty());
    let stored = h.resource(resource.id).await;
    assert_eq!(stored.status, ResourceStatus::Done);
    let classification = stored.classification.as_ref().unwrap();
    assert_eq!(classification.primary_concept_id, "Invoice");
    assert!(classification.confidence > 0.0 && classification.confidence <= 1.0);
    assert!(classification
        .signals
        .iter()
        .all(|s| s.method == SignalMethod::Hint));

    assert_eq!(
        stored.metadata["invoice_number"].value,
        FieldValue::Text("F-2025-001".into())
    );
    assert_eq!(stored.metadata["total_amount"].value, FieldValue::Number(1250.50));
    assert!(stored.extracted_text.as_deref().unwrap().contains("F-2025-001"));
    assert!(stored.timings.text_extraction_ms.is_some());
    assert!(stored.timings.total_ms.is_some());
    assert!(stored.processed_at.is_some());
}

#[tokio::test]
async fn test_unknown_resource_is_not_found() {
    let h = Harness::new(None).await;
    let err = h
        .pipeline
        .process(uuid::Uuid::new_v4(), ProcessOptions::default(), &NoProgress)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_unsupported_type_without_override_is_unknown() {
    let h = Harness::new(None).await;
    let resource = h
        .stored_resource("blob.bin", "application/octet-stream", b"\x00\x01\x02")
        .await;

    h.pipeline
        .process(resource.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();

    let stored = h.resource(resource.id).await;
    assert_eq!(stored.status, ResourceStatus::Done);
    assert!(stored.classification.unwrap().is_unknown());
    assert!(stored.metadata.is_empty());
    assert!(stored.extracted_text.is_none());
}

#[tokio::test]
async fn test_pdf_tool_round_with_three_submissions_splits() {
    let llm = splitting_llm();
    let h = Harness::new(Some(llm.clone())).await;
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;

    let outcome = h
        .pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();

    assert_eq!(llm.call_count("pdf_tools"), 1);
    let responses = llm.tool_responses();
    assert_eq!(responses[0]["concept_id"], "Invoice");
    assert_eq!(responses[3]["document_index"], 3);

    assert_eq!(outcome.children.len(), 2);
    assert_eq!(h.resources.len(), 3);

    let updated = h.resource(root.id).await;
    assert_eq!(updated.status, ResourceStatus::Done);
    assert_eq!(updated.page_range, Some(PageRange::new(1, 1)));
    assert_eq!(
        updated.classification.as_ref().unwrap().signals[0].method,
        SignalMethod::ToolCalling
    );
    assert_eq!(updated.metadata["total_amount"].value, FieldValue::Number(1250.50));
    assert_eq!(updated.extra_fields[0].name, "iban");

    let children = h.resources.list_by_origin(root.id).await.unwrap();
    assert_eq!(children.len(), 2);
    let mut ranges: Vec<PageRange> = children.iter().filter_map(|c| c.page_range).collect();
    ranges.sort_by_key(|r| r.start);
    assert_eq!(ranges, vec![PageRange::new(2, 3), PageRange::new(4, 4)]);
    for child in &children {
        assert_eq!(child.origin_file_id, Some(root.id));
        assert_eq!(child.stored_path, root.stored_path);
        assert_eq!(child.mime_type, "application/pdf");
        assert_eq!(child.status, ResourceStatus::Done);
    }
}

#[tokio::test]
async fn test_zero_submissions_mark_resource_error() {
    let h = Harness::new(Some(MockLlmClient::new().with_no_tool_calls())).await;
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;

    let err = h
        .pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap_err();
    assert!(err.to_string().contains(NO_SUBMISSIONS_MSG));

    let stored = h.resource(root.id).await;
    assert_eq!(stored.status, ResourceStatus::Error);
    assert!(stored
        .error_message
        .as_deref()
        .unwrap()
        .contains(NO_SUBMISSIONS_MSG));
    assert_eq!(h.resources.len(), 1);
}

#[tokio::test]
async fn test_pdf_without_llm_takes_standard_path() {
    let h = Harness::new(None).await;
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;

    h.pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();

    let stored = h.resource(root.id).await;
    assert_eq!(stored.status, ResourceStatus::Done);
    assert!(stored.classification.unwrap().is_unknown());
}

#[tokio::test]
async fn test_override_with_unknown_concept_is_rejected() {
    let h = Harness::new(None).await;
    let resource = h
        .stored_resource("note.txt", "text/plain", b"hello")
        .await;
    let err = h
        .pipeline
        .process(
            resource.id,
            ProcessOptions::default().with_concept_override("Spaceship"),
            &NoProgress,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(h.resource(resource.id).await.status, ResourceStatus::Error);
}

#[tokio::test]
async fn test_reprocess_resets_and_removes_children() {
    let h = Harness::new(Some(splitting_llm())).await;
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;
    let first = h
        .pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();
    assert_eq!(h.resources.len(), 3);

    // Reprocessing through a child acts on its root.
    let child_id = first.children[0].id;
    let outcome = h
        .lifecycle()
        .reprocess(child_id, Some("Contract".to_string()), &NoProgress)
        .await
        .unwrap();

    assert_eq!(outcome.root.id, root.id);
    assert!(outcome.children.is_empty());
    assert_eq!(h.resources.len(), 1);
    assert!(h.resources.list_by_origin(root.id).await.unwrap().is_empty());

    let stored = h.resource(root.id).await;
    assert_eq!(stored.status, ResourceStatus::Done);
    assert_eq!(stored.page_range, None);
    assert!(stored.summary.is_none());
    assert!(stored.extra_fields.is_empty());
    let classification = stored.classification.as_ref().unwrap();
    assert_eq!(classification.primary_concept_id, "Contract");
    assert_eq!(classification.signals[0].method, SignalMethod::Override);

    let again = h
        .lifecycle()
        .reprocess(root.id, Some("Contract".to_string()), &NoProgress)
        .await
        .unwrap();
    assert_eq!(again.root.classification, stored.classification);
    assert_eq!(again.root.metadata, stored.metadata);
}

#[tokio::test]
async fn test_reprocess_after_failure_clears_error() {
    let h = Harness::new(None).await;
    let resource = h
        .stored_resource("march.txt", "text/plain", INVOICE_TEXT.as_bytes())
        .await;
    let mut failed = h.resource(resource.id).await;
    failed.status = ResourceStatus::Error;
    failed.error_message = Some("earlier failure".into());
    h.resources.update(&failed).await.unwrap();

    let outcome = h
        .lifecycle()
        .reprocess(resource.id, None, &NoProgress)
        .await
        .unwrap();
    assert_eq!(outcome.root.status, ResourceStatus::Done);
    assert!(outcome.root.error_message.is_none());
    assert_eq!(
        outcome.root.classification.unwrap().primary_concept_id,
        "Invoice"
    );
}

#[tokio::test]
async fn test_delete_keeps_file_while_referenced_elsewhere() {
    let h = Harness::new(Some(splitting_llm())).await;
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;
    let outcome = h
        .pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();

    let outsider = Resource::new("copy.pdf", "application/pdf", root.stored_path.clone());
    h.resources.insert(&outsider).await.unwrap();
    let file = h.dir.path().join(&root.stored_path);
    assert!(file.exists());

    let report = h
        .lifecycle()
        .delete_resource(outcome.children[1].id)
        .await
        .unwrap();
    assert_eq!(report.deleted.len(), 3);
    assert!(report.files_removed.is_empty());
    assert!(file.exists());
    assert_eq!(h.resources.len(), 1);

    let report = h.lifecycle().delete_resource(outsider.id).await.unwrap();
    assert_eq!(report.deleted, vec![outsider.id]);
    assert_eq!(report.files_removed, vec![root.stored_path.clone()]);
    assert!(!file.exists());
}

#[tokio::test]
async fn test_delete_with_missing_root_removes_siblings() {
    let h = Harness::new(Some(splitting_llm())).await;
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;
    let outcome = h
        .pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();
    h.resources.delete(root.id).await.unwrap();

    let report = h
        .lifecycle()
        .delete_resource(outcome.children[0].id)
        .await
        .unwrap();
    assert_eq!(report.deleted.len(), 2);
    assert!(h.resources.is_empty());
    assert_eq!(report.files_removed, vec![root.stored_path.clone()]);
}

#[tokio::test]
async fn test_override_on_image_without_text_extracts_metadata() {
    let properties = json!({"invoice_number": "F-9", "due_date": "15/03/2025"});
    let llm = MockLlmClient::new().with_extraction(LlmExtraction {
        properties: properties.as_object().unwrap().clone(),
        summary: Some("Photographed invoice".into()),
        confidence: Some(0.7),
    });
    let h = Harness::new(Some(llm.clone())).await;
    let photo = h.stored_resource("photo.png", "image/png", PNG_BYTES).await;

    let outcome = h
        .lifecycle()
        .reprocess(photo.id, Some("Invoice".to_string()), &NoProgress)
        .await
        .unwrap();

    assert_eq!(llm.call_count("image_tools"), 0);
    assert_eq!(llm.call_count("extract"), 1);
    let stored = h.resource(photo.id).await;
    assert_eq!(stored, outcome.root);
    assert_eq!(stored.status, ResourceStatus::Done);
    assert!(stored.extracted_text.is_none());
    assert!(stored.timings.extraction_ms.is_some());
    assert_eq!(
        stored.classification.as_ref().unwrap().signals[0].method,
        SignalMethod::Override
    );
    assert_eq!(
        stored.metadata["invoice_number"].value,
        FieldValue::Text("F-9".into())
    );
    assert_eq!(
        stored.metadata["due_date"].value,
        FieldValue::Date(chrono::NaiveDate::from_ymd_opt(2025, 3, 15).unwrap())
    );
    assert_eq!(stored.summary.as_deref(), Some("Photographed invoice"));
}

#[tokio::test]
async fn test_override_with_abstract_concept_is_rejected() {
    let h = Harness::new(None).await;
    let resource = h
        .stored_resource("note.txt", "text/plain", b"hello")
        .await;
    let err = h
        .lifecycle()
        .reprocess(resource.id, Some("Document".to_string()), &NoProgress)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)), "{}", err);
    // Rejected before the reset.
    assert_eq!(h.resource(resource.id).await.status, ResourceStatus::Pending);
}

#[tokio::test]
async fn test_abstract_submission_is_refused_to_the_model() {
    let llm = MockLlmClient::new()
        .with_tool_call(
            "submit_document",
            json!({"concept_id": "Document", "confidence": 0.9}),
        )
        .with_tool_call(
            "submit_document",
            json!({"concept_id": "Letter", "confidence": 0.6}),
        );
    let h = Harness::new(Some(llm.clone())).await;
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;

    h.pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap();

    let responses = llm.tool_responses();
    assert!(responses[0]["error"]
        .as_str()
        .unwrap()
        .contains("abstract"));
    assert_eq!(responses[1]["document_index"], 1);
    let stored = h.resource(root.id).await;
    assert_eq!(
        stored.classification.unwrap().primary_concept_id,
        "Letter"
    );
    assert_eq!(h.resources.len(), 1);
}

/// Resource store that refuses to insert split sub-documents.
struct RejectChildInserts(Arc<MemoryResourceRepository>);

#[async_trait]
impl ResourceRepository for RejectChildInserts {
    async fn insert(&self, resource: &Resource) -> Result<()> {
        if resource.origin_file_id.is_some() {
            return Err(Error::Internal("disk full".into()));
        }
        self.0.insert(resource).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>> {
        self.0.get(id).await
    }

    async fn update(&self, resource: &Resource) -> Result<()> {
        self.0.update(resource).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        self.0.delete(id).await
    }

    async fn list_by_origin(&self, origin_file_id: Uuid) -> Result<Vec<Resource>> {
        self.0.list_by_origin(origin_file_id).await
    }

    async fn count_by_stored_path(&self, stored_path: &str) -> Result<i64> {
        self.0.count_by_stored_path(stored_path).await
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Resource>> {
        self.0.list(limit, offset).await
    }
}

#[tokio::test]
async fn test_failed_persist_marks_resource_error() {
    let h = Harness::new(None).await;
    let pipeline = h.pipeline_over(
        Arc::new(RejectChildInserts(h.resources.clone())),
        Some(splitting_llm()),
    );
    let root = h
        .stored_resource("scan.pdf", "application/pdf", PDF_BYTES)
        .await;

    let err = pipeline
        .process(root.id, ProcessOptions::default(), &NoProgress)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("disk full"));

    let stored = h.resource(root.id).await;
    assert_eq!(stored.status, ResourceStatus::Error);
    assert!(stored.error_message.unwrap().contains("disk full"));
    assert!(h.resources.list_by_origin(root.id).await.unwrap().is_empty());
}
