//! PostgreSQL repository tests.
//!
//! Run with `cargo test -p taxon-db -- --ignored` against a database reachable
//! through `DATABASE_URL`.

use taxon_db::test_fixtures::connect_test_database;
use taxon_db::{
    Classification, Concept, JobRepository, JobStatus, OntologyRepository, PageRange,
    ProcessingJob, Resource, ResourceRepository, ResourceStatus, ResourceType,
};
use uuid::Uuid;

async fn database() -> taxon_db::Database {
    dotenvy::dotenv().ok();
    connect_test_database().await.expect("connect")
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_job_lifecycle_roundtrip() {
    let db = database().await;
    let job = ProcessingJob::new(Uuid::now_v7(), "https://example.com", ResourceType::Url);
    db.jobs.insert(&job).await.expect("insert");

    let running = db.jobs.mark_processing(job.id).await.expect("mark");
    assert_eq!(running.status, JobStatus::Processing);

    let failed = db.jobs.fail(job.id, "boom", None).await.expect("fail");
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("boom"));

    let requeued = db.jobs.requeue(job.id).await.expect("requeue");
    assert_eq!(requeued.status, JobStatus::Queued);
    assert!(requeued.error_message.is_none());
    assert!(requeued.completed_at.is_none());
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_resource_update_persists_json_columns() {
    let db = database().await;
    let root = Resource::new("bundle.pdf", "application/pdf", format!("test/{}", Uuid::now_v7()))
        .with_source_path("/inbox/invoices/bundle.pdf");
    db.resources.insert(&root).await.expect("insert root");

    let mut child = root.child(Some(PageRange::new(2, 3)));
    child.status = ResourceStatus::Done;
    child.classification = Some(Classification::unknown());
    db.resources.insert(&child).await.expect("insert child");

    let loaded = db.resources.get(child.id).await.expect("get").expect("exists");
    assert_eq!(loaded.page_range, Some(PageRange::new(2, 3)));
    assert_eq!(loaded.origin_file_id, Some(root.id));
    assert_eq!(loaded.source_path.as_deref(), Some("/inbox/invoices/bundle.pdf"));
    assert!(loaded.classification.expect("classification").is_unknown());

    assert_eq!(
        db.resources
            .count_by_stored_path(&root.stored_path)
            .await
            .expect("count"),
        2
    );

    db.resources.delete(child.id).await.expect("delete child");
    db.resources.delete(root.id).await.expect("delete root");
}

#[tokio::test]
#[ignore = "requires PostgreSQL"]
async fn test_concept_children_block_parent_delete_count() {
    let db = database().await;
    let parent_id = format!("TestParent{}", Uuid::now_v7().simple());
    let child_id = format!("TestChild{}", Uuid::now_v7().simple());

    db.ontology
        .insert_concept(&Concept::new(&parent_id))
        .await
        .expect("insert parent");
    db.ontology
        .insert_concept(&Concept::new(&child_id).inheriting(&parent_id))
        .await
        .expect("insert child");

    assert_eq!(db.ontology.count_children(&parent_id).await.expect("count"), 1);

    db.ontology.delete_concept(&child_id).await.expect("delete child");
    db.ontology.delete_concept(&parent_id).await.expect("delete parent");
    assert!(db
        .ontology
        .get_concept(&parent_id)
        .await
        .expect("get")
        .is_none());
}
