//! Job submission.
//!
//! Files and URLs are queued by identifier and read by the processor. Text is
//! stored up front as a `text/plain` resource whose id becomes the job's
//! identifier.

use std::path::Path;
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use taxon_core::{
    Error, EventBus, JobRepository, ProcessingJob, Resource, ResourceRepository, ResourceType,
    Result, StorageBackend,
};

/// Queues work for the background processor.
#[derive(Clone)]
pub struct IngestService {
    jobs: Arc<dyn JobRepository>,
    resources: Arc<dyn ResourceRepository>,
    storage: Arc<dyn StorageBackend>,
    events: Arc<EventBus>,
}

impl IngestService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        resources: Arc<dyn ResourceRepository>,
        storage: Arc<dyn StorageBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            jobs,
            resources,
            storage,
            events,
        }
    }

    async fn enqueue(&self, job: ProcessingJob) -> Result<ProcessingJob> {
        self.jobs.insert(&job).await?;
        self.events.publish_job(&job);
        info!(
            subsystem = "jobs",
            job_id = %job.id,
            resource_type = %job.resource_type,
            "Job queued"
        );
        Ok(job)
    }

    /// Queue a local file.
    pub async fn enqueue_file(
        &self,
        data_source_id: Uuid,
        path: impl AsRef<Path>,
    ) -> Result<ProcessingJob> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| Error::NotFound(format!("file {}", path.display())))?;
        if !metadata.is_file() {
            return Err(Error::InvalidInput(format!(
                "{} is not a regular file",
                path.display()
            )));
        }
        let job = ProcessingJob::new(
            data_source_id,
            path.to_string_lossy(),
            ResourceType::File,
        );
        self.enqueue(job).await
    }

    /// Queue a web page for capture.
    pub async fn enqueue_url(&self, data_source_id: Uuid, url: &str) -> Result<ProcessingJob> {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::InvalidInput(format!(
                "URL must start with http:// or https://, got '{}'",
                url
            )));
        }
        self.enqueue(ProcessingJob::new(data_source_id, url, ResourceType::Url))
            .await
    }

    /// Store text as a pending resource and queue it.
    pub async fn submit_text(
        &self,
        data_source_id: Uuid,
        title: &str,
        content: &str,
    ) -> Result<ProcessingJob> {
        if content.trim().is_empty() {
            return Err(Error::InvalidInput("text content is empty".into()));
        }
        let title = title.trim();
        let filename = if title.is_empty() {
            "untitled.txt".to_string()
        } else {
            format!("{}.txt", title)
        };

        let stored_path = self.storage.store(content.as_bytes(), &filename).await?;
        let resource = Resource::new(filename, "text/plain", stored_path)
            .with_data_source(Some(data_source_id));
        self.resources.insert(&resource).await?;

        let job = ProcessingJob::new(data_source_id, resource.id.to_string(), ResourceType::Text);
        self.enqueue(job).await
    }
}
