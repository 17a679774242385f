//! Per-job dispatch by resource type.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use taxon_core::{Error, ProcessingJob, Resource, ResourceType, ScreenshotCapture};

use crate::mime::{detect_content_type, extension_for};
use crate::pipeline::{ProcessOptions, ProcessingPipeline, ProgressSink};

/// User-facing message for an LLM credential rejection on URL jobs.
pub fn auth_failure_message(status: Option<u16>) -> String {
    let status = status.map_or_else(|| "auth".to_string(), |s| s.to_string());
    format!(
        "LLM provider rejected the request (HTTP {}); check LLM_API_KEY",
        status
    )
}

/// A failed job run.
#[derive(Debug)]
pub struct JobFailure {
    pub error: Error,
    /// Resource the run created or processed before failing, if any.
    pub resource_id: Option<Uuid>,
}

impl JobFailure {
    fn at(resource_id: Uuid) -> impl FnOnce(Error) -> Self {
        move |error| Self {
            error,
            resource_id: Some(resource_id),
        }
    }
}

impl From<Error> for JobFailure {
    fn from(error: Error) -> Self {
        Self {
            error,
            resource_id: None,
        }
    }
}

/// Result of running one job.
pub type JobResult = std::result::Result<Uuid, JobFailure>;

/// Runs one job against the pipeline and returns the resulting resource id.
pub struct JobDispatcher {
    pipeline: Arc<ProcessingPipeline>,
    screenshot: Option<Arc<dyn ScreenshotCapture>>,
}

impl JobDispatcher {
    pub fn new(pipeline: Arc<ProcessingPipeline>) -> Self {
        Self {
            pipeline,
            screenshot: None,
        }
    }

    pub fn with_screenshot(mut self, capture: Arc<dyn ScreenshotCapture>) -> Self {
        self.screenshot = Some(capture);
        self
    }

    pub fn pipeline(&self) -> &Arc<ProcessingPipeline> {
        &self.pipeline
    }

    pub async fn execute(&self, job: &ProcessingJob, progress: &dyn ProgressSink) -> JobResult {
        match job.resource_type {
            ResourceType::File => self.execute_file(job, progress).await,
            ResourceType::Text => self.execute_text(job, progress).await,
            ResourceType::Url => self.execute_url(job, progress).await,
        }
    }

    async fn execute_file(&self, job: &ProcessingJob, progress: &dyn ProgressSink) -> JobResult {
        let path = Path::new(&job.resource_identifier);
        let data = tokio::fs::read(path).await.map_err(Error::from)?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let mime_type = detect_content_type(&filename, &data);
        debug!(job_id = %job.id, filename = %filename, mime_type = %mime_type, "Storing upload");

        let stored_path = self.pipeline.storage().store(&data, &filename).await?;
        let resource = Resource::new(filename, mime_type, stored_path)
            .with_data_source(Some(job.data_source_id))
            .with_source_path(job.resource_identifier.as_str());
        self.pipeline.resources().insert(&resource).await?;

        let outcome = self
            .pipeline
            .process(resource.id, ProcessOptions::default(), progress)
            .await
            .map_err(JobFailure::at(resource.id))?;
        Ok(outcome.root.id)
    }

    async fn execute_text(&self, job: &ProcessingJob, progress: &dyn ProgressSink) -> JobResult {
        let resource_id: Uuid = job.resource_identifier.parse().map_err(|_| {
            Error::InvalidInput(format!(
                "text job identifier '{}' is not a resource id",
                job.resource_identifier
            ))
        })?;
        let outcome = self
            .pipeline
            .process(resource_id, ProcessOptions::default(), progress)
            .await
            .map_err(JobFailure::at(resource_id))?;
        Ok(outcome.root.id)
    }

    async fn execute_url(&self, job: &ProcessingJob, progress: &dyn ProgressSink) -> JobResult {
        let capture = self
            .screenshot
            .as_ref()
            .ok_or_else(|| Error::Config("no screenshot capture configured for URL jobs".into()))?;
        let url = job.resource_identifier.as_str();

        progress.report("Capturing page").await;
        let page = capture.capture(url).await?;
        let title = page.title.trim();
        let base = if title.is_empty() { "page" } else { title };
        let filename = format!("{}.{}", base, extension_for(&page.mime_type));

        let stored_path = self.pipeline.storage().store(&page.image, &filename).await?;
        let resource = Resource::new(filename, page.mime_type.clone(), stored_path)
            .with_data_source(Some(job.data_source_id))
            .with_source_url(url);
        self.pipeline.resources().insert(&resource).await?;
        info!(job_id = %job.id, url, resource_id = %resource.id, "Page captured");

        let outcome = self
            .pipeline
            .process_capture(resource.id, url, progress)
            .await
            .map_err(|e| match e {
                Error::Provider {
                    provider,
                    status: status @ (Some(401) | Some(403)),
                    ..
                } => Error::Provider {
                    provider,
                    status,
                    message: auth_failure_message(status),
                },
                other => other,
            })
            .map_err(JobFailure::at(resource.id))?;
        Ok(outcome.root.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_failure_message_names_status_and_key() {
        let msg = auth_failure_message(Some(401));
        assert!(msg.contains("401"));
        assert!(msg.contains("LLM_API_KEY"));
    }
}
