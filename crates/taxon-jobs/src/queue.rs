//! Job queries and restart.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use taxon_core::defaults::JOB_LIST_LIMIT;
use taxon_core::{
    Error, EventBus, JobRepository, JobStatus, ProcessingJob, QueueStats, ResourceType, Result,
};

use crate::lifecycle::ResourceLifecycle;

/// Read and restart access to processing jobs.
#[derive(Clone)]
pub struct JobQueue {
    jobs: Arc<dyn JobRepository>,
    lifecycle: ResourceLifecycle,
    events: Arc<EventBus>,
}

impl JobQueue {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        lifecycle: ResourceLifecycle,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            jobs,
            lifecycle,
            events,
        }
    }

    pub async fn get_job(&self, id: Uuid) -> Result<ProcessingJob> {
        self.jobs
            .get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))
    }

    /// Newest first, optionally filtered by status.
    pub async fn list_jobs(
        &self,
        status: Option<JobStatus>,
        limit: Option<i64>,
    ) -> Result<Vec<ProcessingJob>> {
        let limit = limit.unwrap_or(JOB_LIST_LIMIT).max(1);
        self.jobs.list(status, limit).await
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        self.jobs.queue_stats().await
    }

    /// Requeue a completed or failed job, discarding its previous result.
    ///
    /// Text jobs keep their input resource: it is reset to `PENDING` and its
    /// split children are removed. File and URL jobs delete the whole result
    /// group, since the rerun stores and creates it again.
    pub async fn restart_job(&self, id: Uuid) -> Result<ProcessingJob> {
        let job = self.get_job(id).await?;
        if !job.status.is_restartable() {
            return Err(Error::InvalidInput(format!(
                "job {} is {} and cannot be restarted",
                id,
                job.status.as_str()
            )));
        }

        let cleared = match job.resource_type {
            ResourceType::Text => match job.resource_identifier.parse::<Uuid>() {
                Ok(resource_id) => self.lifecycle.reset(resource_id).await.map(|_| ()),
                Err(_) => Ok(()),
            },
            ResourceType::File | ResourceType::Url => match job.result_file_id {
                Some(result_id) => self.lifecycle.delete_resource(result_id).await.map(|_| ()),
                None => Ok(()),
            },
        };
        match cleared {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                debug!(job_id = %id, "Previous result already gone");
            }
            Err(e) => return Err(e),
        }

        let job = self.jobs.requeue(id).await?;
        self.events.publish_job(&job);
        info!(subsystem = "jobs", job_id = %id, "Job restarted");
        Ok(job)
    }
}
