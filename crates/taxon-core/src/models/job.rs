//! Processing jobs for the background queue.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::uuid_utils::new_v7;

/// Job status. Transitions only move forward, except for an explicit restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Only finished jobs may be restarted.
    pub fn is_restartable(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::InvalidInput(format!("unknown job status '{}'", other))),
        }
    }
}

/// Kind of input a job processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    File,
    Url,
    Text,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::File => "file",
            ResourceType::Url => "url",
            ResourceType::Text => "text",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(ResourceType::File),
            "url" => Ok(ResourceType::Url),
            "text" => Ok(ResourceType::Text),
            other => Err(Error::InvalidInput(format!(
                "unknown resource type '{}'",
                other
            ))),
        }
    }
}

/// A unit of background work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingJob {
    pub id: Uuid,
    pub data_source_id: Uuid,
    /// File path, URL, or text resource id, depending on `resource_type`.
    pub resource_identifier: String,
    pub resource_type: ResourceType,
    pub status: JobStatus,
    pub progress_message: Option<String>,
    /// Resource produced by the job.
    pub result_file_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ProcessingJob {
    pub fn new(
        data_source_id: Uuid,
        resource_identifier: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            id: new_v7(),
            data_source_id,
            resource_identifier: resource_identifier.into(),
            resource_type,
            status: JobStatus::Queued,
            progress_message: None,
            result_file_id: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Reset to `Queued`, clearing the prior result, error, and timestamps.
    pub fn requeue(&mut self) {
        self.status = JobStatus::Queued;
        self.progress_message = None;
        self.result_file_id = None;
        self.error_message = None;
        self.started_at = None;
        self.completed_at = None;
    }
}

/// Job counts by status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queued: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueStats {
    pub fn total(&self) -> i64 {
        self.queued + self.processing + self.completed + self.failed
    }
}
