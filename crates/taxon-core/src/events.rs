//! Job status events and the subscriber fan-out bus.
//!
//! Every job state transition is published as a [`JobStatusEvent`] wrapped in
//! an [`EventEnvelope`]. Each subscriber owns a bounded queue; a subscriber
//! whose queue is full (or whose receiver was dropped) is treated as
//! disconnected and removed. The publisher never waits, so delivery is
//! at-most-once per healthy subscriber.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::defaults::EVENT_QUEUE_CAPACITY;
use crate::models::{JobStatus, ProcessingJob, ResourceType};

/// Snapshot of a job at a state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusEvent {
    pub job_id: Uuid,
    pub data_source_id: Uuid,
    pub resource_identifier: String,
    pub resource_type: ResourceType,
    pub status: JobStatus,
    pub progress_message: Option<String>,
    pub result_file_id: Option<Uuid>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&ProcessingJob> for JobStatusEvent {
    fn from(job: &ProcessingJob) -> Self {
        Self {
            job_id: job.id,
            data_source_id: job.data_source_id,
            resource_identifier: job.resource_identifier.clone(),
            resource_type: job.resource_type,
            status: job.status,
            progress_message: job.progress_message.clone(),
            result_file_id: job.result_file_id,
            error_message: job.error_message.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
        }
    }
}

/// Envelope carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// UUIDv7, so envelopes sort by emission time.
    pub event_id: Uuid,
    /// Dot-namespaced type, e.g. `"job.processing"`.
    pub event_type: String,
    pub occurred_at: DateTime<Utc>,
    pub payload: JobStatusEvent,
}

impl EventEnvelope {
    pub fn new(payload: JobStatusEvent) -> Self {
        Self {
            event_id: crate::uuid_utils::new_v7(),
            event_type: format!("job.{}", payload.status.as_str()),
            occurred_at: Utc::now(),
            payload,
        }
    }
}

/// Fan-out of job status events to per-subscriber queues.
pub struct EventBus {
    capacity: usize,
    subscribers: Mutex<Vec<mpsc::Sender<EventEnvelope>>>,
}

impl EventBus {
    /// Create a bus whose subscribers each buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Register a subscriber and return its receiving end.
    pub fn subscribe(&self) -> mpsc::Receiver<EventEnvelope> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.lock().push(tx);
        rx
    }

    /// Publish an event to every healthy subscriber.
    ///
    /// Returns the number of subscribers the event was delivered to.
    pub fn publish(&self, event: JobStatusEvent) -> usize {
        let envelope = EventEnvelope::new(event);
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|tx| match tx.try_send(envelope.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    event_type = %envelope.event_type,
                    "Subscriber queue full, dropping subscriber"
                );
                false
            }
            Err(TrySendError::Closed(_)) => false,
        });
        let delivered = subscribers.len();
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            job_id = %envelope.payload.job_id,
            delivered,
            dropped = before - delivered,
            "EventBus publish"
        );
        delivered
    }

    /// Publish the current state of a job.
    pub fn publish_job(&self, job: &ProcessingJob) -> usize {
        self.publish(JobStatusEvent::from(job))
    }

    /// Number of registered subscribers (including ones not yet found dead).
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::Sender<EventEnvelope>>> {
        // Senders stay valid even if a publisher panicked mid-retain.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_QUEUE_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
