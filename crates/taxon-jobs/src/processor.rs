//! Background job processor.
//!
//! One polling task per process. Each cycle fetches up to `batch_size` queued
//! jobs oldest-first and runs them one after another. Job failures are
//! recorded on the job together with any resource the run left behind, so a
//! restart can remove it; loop errors are logged and the next cycle proceeds.
//!
//! Claiming takes no lock: two processors sharing a job table may run the
//! same job twice.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use taxon_core::defaults::{
    ENV_BATCH_SIZE, ENV_POLL_INTERVAL_MS, ENV_PROCESSOR_ENABLED, JOB_BATCH_SIZE,
    JOB_ERROR_MAX_CHARS, JOB_POLL_INTERVAL_MS,
};
use taxon_core::{Error, EventBus, JobRepository, ProcessingJob, Result};

use crate::handler::JobDispatcher;
use crate::pipeline::ProgressSink;

/// Configuration for the job processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorConfig {
    /// Delay between polling cycles in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum jobs fetched per cycle.
    pub batch_size: i64,
    /// Whether the loop runs at all.
    pub enabled: bool,
    /// Longest error message stored on a failed job.
    pub error_max_chars: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: JOB_POLL_INTERVAL_MS,
            batch_size: JOB_BATCH_SIZE,
            enabled: true,
            error_max_chars: JOB_ERROR_MAX_CHARS,
        }
    }
}

impl ProcessorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `TAXON_PROCESSOR_ENABLED` | `true` | Enable/disable job processing |
    /// | `TAXON_POLL_INTERVAL_MS` | `5000` | Delay between polling cycles |
    /// | `TAXON_BATCH_SIZE` | `5` | Jobs fetched per cycle |
    pub fn from_env() -> Self {
        let enabled = std::env::var(ENV_PROCESSOR_ENABLED)
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var(ENV_POLL_INTERVAL_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(JOB_POLL_INTERVAL_MS);

        let batch_size = std::env::var(ENV_BATCH_SIZE)
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(JOB_BATCH_SIZE)
            .max(1);

        Self {
            poll_interval_ms,
            batch_size,
            enabled,
            error_max_chars: JOB_ERROR_MAX_CHARS,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_batch_size(mut self, size: i64) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Cut an error message to at most `max_chars` characters.
pub fn truncate_error(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}

/// Handle for controlling a running processor.
pub struct ProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl ProcessorHandle {
    /// Stop the loop after the current cycle and wait for it to exit.
    pub async fn shutdown(self) -> Result<()> {
        if self.shutdown_tx.send(()).await.is_err() {
            // Disabled processors exit immediately and drop the receiver.
            debug!("Processor loop already stopped");
        }
        self.join
            .await
            .map_err(|e| Error::Internal(format!("Processor task failed: {}", e)))
    }
}

/// Persists and broadcasts pipeline progress for one job.
struct JobProgress {
    job_id: Uuid,
    jobs: Arc<dyn JobRepository>,
    events: Arc<EventBus>,
}

#[async_trait]
impl ProgressSink for JobProgress {
    async fn report(&self, message: &str) {
        if let Err(e) = self.jobs.update_progress(self.job_id, message).await {
            warn!(job_id = %self.job_id, error = %e, "Failed to record job progress");
            return;
        }
        match self.jobs.get(self.job_id).await {
            Ok(Some(job)) => {
                self.events.publish_job(&job);
            }
            Ok(None) => {}
            Err(e) => warn!(job_id = %self.job_id, error = %e, "Failed to reload job"),
        }
    }
}

/// Polls the job table and runs queued jobs.
pub struct JobProcessor {
    config: ProcessorConfig,
    jobs: Arc<dyn JobRepository>,
    dispatcher: Arc<JobDispatcher>,
    events: Arc<EventBus>,
}

impl JobProcessor {
    pub fn new(
        config: ProcessorConfig,
        jobs: Arc<dyn JobRepository>,
        dispatcher: Arc<JobDispatcher>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            jobs,
            dispatcher,
            events,
        }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Spawn the polling loop.
    pub fn start(self) -> ProcessorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let join = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });
        ProcessorHandle { shutdown_tx, join }
    }

    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "processor"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job processor is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            batch_size = self.config.batch_size,
            "WorkerStarted"
        );
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job processor received shutdown signal");
                break;
            }

            if let Err(e) = self.run_once().await {
                error!(error = %e, "Job polling cycle failed");
            }

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Job processor received shutdown signal");
                    break;
                }
                _ = sleep(poll_interval) => {}
            }
        }

        info!("WorkerStopped");
    }

    /// Run one polling cycle. Returns the number of jobs handled.
    pub async fn run_once(&self) -> Result<usize> {
        let batch = self.jobs.fetch_queued(self.config.batch_size).await?;
        if batch.is_empty() {
            return Ok(0);
        }
        debug!(count = batch.len(), "Processing job batch");
        let count = batch.len();
        for job in batch {
            self.process_job(job).await;
        }
        Ok(count)
    }

    async fn process_job(&self, job: ProcessingJob) {
        let start = Instant::now();
        let job_id = job.id;

        let job = match self.jobs.mark_processing(job_id).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, %job_id, "Failed to mark job as processing");
                return;
            }
        };
        self.events.publish_job(&job);
        info!(%job_id, resource_type = %job.resource_type, "Processing job");

        let progress = JobProgress {
            job_id,
            jobs: self.jobs.clone(),
            events: self.events.clone(),
        };

        let finished = match self.dispatcher.execute(&job, &progress).await {
            Ok(resource_id) => match self.jobs.complete(job_id, resource_id).await {
                Ok(job) => {
                    info!(
                        %job_id,
                        resource_id = %resource_id,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed successfully"
                    );
                    Some(job)
                }
                Err(e) => {
                    error!(error = %e, %job_id, "Failed to mark job as completed");
                    None
                }
            },
            Err(failure) => {
                let message =
                    truncate_error(&failure.error.to_string(), self.config.error_max_chars);
                match self.jobs.fail(job_id, &message, failure.resource_id).await {
                    Ok(job) => {
                        warn!(
                            %job_id,
                            error = %message,
                            resource_id = ?failure.resource_id,
                            duration_ms = start.elapsed().as_millis() as u64,
                            "Job failed"
                        );
                        Some(job)
                    }
                    Err(e) => {
                        error!(error = %e, %job_id, "Failed to mark job as failed");
                        None
                    }
                }
            }
        };

        if let Some(job) = finished {
            self.events.publish_job(&job);
        }
    }
}
