//! Processing job repository implementation.
//!
//! Claiming is a plain read: `fetch_queued` runs in its own short transaction
//! that commits before any job is processed, and takes no row locks. Running
//! two processors against one table can process a job twice.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use taxon_core::{Error, JobRepository, JobStatus, ProcessingJob, QueueStats, Result};

const JOB_COLUMNS: &str = "id, data_source_id, resource_identifier, resource_type, status, \
     progress_message, result_file_id, error_message, created_at, started_at, completed_at";

/// PostgreSQL implementation of JobRepository.
pub struct PgJobRepository {
    pool: Pool<Postgres>,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_job_row(row: &PgRow) -> Result<ProcessingJob> {
        let resource_type: String = row.get("resource_type");
        let status: String = row.get("status");
        Ok(ProcessingJob {
            id: row.get("id"),
            data_source_id: row.get("data_source_id"),
            resource_identifier: row.get("resource_identifier"),
            resource_type: resource_type.parse()?,
            status: status.parse()?,
            progress_message: row.get("progress_message"),
            result_file_id: row.get("result_file_id"),
            error_message: row.get("error_message"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }

    /// Run an UPDATE … RETURNING and map a missing row to `NotFound`.
    async fn update_returning(
        &self,
        id: Uuid,
        query: sqlx::query::Query<'_, Postgres, PgArguments>,
    ) -> Result<ProcessingJob> {
        let row = query
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("job {}", id)))?;
        Self::parse_job_row(&row)
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn insert(&self, job: &ProcessingJob) -> Result<()> {
        sqlx::query(
            "INSERT INTO processing_job (id, data_source_id, resource_identifier, resource_type,
                                         status, progress_message, result_file_id, error_message,
                                         created_at, started_at, completed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(job.id)
        .bind(job.data_source_id)
        .bind(&job.resource_identifier)
        .bind(job.resource_type.as_str())
        .bind(job.status.as_str())
        .bind(&job.progress_message)
        .bind(job.result_file_id)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ProcessingJob>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM processing_job WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_job_row).transpose()
    }

    async fn fetch_queued(&self, limit: i64) -> Result<Vec<ProcessingJob>> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {} FROM processing_job
             WHERE status = 'queued'
             ORDER BY created_at ASC, id ASC
             LIMIT $1",
            JOB_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        rows.iter().map(Self::parse_job_row).collect()
    }

    async fn mark_processing(&self, id: Uuid) -> Result<ProcessingJob> {
        let sql = format!(
            "UPDATE processing_job
             SET status = 'processing', started_at = $2, progress_message = NULL
             WHERE id = $1
             RETURNING {}",
            JOB_COLUMNS
        );
        self.update_returning(id, sqlx::query(&sql).bind(id).bind(Utc::now()))
            .await
    }

    async fn update_progress(&self, id: Uuid, message: &str) -> Result<()> {
        sqlx::query("UPDATE processing_job SET progress_message = $2 WHERE id = $1")
            .bind(id)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(&self, id: Uuid, result_file_id: Uuid) -> Result<ProcessingJob> {
        let sql = format!(
            "UPDATE processing_job
             SET status = 'completed', result_file_id = $2, error_message = NULL,
                 completed_at = $3
             WHERE id = $1
             RETURNING {}",
            JOB_COLUMNS
        );
        self.update_returning(
            id,
            sqlx::query(&sql).bind(id).bind(result_file_id).bind(Utc::now()),
        )
        .await
    }

    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        result_file_id: Option<Uuid>,
    ) -> Result<ProcessingJob> {
        let sql = format!(
            "UPDATE processing_job
             SET status = 'failed', error_message = $2, result_file_id = $3,
                 completed_at = $4
             WHERE id = $1
             RETURNING {}",
            JOB_COLUMNS
        );
        self.update_returning(
            id,
            sqlx::query(&sql)
                .bind(id)
                .bind(error)
                .bind(result_file_id)
                .bind(Utc::now()),
        )
        .await
    }

    async fn requeue(&self, id: Uuid) -> Result<ProcessingJob> {
        let sql = format!(
            "UPDATE processing_job
             SET status = 'queued', progress_message = NULL, result_file_id = NULL,
                 error_message = NULL, started_at = NULL, completed_at = NULL
             WHERE id = $1
             RETURNING {}",
            JOB_COLUMNS
        );
        self.update_returning(id, sqlx::query(&sql).bind(id)).await
    }

    async fn list(&self, status: Option<JobStatus>, limit: i64) -> Result<Vec<ProcessingJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM processing_job
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC
             LIMIT $2",
            JOB_COLUMNS
        ))
        .bind(status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_job_row).collect()
    }

    async fn queue_stats(&self) -> Result<QueueStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) FILTER (WHERE status = 'queued') AS queued,
                COUNT(*) FILTER (WHERE status = 'processing') AS processing,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed
             FROM processing_job",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(QueueStats {
            queued: row.get::<i64, _>("queued"),
            processing: row.get::<i64, _>("processing"),
            completed: row.get::<i64, _>("completed"),
            failed: row.get::<i64, _>("failed"),
        })
    }
}
