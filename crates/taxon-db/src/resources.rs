//! Resource repository implementation.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use taxon_core::{
    Classification, Error, ExtraField, Metadata, PageRange, ProcessingTimings, Resource,
    ResourceRepository, Result,
};

const RESOURCE_COLUMNS: &str = "id, data_source_id, filename, mime_type, stored_path, \
     source_path, source_url, status, \
     classification, metadata, extra_fields, summary, extracted_text, language, timings, \
     error_message, origin_file_id, page_range, created_at, updated_at, processed_at";

/// PostgreSQL implementation of ResourceRepository.
pub struct PgResourceRepository {
    pool: Pool<Postgres>,
}

impl PgResourceRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_resource_row(row: &PgRow) -> Result<Resource> {
        let status: String = row.get("status");
        let page_range: Option<String> = row.get("page_range");

        Ok(Resource {
            id: row.get("id"),
            data_source_id: row.get("data_source_id"),
            filename: row.get("filename"),
            mime_type: row.get("mime_type"),
            stored_path: row.get("stored_path"),
            source_path: row.get("source_path"),
            source_url: row.get("source_url"),
            status: status.parse()?,
            classification: row
                .get::<Option<Json<Classification>>, _>("classification")
                .map(|j| j.0),
            metadata: row.get::<Json<Metadata>, _>("metadata").0,
            extra_fields: row.get::<Json<Vec<ExtraField>>, _>("extra_fields").0,
            summary: row.get("summary"),
            extracted_text: row.get("extracted_text"),
            language: row.get("language"),
            timings: row.get::<Json<ProcessingTimings>, _>("timings").0,
            error_message: row.get("error_message"),
            origin_file_id: row.get("origin_file_id"),
            page_range: page_range
                .as_deref()
                .map(str::parse::<PageRange>)
                .transpose()?,
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            processed_at: row.get("processed_at"),
        })
    }
}

#[async_trait]
impl ResourceRepository for PgResourceRepository {
    async fn insert(&self, resource: &Resource) -> Result<()> {
        sqlx::query(
            "INSERT INTO resource (id, data_source_id, filename, mime_type, stored_path,
                                   source_path, source_url, status, classification, metadata,
                                   extra_fields, summary, extracted_text, language, timings,
                                   error_message, origin_file_id, page_range, created_at,
                                   updated_at, processed_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                     $17, $18, $19, $20, $21)",
        )
        .bind(resource.id)
        .bind(resource.data_source_id)
        .bind(&resource.filename)
        .bind(&resource.mime_type)
        .bind(&resource.stored_path)
        .bind(&resource.source_path)
        .bind(&resource.source_url)
        .bind(resource.status.as_str())
        .bind(resource.classification.as_ref().map(Json))
        .bind(Json(&resource.metadata))
        .bind(Json(&resource.extra_fields))
        .bind(&resource.summary)
        .bind(&resource.extracted_text)
        .bind(&resource.language)
        .bind(Json(&resource.timings))
        .bind(&resource.error_message)
        .bind(resource.origin_file_id)
        .bind(resource.page_range.map(|r| r.to_string()))
        .bind(resource.created_at)
        .bind(resource.updated_at)
        .bind(resource.processed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Resource>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM resource WHERE id = $1",
            RESOURCE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(Self::parse_resource_row).transpose()
    }

    async fn update(&self, resource: &Resource) -> Result<()> {
        let result = sqlx::query(
            "UPDATE resource
             SET data_source_id = $2, filename = $3, mime_type = $4, stored_path = $5,
                 source_path = $6, source_url = $7, status = $8, classification = $9,
                 metadata = $10, extra_fields = $11, summary = $12, extracted_text = $13,
                 language = $14, timings = $15, error_message = $16, origin_file_id = $17,
                 page_range = $18, updated_at = $19, processed_at = $20
             WHERE id = $1",
        )
        .bind(resource.id)
        .bind(resource.data_source_id)
        .bind(&resource.filename)
        .bind(&resource.mime_type)
        .bind(&resource.stored_path)
        .bind(&resource.source_path)
        .bind(&resource.source_url)
        .bind(resource.status.as_str())
        .bind(resource.classification.as_ref().map(Json))
        .bind(Json(&resource.metadata))
        .bind(Json(&resource.extra_fields))
        .bind(&resource.summary)
        .bind(&resource.extracted_text)
        .bind(&resource.language)
        .bind(Json(&resource.timings))
        .bind(&resource.error_message)
        .bind(resource.origin_file_id)
        .bind(resource.page_range.map(|r| r.to_string()))
        .bind(resource.updated_at)
        .bind(resource.processed_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("resource {}", resource.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM resource WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_by_origin(&self, origin_file_id: Uuid) -> Result<Vec<Resource>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM resource WHERE origin_file_id = $1 ORDER BY created_at ASC, id ASC",
            RESOURCE_COLUMNS
        ))
        .bind(origin_file_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_resource_row).collect()
    }

    async fn count_by_stored_path(&self, stored_path: &str) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM resource WHERE stored_path = $1")
            .bind(stored_path)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count.0)
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Resource>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM resource ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            RESOURCE_COLUMNS
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        rows.iter().map(Self::parse_resource_row).collect()
    }
}
