//! Core traits for taxon abstractions.
//!
//! These traits define the ports that concrete implementations must satisfy:
//! repositories (the sole persistence boundary) and the external collaborators
//! the pipeline consults (text extraction, LLM, screenshots, storage, indexing).

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;
use crate::tools::{ToolHandler, ToolLoopReport};

// =============================================================================
// REPOSITORY TRAITS
// =============================================================================

/// Repository for concepts, mixins, and embedded types.
#[async_trait]
pub trait OntologyRepository: Send + Sync {
    /// List every concept.
    async fn list_concepts(&self) -> Result<Vec<Concept>>;

    /// Get a concept by id.
    async fn get_concept(&self, id: &str) -> Result<Option<Concept>>;

    /// Insert a new concept. Uniqueness is validated by the caller.
    async fn insert_concept(&self, concept: &Concept) -> Result<()>;

    /// Replace an existing concept.
    async fn update_concept(&self, concept: &Concept) -> Result<()>;

    /// Delete a concept by id.
    async fn delete_concept(&self, id: &str) -> Result<()>;

    /// Number of concepts whose `inherits` is `id`.
    async fn count_children(&self, id: &str) -> Result<i64>;

    /// List every mixin.
    async fn list_mixins(&self) -> Result<Vec<Mixin>>;

    /// Insert or replace a mixin.
    async fn upsert_mixin(&self, mixin: &Mixin) -> Result<()>;

    /// List every embedded type.
    async fn list_embedded_types(&self) -> Result<Vec<EmbeddedType>>;

    /// Insert or replace an embedded type.
    async fn upsert_embedded_type(&self, embedded_type: &EmbeddedType) -> Result<()>;
}

/// Repository for processed documents.
#[async_trait]
pub trait ResourceRepository: Send + Sync {
    /// Insert a new resource.
    async fn insert(&self, resource: &Resource) -> Result<()>;

    /// Get a resource by id.
    async fn get(&self, id: Uuid) -> Result<Option<Resource>>;

    /// Persist every field of an existing resource.
    async fn update(&self, resource: &Resource) -> Result<()>;

    /// Delete a resource. Returns false when it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool>;

    /// Sub-documents split from the given root.
    async fn list_by_origin(&self, origin_file_id: Uuid) -> Result<Vec<Resource>>;

    /// Number of resources referencing a stored file.
    async fn count_by_stored_path(&self, stored_path: &str) -> Result<i64>;

    /// List resources, newest first.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Resource>>;
}

/// Repository for the processing job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert a new job.
    async fn insert(&self, job: &ProcessingJob) -> Result<()>;

    /// Get a job by id.
    async fn get(&self, id: Uuid) -> Result<Option<ProcessingJob>>;

    /// Fetch up to `limit` queued jobs, oldest first, inside one short-lived
    /// transaction that commits before any of them is processed.
    async fn fetch_queued(&self, limit: i64) -> Result<Vec<ProcessingJob>>;

    /// Mark a job as processing and stamp `started_at`.
    async fn mark_processing(&self, id: Uuid) -> Result<ProcessingJob>;

    /// Record a progress message.
    async fn update_progress(&self, id: Uuid, message: &str) -> Result<()>;

    /// Mark a job as completed with the resource it produced.
    async fn complete(&self, id: Uuid, result_file_id: Uuid) -> Result<ProcessingJob>;

    /// Mark a job as failed, keeping the resource it created before failing
    /// so a restart can remove it.
    async fn fail(
        &self,
        id: Uuid,
        error: &str,
        result_file_id: Option<Uuid>,
    ) -> Result<ProcessingJob>;

    /// Reset a job to queued, clearing result, error, and timestamps.
    async fn requeue(&self, id: Uuid) -> Result<ProcessingJob>;

    /// List jobs, newest first, optionally filtered by status.
    async fn list(&self, status: Option<JobStatus>, limit: i64) -> Result<Vec<ProcessingJob>>;

    /// Job counts by status.
    async fn queue_stats(&self) -> Result<QueueStats>;
}

// =============================================================================
// COLLABORATOR TRAITS
// =============================================================================

/// Turns stored files into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Whether this extractor handles the MIME type.
    fn can_extract(&self, mime_type: &str) -> bool;

    /// Extract text from a local file.
    async fn extract_text(&self, path: &std::path::Path, mime_type: &str) -> Result<String>;
}

/// Byte storage for uploaded and captured files.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store bytes and return the stored path (relative to the backend root).
    async fn store(&self, data: &[u8], filename: &str) -> Result<String>;

    /// Read a stored file.
    async fn read(&self, stored_path: &str) -> Result<Vec<u8>>;

    /// Local filesystem location of a stored path.
    fn local_path(&self, stored_path: &str) -> PathBuf;

    /// Delete a stored file. Returns false when it was already gone.
    async fn delete(&self, stored_path: &str) -> Result<bool>;
}

/// A captured web page.
#[derive(Debug, Clone)]
pub struct PageCapture {
    pub title: String,
    pub image: Vec<u8>,
    pub mime_type: String,
}

/// Black-box browser capture: load a page, return its title and a screenshot.
#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    async fn capture(&self, url: &str) -> Result<PageCapture>;
}

/// Vector-indexing side effect run after extraction.
#[async_trait]
pub trait EmbeddingIndexer: Send + Sync {
    async fn index_resource(&self, resource: &Resource) -> Result<()>;
}

// =============================================================================
// LLM TRAITS
// =============================================================================

/// Compact concept description handed to the model (no field templates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCatalogueEntry {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<String>,
}

/// One field of an extraction template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl From<&PropertyDef> for TemplateField {
    fn from(prop: &PropertyDef) -> Self {
        Self {
            name: prop.name.clone(),
            field_type: prop.property_type.clone(),
            required: prop.required,
            description: prop.description.clone(),
        }
    }
}

/// The model's classification verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmClassification {
    pub concept_id: String,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// The model's raw extraction output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmExtraction {
    #[serde(default)]
    pub properties: serde_json::Map<String, JsonValue>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// LLM provider used for classification, extraction, and tool-calling rounds.
///
/// Tool-calling rounds forward every tool call to the supplied [`ToolHandler`];
/// submitted documents are accumulated by the handler, not returned here.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name used in logs and errors.
    fn provider_name(&self) -> &str;

    /// Pick a concept for a text excerpt.
    async fn classify_document(
        &self,
        excerpt: &str,
        concepts: &[ConceptCatalogueEntry],
    ) -> Result<LlmClassification>;

    /// Extract template fields from text.
    async fn extract_metadata(
        &self,
        text: &str,
        concept_id: &str,
        fields: &[TemplateField],
    ) -> Result<LlmExtraction>;

    /// Run a tool-calling round over a PDF.
    async fn process_pdf_with_tools(
        &self,
        pdf: &[u8],
        filename: &str,
        concepts: &[ConceptCatalogueEntry],
        handler: &mut dyn ToolHandler,
    ) -> Result<ToolLoopReport>;

    /// Run a tool-calling round over an image (uploaded or captured).
    async fn process_image_with_tools(
        &self,
        image: &[u8],
        mime_type: &str,
        source_url: Option<&str>,
        concepts: &[ConceptCatalogueEntry],
        handler: &mut dyn ToolHandler,
    ) -> Result<ToolLoopReport>;
}
