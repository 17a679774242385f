//! Document processing pipeline.
//!
//! Standard path:
//! `PENDING → EXTRACTING_TEXT → CLASSIFYING → EXTRACTING_METADATA → DONE`.
//!
//! PDFs and images skip the separate stages when an LLM is configured: the
//! raw file goes to the model in one tool-calling round
//! (`PENDING → CLASSIFYING → DONE`), and every `submit_document` call becomes a
//! resource (see [`crate::split`]).
//!
//! Any stage error marks the resource `ERROR` with the message and is
//! returned to the caller. Classification and extraction LLM failures never
//! reach this level; they degrade inside the engines.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use taxon_classify::{
    detect_language, excerpt, override_classification, Classifier, ClassifierConfig, Extractor,
    ExtractorConfig,
};
use taxon_core::defaults::{URL_FALLBACK_CONCEPT, URL_FALLBACK_CONFIDENCE};
use taxon_core::{
    Classification, ClassificationSignal, DocumentSubmission, EmbeddingIndexer, Error,
    LlmClient, Resource, ResourceRepository, ResourceStatus, Result, SignalMethod,
    StorageBackend, TextExtractor,
};
use taxon_ontology::{Ontology, OntologyService};

use crate::split::{apply_submissions, NO_SUBMISSIONS_MSG};
use crate::tools::{DocumentToolDispatcher, SubmissionCollector};

/// Characters of extracted text kept on the resource.
pub const STORED_TEXT_CHARS: usize = 100_000;

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub classifier: ClassifierConfig,
    pub extractor: ExtractorConfig,
    /// Send PDFs and images to the model with tools when an LLM is present.
    pub tool_calling: bool,
    pub stored_text_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            extractor: ExtractorConfig::default(),
            tool_calling: true,
            stored_text_chars: STORED_TEXT_CHARS,
        }
    }
}

impl PipelineConfig {
    /// Load from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `TAXON_TOOL_CALLING` | `true` |
    ///
    /// Classifier and extractor settings read their own variables.
    pub fn from_env() -> Self {
        let tool_calling = std::env::var("TAXON_TOOL_CALLING")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);
        Self {
            classifier: ClassifierConfig::from_env(),
            extractor: ExtractorConfig::from_env(),
            tool_calling,
            stored_text_chars: STORED_TEXT_CHARS,
        }
    }

    pub fn with_tool_calling(mut self, enabled: bool) -> Self {
        self.tool_calling = enabled;
        self
    }
}

/// Receives human-readable stage progress.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, message: &str);
}

/// Discards progress.
pub struct NoProgress;

#[async_trait]
impl ProgressSink for NoProgress {
    async fn report(&self, _message: &str) {}
}

/// Per-run options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessOptions {
    /// Skip classification and extract against this concept.
    pub concept_override: Option<String>,
    /// Original path of the upload, used for path pattern matching. Falls
    /// back to the path recorded on the resource.
    pub source_path: Option<String>,
}

impl ProcessOptions {
    pub fn with_concept_override(mut self, concept_id: impl Into<String>) -> Self {
        self.concept_override = Some(concept_id.into());
        self
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

/// Resources produced by one run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// The processed resource, updated in place.
    pub root: Resource,
    /// Sub-documents split off by a tool-calling round.
    pub children: Vec<Resource>,
}

/// Drives a resource through text extraction, classification and metadata
/// extraction.
pub struct ProcessingPipeline {
    config: PipelineConfig,
    ontology: OntologyService,
    resources: Arc<dyn ResourceRepository>,
    storage: Arc<dyn StorageBackend>,
    text_extractor: Arc<dyn TextExtractor>,
    classifier: Classifier,
    extractor: Extractor,
    llm: Option<Arc<dyn LlmClient>>,
    indexer: Option<Arc<dyn EmbeddingIndexer>>,
}

fn elapsed_ms(start: Instant) -> Option<u64> {
    Some(start.elapsed().as_millis() as u64)
}

/// Check that `concept_id` can be forced onto a resource.
pub fn validate_override(ontology: &Ontology, concept_id: &str) -> Result<()> {
    if !ontology.contains(concept_id) {
        return Err(Error::NotFound(format!("concept '{}'", concept_id)));
    }
    if !ontology.is_classifiable(concept_id) {
        return Err(Error::InvalidInput(format!(
            "concept '{}' is abstract and cannot be assigned",
            concept_id
        )));
    }
    Ok(())
}

/// Low-confidence classification used when a page capture yields nothing.
pub fn url_fallback_classification() -> Classification {
    Classification {
        primary_concept_id: URL_FALLBACK_CONCEPT.to_string(),
        confidence: URL_FALLBACK_CONFIDENCE,
        signals: vec![ClassificationSignal {
            method: SignalMethod::Fallback,
            concept_id: URL_FALLBACK_CONCEPT.to_string(),
            raw_score: URL_FALLBACK_CONFIDENCE,
            score: URL_FALLBACK_CONFIDENCE,
            explanation: "no documents submitted for captured page".to_string(),
        }],
        reasoning: None,
    }
}

impl ProcessingPipeline {
    pub fn new(
        config: PipelineConfig,
        ontology: OntologyService,
        resources: Arc<dyn ResourceRepository>,
        storage: Arc<dyn StorageBackend>,
        text_extractor: Arc<dyn TextExtractor>,
    ) -> Self {
        Self {
            classifier: Classifier::new(config.classifier.clone()),
            extractor: Extractor::new(config.extractor.clone()),
            config,
            ontology,
            resources,
            storage,
            text_extractor,
            llm: None,
            indexer: None,
        }
    }

    /// Use an LLM for classification, extraction and tool-calling rounds.
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.classifier = self.classifier.with_llm(llm.clone());
        self.extractor = self.extractor.with_llm(llm.clone());
        self.llm = Some(llm);
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn EmbeddingIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn ontology(&self) -> &OntologyService {
        &self.ontology
    }

    pub fn resources(&self) -> &Arc<dyn ResourceRepository> {
        &self.resources
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    async fn load(&self, resource_id: Uuid) -> Result<Resource> {
        self.resources
            .get(resource_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("resource {}", resource_id)))
    }

    /// Process a stored resource.
    #[instrument(skip(self, options, progress), fields(resource_id = %resource_id))]
    pub async fn process(
        &self,
        resource_id: Uuid,
        options: ProcessOptions,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutcome> {
        let mut resource = self.load(resource_id).await?;
        let started = Instant::now();
        let result = self.run(&mut resource, &options, progress).await;
        self.finish(resource, started, result).await
    }

    /// Process a captured web page image with a vision tool-calling round.
    ///
    /// A round with no submissions is not an error here: the page gets a
    /// generic low-confidence classification instead.
    #[instrument(skip(self, progress), fields(resource_id = %resource_id))]
    pub async fn process_capture(
        &self,
        resource_id: Uuid,
        source_url: &str,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutcome> {
        let mut resource = self.load(resource_id).await?;
        let started = Instant::now();
        let result = self.run_capture(&mut resource, source_url, progress).await;
        self.finish(resource, started, result).await
    }

    /// Persist a finished run, or record its error on the resource.
    async fn finish(
        &self,
        mut resource: Resource,
        started: Instant,
        result: Result<Vec<Resource>>,
    ) -> Result<PipelineOutcome> {
        let children = match result {
            Ok(children) => children,
            Err(e) => {
                self.mark_failed(&mut resource, &e).await;
                return Err(e);
            }
        };

        resource.timings.total_ms = elapsed_ms(started);
        if let Err(e) = self.persist(&resource, &children).await {
            self.mark_failed(&mut resource, &e).await;
            return Err(e);
        }

        self.index(&resource).await;
        for child in &children {
            self.index(child).await;
        }

        info!(
            subsystem = "pipeline",
            resource_id = %resource.id,
            concept_id = resource
                .classification
                .as_ref()
                .map(|c| c.primary_concept_id.as_str())
                .unwrap_or_default(),
            children = children.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Resource processed"
        );
        Ok(PipelineOutcome {
            root: resource,
            children,
        })
    }

    async fn persist(&self, resource: &Resource, children: &[Resource]) -> Result<()> {
        self.resources.update(resource).await?;
        for child in children {
            self.resources.insert(child).await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, resource: &mut Resource, err: &Error) {
        warn!(
            subsystem = "pipeline",
            resource_id = %resource.id,
            error = %err,
            "Resource processing failed"
        );
        resource.status = ResourceStatus::Error;
        resource.error_message = Some(err.to_string());
        resource.updated_at = Utc::now();
        if let Err(e) = self.resources.update(resource).await {
            error!(resource_id = %resource.id, error = %e, "Failed to record resource error");
        }
    }

    async fn set_status(&self, resource: &mut Resource, status: ResourceStatus) -> Result<()> {
        resource.status = status;
        resource.updated_at = Utc::now();
        self.resources.update(resource).await
    }

    /// Best-effort vector indexing.
    async fn index(&self, resource: &Resource) {
        if let Some(indexer) = &self.indexer {
            if let Err(e) = indexer.index_resource(resource).await {
                warn!(
                    subsystem = "pipeline",
                    resource_id = %resource.id,
                    error = %e,
                    "Embedding indexing failed, continuing"
                );
            }
        }
    }

    async fn run(
        &self,
        resource: &mut Resource,
        options: &ProcessOptions,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Resource>> {
        let ontology = self.ontology.snapshot().await?;
        if let Some(concept_id) = options.concept_override.as_deref() {
            validate_override(&ontology, concept_id)?;
        }

        let tool_eligible = options.concept_override.is_none()
            && self.config.tool_calling
            && (resource.is_pdf() || resource.is_image());
        if let (true, Some(llm)) = (tool_eligible, self.llm.as_ref()) {
            return self
                .run_tool_calling(llm.as_ref(), &ontology, resource, progress)
                .await;
        }

        self.run_standard(&ontology, resource, options, progress)
            .await?;
        Ok(Vec::new())
    }

    async fn run_standard(
        &self,
        ontology: &Ontology,
        resource: &mut Resource,
        options: &ProcessOptions,
        progress: &dyn ProgressSink,
    ) -> Result<()> {
        self.set_status(resource, ResourceStatus::ExtractingText)
            .await?;
        progress.report("Extracting text").await;
        let start = Instant::now();
        let text = self.extract_text(resource).await?;
        resource.timings.text_extraction_ms = elapsed_ms(start);
        resource.language = detect_language(&text).map(String::from);
        resource.extracted_text = if text.trim().is_empty() {
            None
        } else {
            Some(excerpt(&text, self.config.stored_text_chars).to_string())
        };

        self.set_status(resource, ResourceStatus::Classifying)
            .await?;
        progress.report("Classifying").await;
        let start = Instant::now();
        let classification = match options.concept_override.as_deref() {
            Some(concept_id) => override_classification(concept_id),
            None => {
                let source_path = options
                    .source_path
                    .as_deref()
                    .or(resource.source_path.as_deref());
                self.classifier
                    .classify(ontology, &text, &resource.filename, source_path)
                    .await
            }
        };
        resource.timings.classification_ms = elapsed_ms(start);
        debug!(
            resource_id = %resource.id,
            concept_id = %classification.primary_concept_id,
            confidence = classification.confidence,
            "Classified"
        );

        let should_extract = options.concept_override.is_some()
            || (!classification.is_unknown() && !text.trim().is_empty());
        if should_extract {
            self.set_status(resource, ResourceStatus::ExtractingMetadata)
                .await?;
            progress.report("Extracting metadata").await;
            let start = Instant::now();
            let outcome = self.extractor.extract(ontology, &text, &classification).await;
            resource.timings.extraction_ms = elapsed_ms(start);
            if outcome.degraded {
                warn!(
                    resource_id = %resource.id,
                    concept_id = %classification.primary_concept_id,
                    "Extraction degraded to line scan"
                );
            }
            resource.metadata = outcome.metadata;
            resource.extra_fields = outcome.extra_fields;
            resource.summary = outcome.summary;
        }

        let now = Utc::now();
        resource.classification = Some(classification);
        resource.status = ResourceStatus::Done;
        resource.error_message = None;
        resource.processed_at = Some(now);
        resource.updated_at = now;
        Ok(())
    }

    /// Extracted text, or an empty string for types no adapter reads.
    async fn extract_text(&self, resource: &Resource) -> Result<String> {
        if !self.text_extractor.can_extract(&resource.mime_type) {
            debug!(
                resource_id = %resource.id,
                mime_type = %resource.mime_type,
                "No text extractor for MIME type"
            );
            return Ok(String::new());
        }
        let path = self.storage.local_path(&resource.stored_path);
        self.text_extractor
            .extract_text(&path, &resource.mime_type)
            .await
    }

    async fn run_tool_calling(
        &self,
        llm: &dyn LlmClient,
        ontology: &Ontology,
        resource: &mut Resource,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Resource>> {
        self.set_status(resource, ResourceStatus::Classifying)
            .await?;
        progress.report("Analyzing document with tool calling").await;

        let start = Instant::now();
        let data = self.storage.read(&resource.stored_path).await?;
        let submissions = self
            .tool_round(llm, ontology, &data, resource, None)
            .await?;
        resource.timings.classification_ms = elapsed_ms(start);

        if submissions.is_empty() {
            return Err(Error::provider(llm.provider_name(), None, NO_SUBMISSIONS_MSG));
        }
        progress
            .report(&format!("Model submitted {} document(s)", submissions.len()))
            .await;
        apply_submissions(ontology, resource, &submissions)
    }

    async fn run_capture(
        &self,
        resource: &mut Resource,
        source_url: &str,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Resource>> {
        let llm = self
            .llm
            .as_ref()
            .ok_or_else(|| Error::Config("URL processing requires an LLM provider".into()))?;
        let ontology = self.ontology.snapshot().await?;

        self.set_status(resource, ResourceStatus::Classifying)
            .await?;
        progress.report("Analyzing captured page").await;

        let start = Instant::now();
        let data = self.storage.read(&resource.stored_path).await?;
        let submissions = self
            .tool_round(llm.as_ref(), &ontology, &data, resource, Some(source_url))
            .await?;
        resource.timings.classification_ms = elapsed_ms(start);

        if submissions.is_empty() {
            warn!(
                resource_id = %resource.id,
                url = source_url,
                "No documents submitted for captured page, using fallback classification"
            );
            let now = Utc::now();
            resource.classification = Some(url_fallback_classification());
            resource.status = ResourceStatus::Done;
            resource.error_message = None;
            resource.processed_at = Some(now);
            resource.updated_at = now;
            return Ok(Vec::new());
        }
        apply_submissions(&ontology, resource, &submissions)
    }

    /// Run one tool-calling round and return the collected submissions.
    async fn tool_round(
        &self,
        llm: &dyn LlmClient,
        ontology: &Ontology,
        data: &[u8],
        resource: &Resource,
        source_url: Option<&str>,
    ) -> Result<Vec<DocumentSubmission>> {
        let catalogue = ontology.catalogue();
        let mut collector = SubmissionCollector::new();
        let report = {
            let mut dispatcher = DocumentToolDispatcher::new(ontology, &mut collector);
            if resource.is_pdf() {
                llm.process_pdf_with_tools(data, &resource.filename, &catalogue, &mut dispatcher)
                    .await?
            } else {
                llm.process_image_with_tools(
                    data,
                    &resource.mime_type,
                    source_url,
                    &catalogue,
                    &mut dispatcher,
                )
                .await?
            }
        };

        info!(
            subsystem = "pipeline",
            resource_id = %resource.id,
            provider = llm.provider_name(),
            iterations = report.iterations,
            tool_calls = report.tool_calls,
            submission_count = collector.len(),
            hit_iteration_cap = report.hit_iteration_cap,
            "Tool-calling round finished"
        );
        Ok(collector.into_submissions())
    }
}
