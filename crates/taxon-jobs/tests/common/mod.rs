//! Shared setup for taxon-jobs integration tests.
//!
//! Everything runs in memory apart from file storage, which lives in a
//! temporary directory removed when the harness drops.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use taxon_core::{
    EventBus, PageCapture, Resource, ResourceRepository, Result, ScreenshotCapture,
    StorageBackend,
};
use taxon_db::{
    FilesystemStorage, MemoryJobRepository, MemoryOntologyRepository, MemoryResourceRepository,
};
use taxon_inference::mock::MockLlmClient;
use taxon_jobs::{
    CompositeTextExtractor, IngestService, JobDispatcher, JobProcessor, JobQueue,
    PipelineConfig, PlainTextExtractor, ProcessingPipeline, ProcessorConfig, ResourceLifecycle,
};
use taxon_ontology::{parse_ontology_yaml, OntologyService, FOUNDATION_YAML};

pub const INVOICE_TEXT: &str = "INVOICE\n\
Invoice number: F-2025-001\n\
Due date: 15-03-2025\n\
Total amount: 1.250,50\n\
The amount due includes VAT and must be paid by the due date.\n";

/// Bytes `infer` recognises as a PNG.
pub const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%fake test document\n";

pub struct Harness {
    pub dir: TempDir,
    pub ontology: OntologyService,
    pub resources: Arc<MemoryResourceRepository>,
    pub jobs: Arc<MemoryJobRepository>,
    pub storage: Arc<FilesystemStorage>,
    pub pipeline: Arc<ProcessingPipeline>,
    pub events: Arc<EventBus>,
    pub screenshot: Option<Arc<dyn ScreenshotCapture>>,
}

impl Harness {
    pub async fn new(llm: Option<MockLlmClient>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let ontology = OntologyService::new(Arc::new(MemoryOntologyRepository::new()));
        ontology
            .seed(&parse_ontology_yaml(FOUNDATION_YAML).unwrap())
            .await
            .unwrap();

        let resources = Arc::new(MemoryResourceRepository::new());
        let storage = Arc::new(FilesystemStorage::new(dir.path()));
        let pipeline = build_pipeline(&ontology, resources.clone(), storage.clone(), llm);

        Self {
            dir,
            ontology,
            resources,
            jobs: Arc::new(MemoryJobRepository::new()),
            storage,
            pipeline: Arc::new(pipeline),
            events: Arc::new(EventBus::new(64)),
            screenshot: None,
        }
    }

    /// A pipeline sharing this harness's ontology and storage but writing
    /// through `resources`.
    pub fn pipeline_over(
        &self,
        resources: Arc<dyn ResourceRepository>,
        llm: Option<MockLlmClient>,
    ) -> ProcessingPipeline {
        build_pipeline(&self.ontology, resources, self.storage.clone(), llm)
    }

    pub fn with_screenshot(mut self, capture: impl ScreenshotCapture + 'static) -> Self {
        self.screenshot = Some(Arc::new(capture));
        self
    }

    pub fn lifecycle(&self) -> ResourceLifecycle {
        ResourceLifecycle::new(self.pipeline.clone())
    }

    pub fn ingest(&self) -> IngestService {
        IngestService::new(
            self.jobs.clone(),
            self.resources.clone(),
            self.storage.clone(),
            self.events.clone(),
        )
    }

    pub fn queue(&self) -> JobQueue {
        JobQueue::new(self.jobs.clone(), self.lifecycle(), self.events.clone())
    }

    pub fn processor(&self) -> JobProcessor {
        self.processor_with(ProcessorConfig::default())
    }

    pub fn processor_with(&self, config: ProcessorConfig) -> JobProcessor {
        let mut dispatcher = JobDispatcher::new(self.pipeline.clone());
        if let Some(capture) = &self.screenshot {
            dispatcher = dispatcher.with_screenshot(capture.clone());
        }
        JobProcessor::new(config, self.jobs.clone(), Arc::new(dispatcher), self.events.clone())
    }

    /// Store bytes and register a pending resource for them.
    pub async fn stored_resource(&self, filename: &str, mime_type: &str, data: &[u8]) -> Resource {
        let stored_path = self.storage.store(data, filename).await.unwrap();
        let resource = Resource::new(filename, mime_type, stored_path);
        self.resources.insert(&resource).await.unwrap();
        resource
    }

    pub async fn resource(&self, id: uuid::Uuid) -> Resource {
        self.resources.get(id).await.unwrap().unwrap()
    }
}

fn build_pipeline(
    ontology: &OntologyService,
    resources: Arc<dyn ResourceRepository>,
    storage: Arc<FilesystemStorage>,
    llm: Option<MockLlmClient>,
) -> ProcessingPipeline {
    // pdftotext is not assumed on test machines.
    let text_extractor = CompositeTextExtractor::new().with(Arc::new(PlainTextExtractor));
    let pipeline = ProcessingPipeline::new(
        PipelineConfig::default(),
        ontology.clone(),
        resources,
        storage,
        Arc::new(text_extractor),
    );
    match llm {
        Some(llm) => pipeline.with_llm(Arc::new(llm)),
        None => pipeline,
    }
}

/// Screenshot capture returning a fixed image.
pub struct FakeCapture;

#[async_trait]
impl ScreenshotCapture for FakeCapture {
    async fn capture(&self, url: &str) -> Result<PageCapture> {
        Ok(PageCapture {
            title: format!("Captured {}", url.trim_start_matches("https://")),
            image: PNG_BYTES.to_vec(),
            mime_type: "image/png".to_string(),
        })
    }
}
