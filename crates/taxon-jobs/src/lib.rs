//! # taxon-jobs
//!
//! Document processing and background jobs for taxon.
//!
//! This crate provides:
//! - The per-resource processing pipeline, including the tool-calling round
//!   for PDFs and images and the split into sub-documents
//! - Resource group deletion and reprocessing
//! - Text extraction adapters
//! - Job ingest, queries, restart, and the polling processor that broadcasts
//!   status events
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use taxon_jobs::{JobDispatcher, JobProcessor, ProcessingPipeline, ProcessorConfig};
//!
//! let pipeline = Arc::new(ProcessingPipeline::new(config, ontology, resources, storage, extractor));
//! let dispatcher = Arc::new(JobDispatcher::new(pipeline));
//! let events = Arc::new(EventBus::new(64));
//!
//! let handle = JobProcessor::new(ProcessorConfig::default(), jobs, dispatcher, events.clone()).start();
//! let mut rx = events.subscribe();
//! while let Some(event) = rx.recv().await {
//!     println!("{} -> {}", event.payload.job_id, event.payload.status);
//! }
//! handle.shutdown().await?;
//! ```

pub mod adapters;
pub mod handler;
pub mod ingest;
pub mod lifecycle;
pub mod mime;
pub mod pipeline;
pub mod processor;
pub mod queue;
pub mod split;
pub mod tools;

// Re-export core types
pub use taxon_core::*;

pub use adapters::{CompositeTextExtractor, PdfTextExtractor, PlainTextExtractor};
pub use handler::{JobDispatcher, JobFailure, JobResult};
pub use ingest::IngestService;
pub use lifecycle::{DeleteReport, ResourceLifecycle};
pub use pipeline::{
    NoProgress, PipelineConfig, PipelineOutcome, ProcessOptions, ProcessingPipeline, ProgressSink,
};
pub use processor::{JobProcessor, ProcessorConfig, ProcessorHandle};
pub use queue::JobQueue;
pub use split::apply_submissions;
pub use tools::{DocumentToolDispatcher, SubmissionCollector};
