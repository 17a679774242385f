//! Domain models shared across taxon crates.

pub mod job;
pub mod ontology;
pub mod resource;

pub use job::{JobStatus, ProcessingJob, QueueStats, ResourceType};
pub use ontology::{
    Concept, EmbeddedType, ExtractionTemplate, Layer, Mixin, PropertyDef, Relationship,
    UpdateConceptRequest,
};
pub use resource::{
    Classification, ClassificationSignal, ExtraField, FieldValue, Metadata, MetadataEntry,
    PageRange, ProcessingTimings, Resource, ResourceStatus, SignalMethod, UNKNOWN_CONCEPT,
};
