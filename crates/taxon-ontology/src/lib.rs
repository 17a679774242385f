//! # taxon-ontology
//!
//! Concept ontology for taxon: single inheritance, flat mixin composition,
//! and "applies-to" embedded types.
//!
//! - [`Ontology`] is an immutable snapshot with the resolution algorithms.
//! - [`OntologyService`] enforces layer protection on top of a repository.
//! - [`loader`] reads YAML ontology documents.

pub mod loader;
pub mod resolver;
pub mod service;
pub mod tree;

pub use loader::{
    load_ontology_file, load_ontology_yaml, parse_ontology_yaml, OntologyDocument,
    FOUNDATION_YAML,
};
pub use resolver::{ExtractionSchema, Ontology};
pub use service::OntologyService;
pub use tree::ConceptTreeNode;
