//! # taxon-core
//!
//! Core types, traits, and abstractions for taxon.
//!
//! This crate provides the ontology, resource and job models, the error
//! taxonomy, the repository and collaborator ports, and the job status event
//! bus that the other taxon crates depend on.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod tools;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventBus, EventEnvelope, JobStatusEvent};
pub use models::*;
pub use tools::{DocumentSubmission, ToolHandler, ToolLoopReport, ToolSpec};
pub use traits::*;
pub use uuid_utils::{is_v7, new_v7};
