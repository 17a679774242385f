//! YAML ontology documents.
//!
//! A document holds three optional top-level lists:
//!
//! ```yaml
//! concepts:
//!   - id: Invoice
//!     layer: L2
//!     inherits: FinancialDocument
//!     properties:
//!       - { name: invoice_date, type: date, required: true }
//! mixins: []
//! embedded_types: []
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use taxon_core::{Concept, EmbeddedType, Error, Mixin, Result};

use crate::resolver::Ontology;

/// Raw shape of an ontology YAML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OntologyDocument {
    #[serde(default)]
    pub concepts: Vec<Concept>,
    #[serde(default)]
    pub mixins: Vec<Mixin>,
    #[serde(default)]
    pub embedded_types: Vec<EmbeddedType>,
}

impl OntologyDocument {
    /// Reject duplicate ids and parents that are not declared in the document.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for concept in &self.concepts {
            if concept.id.trim().is_empty() {
                return Err(Error::InvalidInput("concept with empty id".into()));
            }
            if !ids.insert(concept.id.as_str()) {
                return Err(Error::AlreadyExists(format!("concept '{}'", concept.id)));
            }
        }
        for concept in &self.concepts {
            if let Some(parent) = concept.inherits.as_deref() {
                if !ids.contains(parent) {
                    return Err(Error::InvalidInput(format!(
                        "concept '{}' inherits unknown concept '{}'",
                        concept.id, parent
                    )));
                }
            }
        }

        let mut mixin_ids = HashSet::new();
        for mixin in &self.mixins {
            if !mixin_ids.insert(mixin.id.as_str()) {
                return Err(Error::AlreadyExists(format!("mixin '{}'", mixin.id)));
            }
        }
        Ok(())
    }

    pub fn into_ontology(self) -> Ontology {
        Ontology::new(self.concepts, self.mixins, self.embedded_types)
    }
}

/// Parse and validate a YAML ontology document.
pub fn parse_ontology_yaml(yaml: &str) -> Result<OntologyDocument> {
    let doc: OntologyDocument = serde_yaml::from_str(yaml)?;
    doc.validate()?;
    Ok(doc)
}

/// Parse a YAML ontology document into a snapshot.
pub fn load_ontology_yaml(yaml: &str) -> Result<Ontology> {
    Ok(parse_ontology_yaml(yaml)?.into_ontology())
}

/// Read and parse a YAML ontology file.
pub fn load_ontology_file(path: impl AsRef<Path>) -> Result<OntologyDocument> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path)?;
    let doc = parse_ontology_yaml(&yaml)?;
    tracing::info!(
        path = %path.display(),
        concepts = doc.concepts.len(),
        mixins = doc.mixins.len(),
        embedded_types = doc.embedded_types.len(),
        "Loaded ontology file"
    );
    Ok(doc)
}

/// The bundled foundation ontology.
pub const FOUNDATION_YAML: &str = include_str!("../ontology/foundation.yaml");
