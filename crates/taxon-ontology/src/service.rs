//! Concept mutations and snapshot loading over an [`OntologyRepository`].
//!
//! Layer rules:
//! - `L1`/`L2` concepts are immutable through this service.
//! - `L3+` concepts may be updated, and deleted only when they have no children.
//! - A parent named by `inherits` must exist.

use std::sync::Arc;

use taxon_core::{
    Concept, Error, OntologyRepository, PropertyDef, Result, UpdateConceptRequest,
};
use tracing::{debug, info};

use crate::loader::OntologyDocument;
use crate::resolver::{ExtractionSchema, Ontology};
use crate::tree::ConceptTreeNode;

/// Ontology operations backed by a repository.
#[derive(Clone)]
pub struct OntologyService {
    repo: Arc<dyn OntologyRepository>,
}

impl OntologyService {
    pub fn new(repo: Arc<dyn OntologyRepository>) -> Self {
        Self { repo }
    }

    /// Load the full ontology into an immutable snapshot.
    pub async fn snapshot(&self) -> Result<Ontology> {
        let concepts = self.repo.list_concepts().await?;
        let mixins = self.repo.list_mixins().await?;
        let embedded_types = self.repo.list_embedded_types().await?;
        debug!(
            subsystem = "ontology",
            concepts = concepts.len(),
            mixins = mixins.len(),
            embedded_types = embedded_types.len(),
            "Loaded ontology snapshot"
        );
        Ok(Ontology::new(concepts, mixins, embedded_types))
    }

    pub async fn get_concept(&self, id: &str) -> Result<Concept> {
        self.repo
            .get_concept(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("concept '{}'", id)))
    }

    pub async fn resolved_properties(&self, id: &str) -> Result<Vec<PropertyDef>> {
        self.snapshot().await?.resolved_properties(id)
    }

    pub async fn extraction_schema(&self, id: &str) -> Result<ExtractionSchema> {
        self.snapshot().await?.extraction_schema(id)
    }

    pub async fn tree(&self) -> Result<Vec<ConceptTreeNode>> {
        Ok(self.snapshot().await?.tree())
    }

    /// Create a user concept.
    pub async fn create_concept(&self, concept: Concept) -> Result<Concept> {
        if concept.id.trim().is_empty() {
            return Err(Error::InvalidInput("concept id must not be empty".into()));
        }
        if concept.layer.is_system() {
            return Err(Error::ProtectedConcept(format!(
                "cannot create '{}' in system layer {}",
                concept.id, concept.layer
            )));
        }
        if self.repo.get_concept(&concept.id).await?.is_some() {
            return Err(Error::AlreadyExists(format!("concept '{}'", concept.id)));
        }
        if let Some(parent) = concept.inherits.as_deref() {
            self.require_parent(parent).await?;
        }

        self.repo.insert_concept(&concept).await?;
        info!(
            subsystem = "ontology",
            op = "create_concept",
            concept_id = %concept.id,
            layer = %concept.layer,
            "Concept created"
        );
        Ok(concept)
    }

    /// Patch a user concept.
    pub async fn update_concept(&self, id: &str, patch: UpdateConceptRequest) -> Result<Concept> {
        let mut concept = self.get_concept(id).await?;
        if concept.layer.is_system() {
            return Err(Error::ProtectedConcept(format!(
                "'{}' is in system layer {}",
                id, concept.layer
            )));
        }
        if let Some(Some(parent)) = patch.inherits.as_ref() {
            if parent == id {
                return Err(Error::InvalidInput(format!("'{}' cannot inherit itself", id)));
            }
            self.require_parent(parent).await?;
        }

        patch.apply_to(&mut concept);
        self.repo.update_concept(&concept).await?;
        info!(
            subsystem = "ontology",
            op = "update_concept",
            concept_id = %id,
            "Concept updated"
        );
        Ok(concept)
    }

    /// Delete a user concept that has no children.
    pub async fn delete_concept(&self, id: &str) -> Result<()> {
        let concept = self.get_concept(id).await?;
        if concept.layer.is_system() {
            return Err(Error::ProtectedConcept(format!(
                "'{}' is in system layer {}",
                id, concept.layer
            )));
        }
        let children = self.repo.count_children(id).await?;
        if children > 0 {
            return Err(Error::ProtectedConcept(format!(
                "'{}' has {} child concept(s)",
                id, children
            )));
        }

        self.repo.delete_concept(id).await?;
        info!(
            subsystem = "ontology",
            op = "delete_concept",
            concept_id = %id,
            "Concept deleted"
        );
        Ok(())
    }

    /// Write a bundled ontology document into the repository.
    ///
    /// Existing concepts with the same id are replaced. Parents are inserted
    /// before children so repository constraints hold throughout.
    pub async fn seed(&self, doc: &OntologyDocument) -> Result<usize> {
        for mixin in &doc.mixins {
            self.repo.upsert_mixin(mixin).await?;
        }

        let mut pending: Vec<&Concept> = doc.concepts.iter().collect();
        let mut written = 0usize;
        while !pending.is_empty() {
            let before = pending.len();
            let mut deferred = Vec::new();
            for concept in pending {
                let parent_ready = match concept.inherits.as_deref() {
                    Some(parent) => self.repo.get_concept(parent).await?.is_some(),
                    None => true,
                };
                if !parent_ready {
                    deferred.push(concept);
                    continue;
                }
                if self.repo.get_concept(&concept.id).await?.is_some() {
                    self.repo.update_concept(concept).await?;
                } else {
                    self.repo.insert_concept(concept).await?;
                }
                written += 1;
            }
            if deferred.len() == before {
                return Err(Error::InvalidInput(format!(
                    "unresolvable parents for concept(s): {}",
                    deferred
                        .iter()
                        .map(|c| c.id.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )));
            }
            pending = deferred;
        }

        for embedded_type in &doc.embedded_types {
            self.repo.upsert_embedded_type(embedded_type).await?;
        }

        info!(
            subsystem = "ontology",
            op = "seed",
            concepts = written,
            mixins = doc.mixins.len(),
            embedded_types = doc.embedded_types.len(),
            "Ontology seeded"
        );
        Ok(written)
    }

    async fn require_parent(&self, parent: &str) -> Result<()> {
        if self.repo.get_concept(parent).await?.is_none() {
            return Err(Error::NotFound(format!("parent concept '{}'", parent)));
        }
        Ok(())
    }
}
