//! Read-only ontology snapshot and the resolution algorithms.
//!
//! Inheritance is flattened root-to-leaf with last-write-wins semantics for
//! properties; embedded types are additive and deduplicated by first
//! occurrence.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use taxon_core::{Concept, ConceptCatalogueEntry, EmbeddedType, Error, Mixin, PropertyDef, Result};

/// Everything the model needs to extract one concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionSchema {
    pub concept_id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub properties: Vec<PropertyDef>,
    pub embedded_types: Vec<EmbeddedType>,
}

/// An immutable view of the ontology.
#[derive(Debug, Clone, Default)]
pub struct Ontology {
    concepts: Vec<Concept>,
    index: HashMap<String, usize>,
    mixins: HashMap<String, Mixin>,
    embedded_types: Vec<EmbeddedType>,
}

impl Ontology {
    /// Build a snapshot. A duplicate concept or mixin id keeps the first entry.
    pub fn new(
        concepts: Vec<Concept>,
        mixins: Vec<Mixin>,
        embedded_types: Vec<EmbeddedType>,
    ) -> Self {
        let mut index = HashMap::with_capacity(concepts.len());
        let mut kept = Vec::with_capacity(concepts.len());
        for concept in concepts {
            if index.contains_key(&concept.id) {
                tracing::warn!(concept_id = %concept.id, "Duplicate concept id ignored");
                continue;
            }
            index.insert(concept.id.clone(), kept.len());
            kept.push(concept);
        }

        let mut mixin_map = HashMap::with_capacity(mixins.len());
        for mixin in mixins {
            mixin_map.entry(mixin.id.clone()).or_insert(mixin);
        }

        Self {
            concepts: kept,
            index,
            mixins: mixin_map,
            embedded_types,
        }
    }

    pub fn concepts(&self) -> &[Concept] {
        &self.concepts
    }

    pub fn embedded_types(&self) -> &[EmbeddedType] {
        &self.embedded_types
    }

    pub fn mixin(&self, id: &str) -> Option<&Mixin> {
        self.mixins.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&Concept> {
        self.index.get(id).map(|&i| &self.concepts[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    fn require(&self, id: &str) -> Result<&Concept> {
        self.get(id)
            .ok_or_else(|| Error::NotFound(format!("concept '{}'", id)))
    }

    /// Ancestor chain ordered root → … → `id`.
    ///
    /// The walk follows `inherits` until it is unset or names a concept that
    /// is not in the snapshot. Cycles are not detected.
    pub fn ancestor_chain(&self, id: &str) -> Result<Vec<&Concept>> {
        let mut chain = vec![self.require(id)?];
        let mut current = chain[0];
        while let Some(parent_id) = current.inherits.as_deref() {
            match self.get(parent_id) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent;
                }
                None => {
                    tracing::debug!(
                        concept_id = %current.id,
                        parent = parent_id,
                        "Parent missing from snapshot, stopping ancestor walk"
                    );
                    break;
                }
            }
        }
        chain.reverse();
        Ok(chain)
    }

    /// Flattened properties of a concept.
    ///
    /// For each node root-to-leaf, its mixins (in declared order) and then its
    /// own properties are written into a name-keyed map. A later write replaces
    /// an earlier one and moves to the end, so the result is in last-write order.
    pub fn resolved_properties(&self, id: &str) -> Result<Vec<PropertyDef>> {
        let mut resolved: Vec<PropertyDef> = Vec::new();
        let mut write = |prop: &PropertyDef| {
            resolved.retain(|p| p.name != prop.name);
            resolved.push(prop.clone());
        };

        for node in self.ancestor_chain(id)? {
            for mixin_id in &node.mixins {
                match self.mixins.get(mixin_id) {
                    Some(mixin) => mixin.properties.iter().for_each(&mut write),
                    None => tracing::debug!(
                        concept_id = %node.id,
                        mixin = %mixin_id,
                        "Unknown mixin referenced, skipping"
                    ),
                }
            }
            node.properties.iter().for_each(&mut write);
        }
        Ok(resolved)
    }

    /// Embedded types applicable to a concept or any of its ancestors.
    ///
    /// Deduplicated by id; the first occurrence wins.
    pub fn embedded_types_for(&self, id: &str) -> Result<Vec<&EmbeddedType>> {
        let lineage: HashSet<&str> = self
            .ancestor_chain(id)?
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();

        let mut seen = HashSet::new();
        Ok(self
            .embedded_types
            .iter()
            .filter(|et| et.applies_to.iter().any(|a| lineage.contains(a.as_str())))
            .filter(|et| seen.insert(et.id.as_str()))
            .collect())
    }

    /// Resolved properties plus applicable embedded types for one concept.
    pub fn extraction_schema(&self, id: &str) -> Result<ExtractionSchema> {
        let concept = self.require(id)?;
        Ok(ExtractionSchema {
            concept_id: concept.id.clone(),
            label: concept.label.clone(),
            description: concept.description.clone(),
            properties: self.resolved_properties(id)?,
            embedded_types: self.embedded_types_for(id)?.into_iter().cloned().collect(),
        })
    }

    /// Concepts that may be chosen as a classification target.
    pub fn classifiable_concepts(&self) -> Vec<&Concept> {
        self.concepts.iter().filter(|c| !c.is_abstract).collect()
    }

    /// Whether `id` names a classifiable concept.
    pub fn is_classifiable(&self, id: &str) -> bool {
        self.get(id).is_some_and(|c| !c.is_abstract)
    }

    /// Compact catalogue of classifiable concepts for the model.
    pub fn catalogue(&self) -> Vec<ConceptCatalogueEntry> {
        self.classifiable_concepts()
            .into_iter()
            .map(|c| ConceptCatalogueEntry {
                id: c.id.clone(),
                label: c.label.clone(),
                description: c.description.clone(),
                synonyms: c.synonyms.clone(),
                hints: c.hints().to_vec(),
            })
            .collect()
    }
}
