//! Labelled concept forest for display.

use std::collections::HashMap;

use serde::Serialize;
use taxon_core::{Concept, Layer};

use crate::resolver::Ontology;

/// One node of the concept forest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptTreeNode {
    pub id: String,
    pub label: String,
    pub layer: Layer,
    #[serde(rename = "abstract")]
    pub is_abstract: bool,
    pub children: Vec<ConceptTreeNode>,
}

impl Ontology {
    /// Forest rooted at concepts without a parent, children sorted by label.
    ///
    /// Concepts whose parent is missing from the snapshot are not reachable
    /// and do not appear.
    pub fn tree(&self) -> Vec<ConceptTreeNode> {
        let mut by_parent: HashMap<Option<&str>, Vec<&Concept>> = HashMap::new();
        for concept in self.concepts() {
            by_parent
                .entry(concept.inherits.as_deref())
                .or_default()
                .push(concept);
        }
        build_level(&by_parent, None)
    }
}

fn build_level<'a>(
    by_parent: &HashMap<Option<&'a str>, Vec<&'a Concept>>,
    parent: Option<&'a str>,
) -> Vec<ConceptTreeNode> {
    let Some(concepts) = by_parent.get(&parent) else {
        return Vec::new();
    };
    let mut nodes: Vec<ConceptTreeNode> = concepts
        .iter()
        .copied()
        .map(|c| ConceptTreeNode {
            id: c.id.clone(),
            label: c.label.clone(),
            layer: c.layer,
            is_abstract: c.is_abstract,
            children: build_level(by_parent, Some(c.id.as_str())),
        })
        .collect();
    nodes.sort_by(|a, b| a.label.cmp(&b.label));
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_roots_and_sorted_children() {
        let onto = Ontology::new(
            vec![
                Concept::new("Document").with_label("Document"),
                Concept::new("Receipt").with_label("Receipt").inheriting("Document"),
                Concept::new("Contract").with_label("Contract").inheriting("Document"),
                Concept::new("Note").with_label("Aardvark note"),
                Concept::new("Orphan").inheriting("Missing"),
            ],
            vec![],
            vec![],
        );

        let tree = onto.tree();
        let roots: Vec<_> = tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, ["Note", "Document"]);

        let children: Vec<_> = tree[1].children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(children, ["Contract", "Receipt"]);
        assert!(tree[0].children.is_empty());
    }

    #[test]
    fn test_tree_of_empty_ontology() {
        assert!(Ontology::default().tree().is_empty());
    }
}
