//! Ontology storage shapes: concepts, mixins, and embedded types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Ontology layer of a concept.
///
/// `L1` (system foundation) and `L2` (system enterprise) ship with the system and
/// are immutable. `L3` and above are user-created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Layer(u8);

impl Layer {
    pub const FOUNDATION: Layer = Layer(1);
    pub const ENTERPRISE: Layer = Layer(2);
    pub const USER: Layer = Layer(3);

    /// Create a layer from its numeric level (1-based).
    pub fn new(level: u8) -> Option<Self> {
        (level >= 1).then_some(Layer(level))
    }

    pub fn level(&self) -> u8 {
        self.0
    }

    /// `L1`/`L2` are system layers and may not be mutated or deleted.
    pub fn is_system(&self) -> bool {
        self.0 <= 2
    }
}

impl Default for Layer {
    fn default() -> Self {
        Layer::USER
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

impl FromStr for Layer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .trim()
            .strip_prefix('L')
            .or_else(|| s.trim().strip_prefix('l'))
            .ok_or_else(|| Error::InvalidInput(format!("invalid layer '{}'", s)))?;
        let digits = digits.trim_end_matches('+');
        let level: u8 = digits
            .parse()
            .map_err(|_| Error::InvalidInput(format!("invalid layer '{}'", s)))?;
        Layer::new(level).ok_or_else(|| Error::InvalidInput(format!("invalid layer '{}'", s)))
    }
}

impl TryFrom<String> for Layer {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Layer> for String {
    fn from(layer: Layer) -> Self {
        layer.to_string()
    }
}

/// A single field definition on a concept, mixin, or embedded type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    pub name: String,
    /// Declared value type: `string`, `date`, `datetime`, `number`, `decimal`,
    /// `amount`, `currency`, `boolean`, ...
    #[serde(rename = "type", default = "default_property_type")]
    pub property_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_property_type() -> String {
    "string".to_string()
}

impl PropertyDef {
    pub fn new(name: impl Into<String>, property_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            property_type: property_type.into(),
            required: false,
            default: None,
            description: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A typed edge from one concept to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub name: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Classification hints and file-glob patterns attached to a concept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionTemplate {
    #[serde(default)]
    pub classification_hints: Vec<String>,
    #[serde(default)]
    pub file_patterns: Vec<String>,
}

/// A node in the ontology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub layer: Layer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    #[serde(rename = "abstract", default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub mixins: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_template: Option<ExtractionTemplate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pillar: Option<String>,
}

impl Concept {
    /// Create a user-layer concept with the given id; the label defaults to the id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            description: None,
            layer: Layer::USER,
            inherits: None,
            is_abstract: false,
            synonyms: Vec::new(),
            mixins: Vec::new(),
            properties: Vec::new(),
            relationships: Vec::new(),
            extraction_template: None,
            pillar: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }

    pub fn inheriting(mut self, parent: impl Into<String>) -> Self {
        self.inherits = Some(parent.into());
        self
    }

    pub fn abstract_concept(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn with_mixins<I, S>(mut self, mixins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mixins = mixins.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms = synonyms.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_template(mut self, template: ExtractionTemplate) -> Self {
        self.extraction_template = Some(template);
        self
    }

    /// Classification hints declared in the extraction template (may be empty).
    pub fn hints(&self) -> &[String] {
        self.extraction_template
            .as_ref()
            .map(|t| t.classification_hints.as_slice())
            .unwrap_or(&[])
    }

    /// File patterns declared in the extraction template (may be empty).
    pub fn file_patterns(&self) -> &[String] {
        self.extraction_template
            .as_ref()
            .map(|t| t.file_patterns.as_slice())
            .unwrap_or(&[])
    }
}

/// A named, reusable bag of properties referenced from concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mixin {
    pub id: String,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
}

/// A structured value object extracted nested inside documents of specific concepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedType {
    pub id: String,
    #[serde(default)]
    pub applies_to: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Patch for a user-layer concept. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateConceptRequest {
    pub label: Option<String>,
    pub description: Option<String>,
    pub inherits: Option<Option<String>>,
    pub is_abstract: Option<bool>,
    pub synonyms: Option<Vec<String>>,
    pub mixins: Option<Vec<String>>,
    pub properties: Option<Vec<PropertyDef>>,
    pub relationships: Option<Vec<Relationship>>,
    pub extraction_template: Option<ExtractionTemplate>,
    pub pillar: Option<String>,
}

impl UpdateConceptRequest {
    /// Apply the patch to a concept in place.
    pub fn apply_to(self, concept: &mut Concept) {
        if let Some(label) = self.label {
            concept.label = label;
        }
        if let Some(description) = self.description {
            concept.description = Some(description);
        }
        if let Some(inherits) = self.inherits {
            concept.inherits = inherits;
        }
        if let Some(is_abstract) = self.is_abstract {
            concept.is_abstract = is_abstract;
        }
        if let Some(synonyms) = self.synonyms {
            concept.synonyms = synonyms;
        }
        if let Some(mixins) = self.mixins {
            concept.mixins = mixins;
        }
        if let Some(properties) = self.properties {
            concept.properties = properties;
        }
        if let Some(relationships) = self.relationships {
            concept.relationships = relationships;
        }
        if let Some(template) = self.extraction_template {
            concept.extraction_template = Some(template);
        }
        if let Some(pillar) = self.pillar {
            concept.pillar = Some(pillar);
        }
    }
}
