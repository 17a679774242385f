//! Template-driven metadata extraction.
//!
//! The classified concept's resolved properties form the field template. An
//! LLM fills it when configured; otherwise, or when the LLM call fails, a
//! line scan for `field: value` pairs runs at a fixed low confidence.

use std::sync::Arc;
use std::time::Instant;

use regex::RegexBuilder;
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, warn};

use taxon_core::defaults::{EXTRACT_TEXT_CHARS, FALLBACK_CONFIDENCE, LLM_DEFAULT_CONFIDENCE};
use taxon_core::{
    Classification, ExtraField, LlmClient, Metadata, PropertyDef, TemplateField,
};
use taxon_ontology::Ontology;

use crate::excerpt;
use crate::normalize::{is_null_sentinel, normalize_field};

/// Confidence levels and bounds for [`Extractor`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    /// Confidence of values found by the line scan.
    pub fallback_confidence: f32,
    /// Confidence used when the model does not report one.
    pub default_confidence: f32,
    /// Leading characters of text sent to the LLM.
    pub text_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            fallback_confidence: FALLBACK_CONFIDENCE,
            default_confidence: LLM_DEFAULT_CONFIDENCE,
            text_chars: EXTRACT_TEXT_CHARS,
        }
    }
}

impl ExtractorConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = std::env::var("TAXON_EXTRACT_TEXT_CHARS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.text_chars = n,
                _ => warn!(value = %val, "Invalid TAXON_EXTRACT_TEXT_CHARS, using default"),
            }
        }
        config
    }
}

/// Normalized fields, leftovers, and summary for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionOutcome {
    pub metadata: Metadata,
    pub extra_fields: Vec<ExtraField>,
    pub summary: Option<String>,
    /// True when the line-scan fallback produced the result.
    pub degraded: bool,
}

impl ExtractionOutcome {
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.extra_fields.is_empty() && self.summary.is_none()
    }
}

/// Split raw model values into typed metadata (declared properties) and
/// extra fields (undeclared keys and nested structures). Null sentinels are
/// dropped.
pub fn normalize_properties(
    properties: &[PropertyDef],
    values: &Map<String, JsonValue>,
    confidence: f32,
) -> (Metadata, Vec<ExtraField>) {
    let mut metadata = Metadata::new();
    let mut extra_fields = Vec::new();

    for (name, value) in values {
        if is_empty_value(value) {
            continue;
        }
        let declared = properties.iter().find(|p| &p.name == name);
        match declared.and_then(|p| normalize_field(&p.property_type, value, confidence)) {
            Some(entry) => {
                metadata.insert(name.clone(), entry);
            }
            None => extra_fields.push(ExtraField {
                name: name.clone(),
                value: value.clone(),
                confidence,
            }),
        }
    }
    (metadata, extra_fields)
}

fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.trim().is_empty() || is_null_sentinel(s),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Fills a concept's field template from document text.
#[derive(Clone)]
pub struct Extractor {
    config: ExtractorConfig,
    llm: Option<Arc<dyn LlmClient>>,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config, llm: None }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract metadata for the classified concept.
    pub async fn extract(
        &self,
        ontology: &Ontology,
        text: &str,
        classification: &Classification,
    ) -> ExtractionOutcome {
        self.extract_for_concept(ontology, text, &classification.primary_concept_id)
            .await
    }

    /// Extract metadata against an explicit concept.
    ///
    /// An unknown concept or one without properties yields an empty outcome.
    /// LLM failures degrade to the line scan and are never returned.
    pub async fn extract_for_concept(
        &self,
        ontology: &Ontology,
        text: &str,
        concept_id: &str,
    ) -> ExtractionOutcome {
        let properties = match ontology.resolved_properties(concept_id) {
            Ok(props) if !props.is_empty() => props,
            Ok(_) => {
                debug!(concept_id, "Concept has no properties, nothing to extract");
                return ExtractionOutcome::default();
            }
            Err(_) => {
                debug!(concept_id, "Concept not in ontology, nothing to extract");
                return ExtractionOutcome::default();
            }
        };

        let Some(llm) = &self.llm else {
            return self.fallback(text, &properties);
        };

        let start = Instant::now();
        let fields: Vec<TemplateField> = properties.iter().map(TemplateField::from).collect();
        match llm
            .extract_metadata(excerpt(text, self.config.text_chars), concept_id, &fields)
            .await
        {
            Ok(raw) => {
                let confidence = raw
                    .confidence
                    .filter(|c| c.is_finite())
                    .unwrap_or(self.config.default_confidence)
                    .clamp(0.0, 1.0);
                let (metadata, extra_fields) =
                    normalize_properties(&properties, &raw.properties, confidence);
                let summary = raw
                    .summary
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty() && !is_null_sentinel(s));
                debug!(
                    subsystem = "extract",
                    concept_id,
                    field_count = metadata.len(),
                    extra_count = extra_fields.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Extracted metadata"
                );
                ExtractionOutcome {
                    metadata,
                    extra_fields,
                    summary,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(
                    subsystem = "extract",
                    concept_id,
                    provider = llm.provider_name(),
                    error = %e,
                    "LLM extraction failed, degrading to line scan"
                );
                self.fallback(text, &properties)
            }
        }
    }

    /// Scan lines of the form `field: value` or `field = value`.
    ///
    /// Field names match case-insensitively, with underscores also accepted as
    /// spaces (`due_date` matches "Due date: ...").
    pub fn fallback(&self, text: &str, properties: &[PropertyDef]) -> ExtractionOutcome {
        let mut metadata = Metadata::new();
        for prop in properties {
            let Some(raw) = scan_field(text, &prop.name) else {
                continue;
            };
            if let Some(entry) = normalize_field(
                &prop.property_type,
                &JsonValue::String(raw),
                self.config.fallback_confidence,
            ) {
                metadata.insert(prop.name.clone(), entry);
            }
        }
        ExtractionOutcome {
            metadata,
            extra_fields: Vec::new(),
            summary: None,
            degraded: true,
        }
    }
}

fn scan_field(text: &str, field: &str) -> Option<String> {
    let spaced = field.replace('_', " ");
    let names = if spaced == field {
        regex::escape(field)
    } else {
        format!("{}|{}", regex::escape(field), regex::escape(&spaced))
    };
    let pattern = format!(r"^[ \t]*(?:{})[ \t]*[:=][ \t]*(.+?)[ \t]*$", names);
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('\r').trim().to_string())
        .filter(|v| !v.is_empty())
}
