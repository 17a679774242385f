//! Prompt text for classification, extraction and tool-calling rounds.

use taxon_core::{ConceptCatalogueEntry, TemplateField};

pub const CLASSIFY_SYSTEM: &str = "You classify business documents into an ontology. \
Answer with a single JSON object: {\"concept_id\": string, \"confidence\": number between 0 and 1, \
\"reasoning\": string}. Use only concept ids from the catalogue. If nothing fits, use \"Unknown\" \
with a low confidence.";

pub const EXTRACT_SYSTEM: &str = "You extract structured metadata from documents. Answer with a \
single JSON object: {\"properties\": object, \"summary\": string, \"confidence\": number between 0 \
and 1}. Only fill fields listed in the template. Leave out fields you cannot find. Dates use \
YYYY-MM-DD; numbers are plain JSON numbers.";

pub const TOOLS_SYSTEM: &str = "You process a document that may contain several distinct \
documents (for example a scan holding two invoices). For each distinct document: pick a concept \
from the catalogue, call get_extraction_schema for it, then call submit_document once with the \
concept id, confidence, page range, extracted properties and a one-sentence summary. When every \
document is submitted, stop calling tools and reply with a short confirmation.";

/// Render the concept catalogue as compact JSON lines.
pub fn render_catalogue(concepts: &[ConceptCatalogueEntry]) -> String {
    concepts
        .iter()
        .filter_map(|c| serde_json::to_string(c).ok())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn classify_user(excerpt: &str, concepts: &[ConceptCatalogueEntry]) -> String {
    format!(
        "Concept catalogue:\n{}\n\nDocument excerpt:\n\"\"\"\n{}\n\"\"\"",
        render_catalogue(concepts),
        excerpt
    )
}

pub fn extract_user(text: &str, concept_id: &str, fields: &[TemplateField]) -> String {
    let template = serde_json::to_string_pretty(fields).unwrap_or_else(|_| "[]".to_string());
    format!(
        "Document type: {}\nTemplate fields:\n{}\n\nDocument text:\n\"\"\"\n{}\n\"\"\"",
        concept_id, template, text
    )
}

pub fn tools_user(source: &str, concepts: &[ConceptCatalogueEntry]) -> String {
    format!(
        "Source: {}\n\nConcept catalogue:\n{}",
        source,
        render_catalogue(concepts)
    )
}
