//! Tool-calling contract shared by LLM clients and the pipeline.
//!
//! The model is offered two tools. `get_extraction_schema` is answered
//! synchronously from the ontology; `submit_document` is emitted once per
//! distinct document found in the input and collected by the handler.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::defaults::LLM_DEFAULT_CONFIDENCE;
use crate::error::{Error, Result};
use crate::models::PageRange;

pub const GET_EXTRACTION_SCHEMA: &str = "get_extraction_schema";
pub const SUBMIT_DOCUMENT: &str = "submit_document";

/// Provider-neutral description of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the arguments object.
    pub parameters: JsonValue,
}

/// The two tools offered during a document tool-calling round.
pub fn document_tools() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: GET_EXTRACTION_SCHEMA.to_string(),
            description: "Return the fields to extract for a concept, including inherited \
                          properties and applicable embedded types."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "concept_id": {"type": "string", "description": "Concept id from the catalogue"}
                },
                "required": ["concept_id"]
            }),
        },
        ToolSpec {
            name: SUBMIT_DOCUMENT.to_string(),
            description: "Submit one distinct document found in the input. Call once per \
                          document; include its page range when the input holds several."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "concept_id": {"type": "string"},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                    "reasoning": {"type": "string"},
                    "page_range": {"type": "string", "description": "e.g. \"1-3\" or \"4\""},
                    "extracted_properties": {"type": "object"},
                    "summary": {"type": "string"}
                },
                "required": ["concept_id", "confidence", "extracted_properties"]
            }),
        },
    ]
}

/// Receives tool calls from the model. Implementations answer synchronously.
pub trait ToolHandler: Send {
    /// Handle one tool call; the returned value is sent back to the model.
    fn handle(&mut self, tool_name: &str, args: &JsonValue) -> Result<JsonValue>;
}

/// Outcome of a tool-calling round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolLoopReport {
    /// Model turns taken.
    pub iterations: usize,
    /// Tool calls dispatched to the handler.
    pub tool_calls: usize,
    /// The round stopped because the iteration cap was reached.
    pub hit_iteration_cap: bool,
}

/// One `submit_document` call.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSubmission {
    pub concept_id: String,
    pub confidence: f32,
    pub reasoning: Option<String>,
    pub page_range: Option<PageRange>,
    pub extracted_properties: serde_json::Map<String, JsonValue>,
    pub summary: Option<String>,
}

impl DocumentSubmission {
    /// Parse `submit_document` arguments.
    ///
    /// Only `concept_id` is mandatory. A malformed page range is dropped
    /// rather than rejecting the whole submission.
    pub fn from_args(args: &JsonValue) -> Result<Self> {
        let concept_id = args
            .get("concept_id")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidInput("submit_document requires concept_id".into()))?
            .to_string();

        let confidence = args
            .get("confidence")
            .and_then(JsonValue::as_f64)
            .map(|c| c as f32)
            .unwrap_or(LLM_DEFAULT_CONFIDENCE)
            .clamp(0.0, 1.0);

        let page_range = match args.get("page_range") {
            Some(JsonValue::String(s)) => s.parse().ok(),
            Some(JsonValue::Number(n)) => n
                .as_u64()
                .and_then(|p| u32::try_from(p).ok())
                .map(|p| PageRange::new(p, p)),
            _ => None,
        };

        let extracted_properties = match args.get("extracted_properties") {
            Some(JsonValue::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };

        Ok(Self {
            concept_id,
            confidence,
            reasoning: non_empty_str(args.get("reasoning")),
            page_range,
            extracted_properties,
            summary: non_empty_str(args.get("summary")),
        })
    }
}

fn non_empty_str(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
