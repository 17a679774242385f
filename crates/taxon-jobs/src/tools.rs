//! Tool handler for document tool-calling rounds.
//!
//! `get_extraction_schema` is answered from the ontology snapshot;
//! `submit_document` calls are parsed and pushed into a [`SubmissionCollector`]
//! owned by the caller.

use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use taxon_core::tools::{GET_EXTRACTION_SCHEMA, SUBMIT_DOCUMENT};
use taxon_core::{DocumentSubmission, Error, Result, ToolHandler};
use taxon_ontology::Ontology;

/// Accumulates `submit_document` calls in the order the model made them.
#[derive(Debug, Default)]
pub struct SubmissionCollector {
    submissions: Vec<DocumentSubmission>,
}

impl SubmissionCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, submission: DocumentSubmission) -> usize {
        self.submissions.push(submission);
        self.submissions.len()
    }

    pub fn len(&self) -> usize {
        self.submissions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submissions.is_empty()
    }

    pub fn submissions(&self) -> &[DocumentSubmission] {
        &self.submissions
    }

    pub fn into_submissions(self) -> Vec<DocumentSubmission> {
        self.submissions
    }
}

/// Answers the model's tool calls for one round.
pub struct DocumentToolDispatcher<'a> {
    ontology: &'a Ontology,
    collector: &'a mut SubmissionCollector,
}

impl<'a> DocumentToolDispatcher<'a> {
    pub fn new(ontology: &'a Ontology, collector: &'a mut SubmissionCollector) -> Self {
        Self {
            ontology,
            collector,
        }
    }

    fn extraction_schema(&self, args: &JsonValue) -> Result<JsonValue> {
        let concept_id = args
            .get("concept_id")
            .and_then(JsonValue::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                Error::InvalidInput("get_extraction_schema requires concept_id".into())
            })?;
        let schema = self.ontology.extraction_schema(concept_id)?;
        debug!(
            concept_id,
            properties = schema.properties.len(),
            "Served extraction schema"
        );
        Ok(serde_json::to_value(schema)?)
    }

    fn submit(&mut self, args: &JsonValue) -> Result<JsonValue> {
        let submission = DocumentSubmission::from_args(args)?;
        if !self.ontology.is_classifiable(&submission.concept_id) {
            let reason = if self.ontology.contains(&submission.concept_id) {
                "is abstract and cannot be assigned"
            } else {
                "is not a known concept"
            };
            return Err(Error::InvalidInput(format!(
                "'{}' {}; pick one from the catalogue",
                submission.concept_id, reason
            )));
        }
        let concept_id = submission.concept_id.clone();
        let index = self.collector.push(submission);
        debug!(concept_id = %concept_id, document_index = index, "Document submitted");
        Ok(json!({ "status": "accepted", "document_index": index }))
    }
}

impl ToolHandler for DocumentToolDispatcher<'_> {
    fn handle(&mut self, tool_name: &str, args: &JsonValue) -> Result<JsonValue> {
        let result = match tool_name {
            GET_EXTRACTION_SCHEMA => self.extraction_schema(args),
            SUBMIT_DOCUMENT => self.submit(args),
            other => Err(Error::InvalidInput(format!("unknown tool '{}'", other))),
        };
        if let Err(ref e) = result {
            warn!(tool = tool_name, error = %e, "Tool call rejected");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taxon_core::{Concept, PropertyDef};

    fn ontology() -> Ontology {
        Ontology::new(
            vec![
                Concept::new("Document").abstract_concept(),
                Concept::new("Invoice")
                    .inheriting("Document")
                    .with_property(PropertyDef::new("invoice_number", "string")),
            ],
            vec![],
            vec![],
        )
    }

    #[test]
    fn test_schema_lookup() {
        let onto = ontology();
        let mut collector = SubmissionCollector::new();
        let mut dispatcher = DocumentToolDispatcher::new(&onto, &mut collector);
        let schema = dispatcher
            .handle(GET_EXTRACTION_SCHEMA, &json!({"concept_id": "Invoice"}))
            .unwrap();
        assert_eq!(schema["concept_id"], "Invoice");
        assert_eq!(schema["properties"][0]["name"], "invoice_number");

        assert!(dispatcher
            .handle(GET_EXTRACTION_SCHEMA, &json!({"concept_id": "Nope"}))
            .is_err());
        assert!(dispatcher.handle(GET_EXTRACTION_SCHEMA, &json!({})).is_err());
    }

    #[test]
    fn test_submissions_are_collected_in_order() {
        let onto = ontology();
        let mut collector = SubmissionCollector::new();
        {
            let mut dispatcher = DocumentToolDispatcher::new(&onto, &mut collector);
            let first = dispatcher
                .handle(SUBMIT_DOCUMENT, &json!({"concept_id": "Invoice", "page_range": "1"}))
                .unwrap();
            assert_eq!(first["document_index"], 1);
            dispatcher
                .handle(SUBMIT_DOCUMENT, &json!({"concept_id": "Invoice", "page_range": "2-3"}))
                .unwrap();
            assert!(dispatcher
                .handle(SUBMIT_DOCUMENT, &json!({"concept_id": "Spaceship"}))
                .is_err());
        }
        assert_eq!(collector.len(), 2);
        let ranges: Vec<String> = collector
            .submissions()
            .iter()
            .map(|s| s.page_range.map(|r| r.to_string()).unwrap_or_default())
            .collect();
        assert_eq!(ranges, vec!["1", "2-3"]);
    }

    #[test]
    fn test_abstract_concept_submission_rejected() {
        let onto = ontology();
        let mut collector = SubmissionCollector::new();
        {
            let mut dispatcher = DocumentToolDispatcher::new(&onto, &mut collector);
            let err = dispatcher
                .handle(SUBMIT_DOCUMENT, &json!({"concept_id": "Document"}))
                .unwrap_err();
            assert!(err.to_string().contains("abstract"));

            // Schema lookups on abstract concepts stay available.
            assert!(dispatcher
                .handle(GET_EXTRACTION_SCHEMA, &json!({"concept_id": "Document"}))
                .is_ok());
        }
        assert!(collector.is_empty());
    }

    #[test]
    fn test_unknown_tool_rejected() {
        let onto = ontology();
        let mut collector = SubmissionCollector::new();
        let mut dispatcher = DocumentToolDispatcher::new(&onto, &mut collector);
        assert!(dispatcher.handle("rm_rf", &json!({})).is_err());
        assert!(collector.is_empty());
    }
}
