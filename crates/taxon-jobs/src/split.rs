//! Mapping of tool-round submissions onto resources.
//!
//! One submission updates the root in place. Each further submission becomes a
//! child resource that points back at the root and shares its stored file.

use chrono::Utc;
use tracing::debug;

use taxon_classify::normalize_properties;
use taxon_core::{
    Classification, ClassificationSignal, DocumentSubmission, Error, Resource, ResourceStatus,
    Result, SignalMethod,
};
use taxon_ontology::Ontology;

/// Error text recorded when a tool round ends without any submission.
pub const NO_SUBMISSIONS_MSG: &str = "model submitted no documents";

/// Classification carried by a single submission.
pub fn submission_classification(submission: &DocumentSubmission) -> Classification {
    let explanation = submission
        .reasoning
        .clone()
        .unwrap_or_else(|| "submitted via tool call".to_string());
    Classification {
        primary_concept_id: submission.concept_id.clone(),
        confidence: submission.confidence,
        signals: vec![ClassificationSignal {
            method: SignalMethod::ToolCalling,
            concept_id: submission.concept_id.clone(),
            raw_score: submission.confidence,
            score: submission.confidence,
            explanation,
        }],
        reasoning: submission.reasoning.clone(),
    }
}

/// Write one submission's results into `resource` and mark it done.
fn apply_one(ontology: &Ontology, resource: &mut Resource, submission: &DocumentSubmission) {
    let properties = ontology
        .resolved_properties(&submission.concept_id)
        .unwrap_or_default();
    let (metadata, extra_fields) = normalize_properties(
        &properties,
        &submission.extracted_properties,
        submission.confidence,
    );

    let now = Utc::now();
    resource.classification = Some(submission_classification(submission));
    resource.metadata = metadata;
    resource.extra_fields = extra_fields;
    resource.summary = submission.summary.clone();
    resource.page_range = submission.page_range;
    resource.status = ResourceStatus::Done;
    resource.error_message = None;
    resource.processed_at = Some(now);
    resource.updated_at = now;
}

/// Apply submissions to `root`; returns the new child resources (not yet
/// persisted).
pub fn apply_submissions(
    ontology: &Ontology,
    root: &mut Resource,
    submissions: &[DocumentSubmission],
) -> Result<Vec<Resource>> {
    let (first, rest) = submissions
        .split_first()
        .ok_or_else(|| Error::Internal(NO_SUBMISSIONS_MSG.to_string()))?;

    apply_one(ontology, root, first);

    let children: Vec<Resource> = rest
        .iter()
        .map(|submission| {
            let mut child = root.child(submission.page_range);
            child.language = root.language.clone();
            child.timings = root.timings.clone();
            apply_one(ontology, &mut child, submission);
            child
        })
        .collect();

    debug!(
        resource_id = %root.id,
        submission_count = submissions.len(),
        children = children.len(),
        "Applied tool-round submissions"
    );
    Ok(children)
}
