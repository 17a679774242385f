//! Processed documents and their classification/extraction results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Error;
use crate::uuid_utils::new_v7;

/// Concept id used when nothing could be classified.
pub const UNKNOWN_CONCEPT: &str = "Unknown";

/// Per-resource processing state.
///
/// Standard path: `Pending → ExtractingText → Classifying → ExtractingMetadata → Done`.
/// PDF/image inputs with an LLM take `Pending → Classifying → Done`.
/// Any stage may end in `Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceStatus {
    Pending,
    ExtractingText,
    Classifying,
    ExtractingMetadata,
    Done,
    Error,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Pending => "PENDING",
            ResourceStatus::ExtractingText => "EXTRACTING_TEXT",
            ResourceStatus::Classifying => "CLASSIFYING",
            ResourceStatus::ExtractingMetadata => "EXTRACTING_METADATA",
            ResourceStatus::Done => "DONE",
            ResourceStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResourceStatus::Done | ResourceStatus::Error)
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(ResourceStatus::Pending),
            "EXTRACTING_TEXT" => Ok(ResourceStatus::ExtractingText),
            "CLASSIFYING" => Ok(ResourceStatus::Classifying),
            "EXTRACTING_METADATA" => Ok(ResourceStatus::ExtractingMetadata),
            "DONE" => Ok(ResourceStatus::Done),
            "ERROR" => Ok(ResourceStatus::Error),
            other => Err(Error::InvalidInput(format!(
                "unknown resource status '{}'",
                other
            ))),
        }
    }
}

/// Source of a classification vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalMethod {
    FilePattern,
    Hint,
    Llm,
    ToolCalling,
    Override,
    Fallback,
}

/// One scored vote contributing to a classification decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSignal {
    pub method: SignalMethod,
    pub concept_id: String,
    /// Raw score in `[0, 1]` before weighting.
    pub raw_score: f32,
    /// Weighted contribution added to the concept's accumulator.
    pub score: f32,
    pub explanation: String,
}

/// Result of classifying a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub primary_concept_id: String,
    pub confidence: f32,
    #[serde(default)]
    pub signals: Vec<ClassificationSignal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl Classification {
    /// `{"Unknown", 0.0, []}`.
    pub fn unknown() -> Self {
        Self {
            primary_concept_id: UNKNOWN_CONCEPT.to_string(),
            confidence: 0.0,
            signals: Vec::new(),
            reasoning: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.primary_concept_id == UNKNOWN_CONCEPT
    }
}

/// Typed metadata value, tagged by its normalized kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Boolean(bool),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            FieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            FieldValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// A normalized metadata field with its provenance sidecar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub value: FieldValue,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
}

/// Field-name keyed metadata map.
pub type Metadata = BTreeMap<String, MetadataEntry>;

/// A value the model returned for a field outside the concept template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraField {
    pub name: String,
    pub value: JsonValue,
    pub confidence: f32,
}

/// Inclusive page span of a sub-document inside its source upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

impl FromStr for PageRange {
    type Err = Error;

    /// Accepts `"3"`, `"1-3"`, `"1 - 3"`, and en-dash ranges.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidInput(format!("invalid page range '{}'", s));
        let normalized = s.trim().replace('\u{2013}', "-");
        let parse = |part: &str| part.trim().parse::<u32>().map_err(|_| invalid());
        match normalized.split_once('-') {
            Some((start, end)) => Ok(PageRange::new(parse(start)?, parse(end)?)),
            None => {
                let page = parse(&normalized)?;
                Ok(PageRange::new(page, page))
            }
        }
    }
}

impl TryFrom<String> for PageRange {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PageRange> for String {
    fn from(range: PageRange) -> Self {
        range.to_string()
    }
}

/// Stage durations recorded by the pipeline, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingTimings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_extraction_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<u64>,
}

/// A processed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Uuid,
    pub data_source_id: Option<Uuid>,
    pub filename: String,
    pub mime_type: String,
    pub stored_path: String,
    /// Path the file was ingested from, fed back to the path-pattern signal
    /// on reprocessing.
    pub source_path: Option<String>,
    /// Page URL for screenshot captures.
    pub source_url: Option<String>,
    pub status: ResourceStatus,
    pub classification: Option<Classification>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub extra_fields: Vec<ExtraField>,
    pub summary: Option<String>,
    pub extracted_text: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub timings: ProcessingTimings,
    pub error_message: Option<String>,
    /// Root upload this sub-document was split from.
    pub origin_file_id: Option<Uuid>,
    pub page_range: Option<PageRange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Resource {
    /// A new `Pending` resource for a stored file.
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        stored_path: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: new_v7(),
            data_source_id: None,
            filename: filename.into(),
            mime_type: mime_type.into(),
            stored_path: stored_path.into(),
            source_path: None,
            source_url: None,
            status: ResourceStatus::Pending,
            classification: None,
            metadata: Metadata::new(),
            extra_fields: Vec::new(),
            summary: None,
            extracted_text: None,
            language: None,
            timings: ProcessingTimings::default(),
            error_message: None,
            origin_file_id: None,
            page_range: None,
            created_at: now,
            updated_at: now,
            processed_at: None,
        }
    }

    pub fn with_data_source(mut self, data_source_id: Option<Uuid>) -> Self {
        self.data_source_id = data_source_id;
        self
    }

    pub fn with_source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// A split sub-document sharing this resource's stored file.
    pub fn child(&self, page_range: Option<PageRange>) -> Self {
        let mut child = Resource::new(&self.filename, &self.mime_type, &self.stored_path)
            .with_data_source(self.data_source_id);
        child.source_path = self.source_path.clone();
        child.source_url = self.source_url.clone();
        child.origin_file_id = Some(self.id);
        child.page_range = page_range;
        child
    }

    /// Reset to `Pending` and clear every derived field.
    pub fn reset_derived(&mut self) {
        self.status = ResourceStatus::Pending;
        self.classification = None;
        self.metadata.clear();
        self.extra_fields.clear();
        self.summary = None;
        self.extracted_text = None;
        self.language = None;
        self.timings = ProcessingTimings::default();
        self.error_message = None;
        self.page_range = None;
        self.processed_at = None;
        self.updated_at = Utc::now();
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type.eq_ignore_ascii_case("application/pdf")
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.to_ascii_lowercase().starts_with("image/")
    }

    /// Root of this resource's logical group.
    pub fn root_id(&self) -> Uuid {
        self.origin_file_id.unwrap_or(self.id)
    }
}
