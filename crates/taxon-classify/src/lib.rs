//! # taxon-classify
//!
//! Classification and metadata extraction for taxon.
//!
//! - [`Classifier`]: weighted file-pattern, hint, and LLM signals
//! - [`Extractor`]: template-driven extraction with a line-scan fallback
//! - [`normalize`]: date and amount normalization
//! - [`detect_language`]: stop-word language tagging

pub mod classifier;
pub mod extractor;
pub mod language;
pub mod normalize;

pub use classifier::{override_classification, Classifier, ClassifierConfig};
pub use extractor::{normalize_properties, ExtractionOutcome, Extractor, ExtractorConfig};
pub use language::detect_language;
pub use normalize::{normalize_date, normalize_field, parse_number};

/// The first `max_chars` characters of `text`, cut on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
