//! [`TextExtractor`] adapters.
//!
//! | Adapter | Handles |
//! |---------|---------|
//! | [`PlainTextExtractor`] | `text/*`, JSON, XML, YAML, CSV |
//! | [`PdfTextExtractor`] | `application/pdf` via `pdftotext` |
//! | [`CompositeTextExtractor`] | first registered adapter that accepts the MIME type |

mod pdf_text;
mod plain_text;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use taxon_core::{Error, Result, TextExtractor};

pub use pdf_text::PdfTextExtractor;
pub use plain_text::PlainTextExtractor;

/// Dispatches to the first adapter whose `can_extract` accepts the MIME type.
#[derive(Clone, Default)]
pub struct CompositeTextExtractor {
    adapters: Vec<Arc<dyn TextExtractor>>,
}

impl CompositeTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text and PDF adapters.
    pub fn standard() -> Self {
        Self::new()
            .with(Arc::new(PlainTextExtractor))
            .with(Arc::new(PdfTextExtractor::new()))
    }

    pub fn with(mut self, adapter: Arc<dyn TextExtractor>) -> Self {
        self.adapters.push(adapter);
        self
    }

    fn adapter_for(&self, mime_type: &str) -> Option<&Arc<dyn TextExtractor>> {
        self.adapters.iter().find(|a| a.can_extract(mime_type))
    }
}

#[async_trait]
impl TextExtractor for CompositeTextExtractor {
    fn can_extract(&self, mime_type: &str) -> bool {
        self.adapter_for(mime_type).is_some()
    }

    async fn extract_text(&self, path: &Path, mime_type: &str) -> Result<String> {
        match self.adapter_for(mime_type) {
            Some(adapter) => adapter.extract_text(path, mime_type).await,
            None => Err(Error::InvalidInput(format!(
                "no text extractor for MIME type '{}'",
                mime_type
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_composite_routes_by_mime() {
        let composite = CompositeTextExtractor::standard();
        assert!(composite.can_extract("text/plain"));
        assert!(composite.can_extract("application/pdf"));
        assert!(!composite.can_extract("image/jpeg"));
    }

    #[tokio::test]
    async fn test_unsupported_mime_is_invalid_input() {
        let err = CompositeTextExtractor::new()
            .extract_text(Path::new("/tmp/a.png"), "image/png")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
