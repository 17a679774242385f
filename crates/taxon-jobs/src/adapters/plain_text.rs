//! Plain-text extraction: reads the file as UTF-8.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use taxon_core::{Result, TextExtractor};

/// MIME types read verbatim besides `text/*`.
const TEXTUAL_MIME_TYPES: &[&str] = &[
    "application/json",
    "application/xml",
    "application/x-yaml",
    "application/yaml",
    "application/csv",
    "application/x-ndjson",
];

/// Reads text-like files, replacing invalid UTF-8 sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

#[async_trait]
impl TextExtractor for PlainTextExtractor {
    fn can_extract(&self, mime_type: &str) -> bool {
        let mime = mime_type.trim().to_ascii_lowercase();
        let base = mime.split(';').next().unwrap_or_default().trim();
        base.starts_with("text/") || TEXTUAL_MIME_TYPES.contains(&base)
    }

    async fn extract_text(&self, path: &Path, mime_type: &str) -> Result<String> {
        let data = tokio::fs::read(path).await?;
        let text = String::from_utf8_lossy(&data).into_owned();
        debug!(
            subsystem = "jobs",
            component = "plain_text",
            mime_type,
            chars = text.len(),
            "Read text file"
        );
        Ok(text)
    }
}
