//! PDF text extraction via `pdftotext` (poppler-utils).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use taxon_core::defaults::EXTRACTION_CMD_TIMEOUT_SECS;
use taxon_core::{Error, Result, TextExtractor};

/// Runs `pdftotext -layout <file> -` with a per-command timeout.
///
/// Scanned PDFs without a text layer yield an empty string rather than an
/// error; the pipeline then classifies by filename alone.
#[derive(Debug, Clone)]
pub struct PdfTextExtractor {
    binary: String,
    timeout_secs: u64,
}

impl Default for PdfTextExtractor {
    fn default() -> Self {
        Self {
            binary: "pdftotext".to_string(),
            timeout_secs: EXTRACTION_CMD_TIMEOUT_SECS,
        }
    }
}

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different `pdftotext` executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }
}

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| Error::Internal(format!("External command timed out after {}s", timeout_secs)))?
        .map_err(|e| Error::Internal(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Internal(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    fn can_extract(&self, mime_type: &str) -> bool {
        mime_type.trim().eq_ignore_ascii_case("application/pdf")
    }

    async fn extract_text(&self, path: &Path, _mime_type: &str) -> Result<String> {
        let text = run_cmd_with_timeout(
            Command::new(&self.binary)
                .arg("-layout")
                .arg(path)
                .arg("-")
                .kill_on_drop(true),
            self.timeout_secs,
        )
        .await?;

        if text.trim().is_empty() {
            warn!(
                subsystem = "jobs",
                component = "pdf_text",
                path = %path.display(),
                "PDF has no text layer"
            );
        } else {
            debug!(
                subsystem = "jobs",
                component = "pdf_text",
                chars = text.len(),
                "Extracted PDF text"
            );
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_extract_pdf_only() {
        let extractor = PdfTextExtractor::new();
        assert!(extractor.can_extract("application/pdf"));
        assert!(extractor.can_extract("Application/PDF"));
        assert!(!extractor.can_extract("text/plain"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_internal_error() {
        let extractor = PdfTextExtractor::new().with_binary("taxon-no-such-pdftotext");
        let err = extractor
            .extract_text(Path::new("/tmp/x.pdf"), "application/pdf")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to execute command"));
    }
}
