//! Content type detection for uploaded files.

/// Fallback when nothing matches.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Detect the MIME type from magic bytes, falling back to the extension.
pub fn detect_content_type(filename: &str, data: &[u8]) -> String {
    if let Some(kind) = infer::get(data) {
        return kind.mime_type().to_string();
    }

    filename
        .rsplit_once('.')
        .and_then(|(_, ext)| mime_from_extension(ext))
        .unwrap_or(OCTET_STREAM)
        .to_string()
}

/// Types without magic bytes, keyed by extension.
fn mime_from_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext.to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "ndjson" | "jsonl" => "application/x-ndjson",
        "xml" => "application/xml",
        "yaml" | "yml" => "application/yaml",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}

/// File extension for a stored capture of the given MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "application/pdf" => "pdf",
        _ => "bin",
    }
}
