//! Filesystem storage backend for uploaded and captured files.
//!
//! Files are written under a base directory using date-sharded, UUIDv7-prefixed
//! paths: `{yyyy}/{mm}/{dd}/{uuid}-{sanitized-filename}`. Writes are atomic
//! (temp file + rename). Stored paths are relative to the base directory.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use taxon_core::{new_v7, Error, Result, StorageBackend};

/// Maximum length kept from the original filename.
const MAX_FILENAME_CHARS: usize = 100;

/// Local-disk [`StorageBackend`].
#[derive(Debug, Clone)]
pub struct FilesystemStorage {
    base_path: PathBuf,
}

impl FilesystemStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a stored path, refusing anything that escapes the base directory.
    fn full_path(&self, stored_path: &str) -> Result<PathBuf> {
        let relative = Path::new(stored_path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || stored_path.is_empty() {
            return Err(Error::InvalidInput(format!(
                "invalid stored path '{}'",
                stored_path
            )));
        }
        Ok(self.base_path.join(relative))
    }
}

/// Compute BLAKE3 hash of data with "blake3:" prefix.
pub fn compute_content_hash(data: &[u8]) -> String {
    format!("blake3:{}", blake3::hash(data).to_hex())
}

/// Reduce a user-supplied filename to `[A-Za-z0-9._-]`.
pub fn sanitize_filename(filename: &str) -> String {
    let base = Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_FILENAME_CHARS)
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

#[async_trait]
impl StorageBackend for FilesystemStorage {
    async fn store(&self, data: &[u8], filename: &str) -> Result<String> {
        let now = Utc::now();
        let stored_path = format!(
            "{}/{}-{}",
            now.format("%Y/%m/%d"),
            new_v7(),
            sanitize_filename(filename)
        );
        let full_path = self.full_path(&stored_path)?;

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "file_storage: create_dir_all failed");
                e
            })?;
        }

        let temp_path = full_path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "file_storage: rename failed");
            e
        })?;

        debug!(
            subsystem = "db",
            component = "file_storage",
            stored_path = %stored_path,
            size = data.len(),
            content_hash = %compute_content_hash(data),
            "Stored file"
        );
        Ok(stored_path)
    }

    async fn read(&self, stored_path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(stored_path)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("stored file '{}'", stored_path)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn local_path(&self, stored_path: &str) -> PathBuf {
        self.base_path.join(stored_path)
    }

    async fn delete(&self, stored_path: &str) -> Result<bool> {
        let full_path = self.full_path(stored_path)?;
        match fs::remove_file(&full_path).await {
            Ok(()) => {
                debug!(stored_path = %stored_path, "Deleted stored file");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_read_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());

        let stored = storage.store(b"hello", "report.pdf").await.unwrap();
        assert!(stored.ends_with("-report.pdf"));
        assert_eq!(stored.split('/').count(), 4);
        assert!(storage.local_path(&stored).exists());
        assert_eq!(storage.read(&stored).await.unwrap(), b"hello");

        assert!(storage.delete(&stored).await.unwrap());
        assert!(!storage.delete(&stored).await.unwrap());
        assert!(storage.read(&stored).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_same_filename_gets_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        let a = storage.store(b"a", "scan.png").await.unwrap();
        let b = storage.store(b"b", "scan.png").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FilesystemStorage::new(dir.path());
        assert!(storage.read("../etc/passwd").await.is_err());
        assert!(storage.delete("/etc/passwd").await.is_err());
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Factuur 2025 (1).pdf"), "Factuur_2025__1_.pdf");
        assert_eq!(sanitize_filename("../../secret.txt"), "secret.txt");
        assert_eq!(sanitize_filename("..."), "file");
        assert_eq!(sanitize_filename(""), "file");
    }

    #[test]
    fn test_content_hash_prefix() {
        let hash = compute_content_hash(b"abc");
        assert!(hash.starts_with("blake3:"));
        assert_eq!(hash.len(), "blake3:".len() + 64);
    }
}
