//! Error types for taxon.

use thiserror::Error;

/// Result type alias using taxon's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for taxon operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Concept, resource, or job not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate concept id
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Mutating a system-layer concept, or deleting a concept with children
    #[error("Protected concept: {0}")]
    ProtectedConcept(String),

    /// LLM or HTTP provider failure
    #[error("Provider error ({provider}{}): {message}", fmt_status(.status))]
    Provider {
        provider: String,
        status: Option<u16>,
        message: String,
    },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(", HTTP {}", s)).unwrap_or_default()
}

impl Error {
    /// Build a provider error.
    pub fn provider(provider: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// True when the provider rejected our credentials (HTTP 401/403).
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::Provider {
                status: Some(401) | Some(403),
                ..
            }
        )
    }

    /// True for a missing concept/resource/job.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Provider {
            provider: "http".to_string(),
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}
