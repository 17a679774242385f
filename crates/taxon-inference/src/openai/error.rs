//! Mapping of OpenAI-compatible error responses onto taxon errors.

use taxon_core::Error;

/// Coarse categories of provider failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAIErrorCode {
    AuthenticationError,
    RateLimitExceeded,
    ModelNotFound,
    ContextLengthExceeded,
    ServerError,
    Unknown,
}

impl OpenAIErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401 | 403, _) => Self::AuthenticationError,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }

    fn label(&self) -> &'static str {
        match self {
            Self::AuthenticationError => "Authentication failed",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::ModelNotFound => "Model not found",
            Self::ContextLengthExceeded => "Context too long",
            Self::ServerError => "Server error",
            Self::Unknown => "Request failed",
        }
    }
}

/// Build a provider error that keeps the HTTP status, so callers can tell
/// authentication failures apart.
pub fn to_provider_error(provider: &str, status: u16, error_type: &str, message: &str) -> Error {
    let code = OpenAIErrorCode::from_response(status, error_type);
    Error::provider(provider, Some(status), format!("{}: {}", code.label(), message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        assert_eq!(
            OpenAIErrorCode::from_response(401, "invalid_api_key"),
            OpenAIErrorCode::AuthenticationError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(403, ""),
            OpenAIErrorCode::AuthenticationError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(429, "rate_limit_exceeded"),
            OpenAIErrorCode::RateLimitExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(400, "model_not_found"),
            OpenAIErrorCode::ModelNotFound
        );
        assert_eq!(
            OpenAIErrorCode::from_response(400, "context_length_exceeded"),
            OpenAIErrorCode::ContextLengthExceeded
        );
        assert_eq!(
            OpenAIErrorCode::from_response(502, "bad_gateway"),
            OpenAIErrorCode::ServerError
        );
        assert_eq!(
            OpenAIErrorCode::from_response(418, "im_a_teapot"),
            OpenAIErrorCode::Unknown
        );
    }

    #[test]
    fn test_retryable() {
        assert!(OpenAIErrorCode::RateLimitExceeded.is_retryable());
        assert!(OpenAIErrorCode::ServerError.is_retryable());
        assert!(!OpenAIErrorCode::AuthenticationError.is_retryable());
    }

    #[test]
    fn test_provider_error_keeps_status() {
        let err = to_provider_error("openai", 401, "invalid_api_key", "bad key");
        assert!(err.is_auth_failure());
        assert_eq!(
            err.to_string(),
            "Provider error (openai, HTTP 401): Authentication failed: bad key"
        );

        let err = to_provider_error("openai", 500, "", "boom");
        assert!(!err.is_auth_failure());
    }
}
