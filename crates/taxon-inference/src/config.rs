//! LLM provider configuration.
//!
//! Loaded from environment variables (`LLM_*`) or built explicitly. Any
//! OpenAI-compatible endpoint works: OpenAI, Azure OpenAI, OpenRouter, vLLM,
//! LM Studio, or Ollama in compatibility mode.

use std::time::Duration;

use tracing::warn;

use taxon_core::defaults::{
    ENV_LLM_API_KEY, ENV_LLM_BASE_URL, ENV_LLM_MODEL, ENV_LLM_PROVIDER, ENV_LLM_TIMEOUT_SECS,
    ENV_TOOL_MAX_ITERATIONS, LLM_BASE_URL, LLM_MODEL, LLM_TIMEOUT_SECS, TOOL_LOOP_MAX_ITERATIONS,
};
use taxon_core::{Error, Result};

/// Provider name used when `LLM_PROVIDER` is unset.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Connection and behaviour settings for [`crate::OpenAiClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct LlmConfig {
    /// Name reported in logs and provider errors.
    pub provider: String,
    /// Base URL of the chat-completions API (without `/chat/completions`).
    pub base_url: String,
    /// Bearer token; optional for local endpoints.
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_seconds: u64,
    /// Maximum model turns in one tool-calling round.
    pub max_tool_iterations: usize,
    /// Sampling temperature; `None` leaves the provider default.
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            base_url: LLM_BASE_URL.to_string(),
            api_key: None,
            model: LLM_MODEL.to_string(),
            timeout_seconds: LLM_TIMEOUT_SECS,
            max_tool_iterations: TOOL_LOOP_MAX_ITERATIONS,
            temperature: Some(0.0),
        }
    }
}

impl LlmConfig {
    /// Load from environment variables, falling back to defaults.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `LLM_PROVIDER` | `openai` |
    /// | `LLM_BASE_URL` | `https://api.openai.com/v1` |
    /// | `LLM_API_KEY` | (none) |
    /// | `LLM_MODEL` | `gpt-4o-mini` |
    /// | `LLM_TIMEOUT_SECS` | `120` |
    /// | `TAXON_TOOL_MAX_ITERATIONS` | `10` |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var(ENV_LLM_PROVIDER) {
            if !val.trim().is_empty() {
                config.provider = val.trim().to_string();
            }
        }
        if let Ok(val) = std::env::var(ENV_LLM_BASE_URL) {
            if !val.trim().is_empty() {
                config.base_url = val.trim().to_string();
            }
        }
        config.api_key = std::env::var(ENV_LLM_API_KEY)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if let Ok(val) = std::env::var(ENV_LLM_MODEL) {
            if !val.trim().is_empty() {
                config.model = val.trim().to_string();
            }
        }
        if let Ok(val) = std::env::var(ENV_LLM_TIMEOUT_SECS) {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.timeout_seconds = secs,
                _ => warn!(value = %val, "Invalid LLM_TIMEOUT_SECS, using default"),
            }
        }
        if let Ok(val) = std::env::var(ENV_TOOL_MAX_ITERATIONS) {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_tool_iterations = n,
                _ => warn!(value = %val, "Invalid TAXON_TOOL_MAX_ITERATIONS, using default"),
            }
        }
        config
    }

    /// Whether an LLM should be used at all.
    ///
    /// The hosted OpenAI endpoint needs a key; any other base URL is assumed
    /// to be a local or self-hosted server.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some() || self.base_url.trim_end_matches('/') != LLM_BASE_URL
    }

    pub fn validate(&self) -> Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(Error::Config(format!(
                "LLM base URL must be http(s): '{}'",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Config("LLM model must not be empty".into()));
        }
        if self.max_tool_iterations == 0 {
            return Err(Error::Config("tool iteration cap must be at least 1".into()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_max_tool_iterations(mut self, n: usize) -> Self {
        self.max_tool_iterations = n;
        self
    }
}
