//! # taxon-inference
//!
//! LLM access for taxon.
//!
//! This crate provides:
//! - [`LlmConfig`], loaded from `LLM_*` environment variables
//! - [`OpenAiClient`], an [`LlmClient`] for any OpenAI-compatible endpoint,
//!   including the multi-turn tool-calling loop used for PDFs and images
//! - [`build_llm_client`], which returns `None` when no provider is configured
//! - `mock::MockLlmClient` (feature `mock`) for deterministic tests

use std::sync::Arc;

use tracing::{info, warn};

pub mod config;
pub mod openai;
pub mod prompts;

// Scriptable client for tests
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use config::LlmConfig;
pub use openai::OpenAiClient;
pub use taxon_core::{LlmClient, Result};

/// Build the configured LLM client, or `None` to run rules-only.
///
/// A client that fails to initialize is logged and treated as absent so the
/// worker can still classify by patterns and hints.
pub fn build_llm_client(config: LlmConfig) -> Option<Arc<dyn LlmClient>> {
    if !config.is_configured() {
        info!("No LLM provider configured, running rules-only classification");
        return None;
    }
    match OpenAiClient::new(config) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            warn!(error = %e, "LLM client unavailable, running rules-only classification");
            None
        }
    }
}
