//! OpenAI-compatible chat-completions client.
//!
//! Works with any endpoint that speaks the chat-completions protocol with
//! tool calling:
//!
//! - OpenAI cloud API
//! - Azure OpenAI
//! - OpenRouter
//! - vLLM, LM Studio, Ollama (OpenAI compatibility mode)
//!
//! # Example
//!
//! ```rust,no_run
//! use taxon_inference::{LlmConfig, OpenAiClient};
//!
//! let config = LlmConfig::default()
//!     .with_base_url("http://localhost:11434/v1")
//!     .with_model("llama3.2-vision");
//! let client = OpenAiClient::new(config).unwrap();
//! ```

mod client;
pub mod error;
pub mod types;

pub use client::{parse_json_object, OpenAiClient};
pub use error::{to_provider_error, OpenAIErrorCode};
