//! Scriptable [`LlmClient`] for deterministic tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use taxon_inference::mock::MockLlmClient;
//!
//! let llm = MockLlmClient::new()
//!     .with_classification("Invoice", 0.9)
//!     .with_tool_call("get_extraction_schema", json!({"concept_id": "Invoice"}))
//!     .with_tool_call("submit_document", json!({"concept_id": "Invoice", "confidence": 0.9}));
//! ```
//!
//! Every operation that was not scripted fails with a provider error, so a
//! test only gets LLM behaviour it asked for.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use taxon_core::defaults::TOOL_LOOP_MAX_ITERATIONS;
use taxon_core::{
    ConceptCatalogueEntry, Error, LlmClassification, LlmClient, LlmExtraction, Result,
    TemplateField, ToolHandler, ToolLoopReport,
};

/// Mock LLM client. Clones share the call log.
#[derive(Clone)]
pub struct MockLlmClient {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    tool_responses: Arc<Mutex<Vec<JsonValue>>>,
}

#[derive(Debug, Clone)]
enum Scripted<T> {
    Unset,
    Ok(T),
    Fail(Option<u16>, String),
}

#[derive(Debug, Clone)]
struct MockConfig {
    provider: String,
    classification: Scripted<LlmClassification>,
    extraction: Scripted<LlmExtraction>,
    tools: Scripted<Vec<(String, JsonValue)>>,
    max_iterations: usize,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            classification: Scripted::Unset,
            extraction: Scripted::Unset,
            tools: Scripted::Unset,
            max_iterations: TOOL_LOOP_MAX_ITERATIONS,
        }
    }
}

/// One recorded call.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
    pub timestamp: std::time::Instant,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
            tool_responses: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).provider = name.into();
        self
    }

    /// Answer every classification request with this concept.
    pub fn with_classification(mut self, concept_id: impl Into<String>, confidence: f32) -> Self {
        Arc::make_mut(&mut self.config).classification = Scripted::Ok(LlmClassification {
            concept_id: concept_id.into(),
            confidence,
            reasoning: Some("mock classification".to_string()),
        });
        self
    }

    pub fn failing_classification(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).classification = Scripted::Fail(None, message.into());
        self
    }

    pub fn with_extraction(mut self, extraction: LlmExtraction) -> Self {
        Arc::make_mut(&mut self.config).extraction = Scripted::Ok(extraction);
        self
    }

    pub fn failing_extraction(mut self, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).extraction = Scripted::Fail(None, message.into());
        self
    }

    /// Append a tool call to the script replayed by tool-calling rounds.
    pub fn with_tool_call(mut self, name: impl Into<String>, args: JsonValue) -> Self {
        let config = Arc::make_mut(&mut self.config);
        let mut calls = match std::mem::replace(&mut config.tools, Scripted::Unset) {
            Scripted::Ok(calls) => calls,
            _ => Vec::new(),
        };
        calls.push((name.into(), args));
        config.tools = Scripted::Ok(calls);
        self
    }

    /// Tool rounds complete without calling any tool.
    pub fn with_no_tool_calls(mut self) -> Self {
        Arc::make_mut(&mut self.config).tools = Scripted::Ok(Vec::new());
        self
    }

    /// Tool rounds fail; pass `Some(401)` to simulate rejected credentials.
    pub fn failing_tools(mut self, status: Option<u16>, message: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).tools = Scripted::Fail(status, message.into());
        self
    }

    /// Cap on scripted calls replayed per round.
    pub fn with_max_iterations(mut self, n: usize) -> Self {
        Arc::make_mut(&mut self.config).max_iterations = n;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.call_log).clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        lock(&self.call_log)
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Values the tool handler returned, in order.
    pub fn tool_responses(&self) -> Vec<JsonValue> {
        lock(&self.tool_responses).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.call_log).clear();
        lock(&self.tool_responses).clear();
    }

    fn record(&self, operation: &str, input: impl Into<String>) {
        lock(&self.call_log).push(MockCall {
            operation: operation.to_string(),
            input: input.into(),
            timestamp: std::time::Instant::now(),
        });
    }

    fn scripted<T: Clone>(&self, script: &Scripted<T>, operation: &str) -> Result<T> {
        match script {
            Scripted::Ok(value) => Ok(value.clone()),
            Scripted::Fail(status, message) => {
                Err(Error::provider(&self.config.provider, *status, message.clone()))
            }
            Scripted::Unset => Err(Error::provider(
                &self.config.provider,
                None,
                format!("no scripted response for {}", operation),
            )),
        }
    }

    fn replay_tools(&self, handler: &mut dyn ToolHandler) -> Result<ToolLoopReport> {
        let script = self.scripted(&self.config.tools, "tool round")?;
        let cap = self.config.max_iterations;
        let mut report = ToolLoopReport::default();

        for (name, args) in script.iter() {
            if report.iterations >= cap {
                report.hit_iteration_cap = true;
                return Ok(report);
            }
            report.iterations += 1;
            report.tool_calls += 1;
            let response = match handler.handle(name, args) {
                Ok(value) => value,
                Err(e) => json!({ "error": e.to_string() }),
            };
            lock(&self.tool_responses).push(response);
        }

        if report.iterations >= cap {
            report.hit_iteration_cap = !script.is_empty();
        } else {
            report.iterations += 1;
        }
        Ok(report)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider_name(&self) -> &str {
        &self.config.provider
    }

    async fn classify_document(
        &self,
        excerpt: &str,
        _concepts: &[ConceptCatalogueEntry],
    ) -> Result<LlmClassification> {
        self.record("classify", excerpt);
        self.scripted(&self.config.classification, "classify")
    }

    async fn extract_metadata(
        &self,
        text: &str,
        concept_id: &str,
        _fields: &[TemplateField],
    ) -> Result<LlmExtraction> {
        self.record("extract", format!("{}: {}", concept_id, text));
        self.scripted(&self.config.extraction, "extract")
    }

    async fn process_pdf_with_tools(
        &self,
        pdf: &[u8],
        filename: &str,
        _concepts: &[ConceptCatalogueEntry],
        handler: &mut dyn ToolHandler,
    ) -> Result<ToolLoopReport> {
        self.record("pdf_tools", format!("{} ({} bytes)", filename, pdf.len()));
        self.replay_tools(handler)
    }

    async fn process_image_with_tools(
        &self,
        image: &[u8],
        mime_type: &str,
        source_url: Option<&str>,
        _concepts: &[ConceptCatalogueEntry],
        handler: &mut dyn ToolHandler,
    ) -> Result<ToolLoopReport> {
        self.record(
            "image_tools",
            format!("{} {} ({} bytes)", source_url.unwrap_or("-"), mime_type, image.len()),
        );
        self.replay_tools(handler)
    }
}
