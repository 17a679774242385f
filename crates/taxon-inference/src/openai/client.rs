//! OpenAI-compatible [`LlmClient`] implementation.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Map, Value as JsonValue};
use tracing::{debug, info, instrument, warn};

use taxon_core::tools::document_tools;
use taxon_core::{
    ConceptCatalogueEntry, Error, LlmClassification, LlmClient, LlmExtraction, Result,
    TemplateField, ToolHandler, ToolLoopReport,
};

use super::error::to_provider_error;
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart, OpenAIErrorResponse,
    ResponseFormat, ToolDefinition,
};
use crate::config::LlmConfig;
use crate::prompts;

/// Chat-completions client used for classification, extraction and
/// tool-calling rounds.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            provider = %config.provider,
            base_url = %config.base_url,
            model = %config.model,
            "LLM client initialized"
        );
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(LlmConfig::from_env())
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }
        req.header("Content-Type", "application/json")
    }

    /// One chat-completions call; returns the first choice's message.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: Option<&[ToolDefinition]>,
        json_mode: bool,
    ) -> Result<ChatMessage> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            tools,
            tool_choice: tools.map(|_| "auto"),
            response_format: json_mode.then(ResponseFormat::json_object),
        };

        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::provider(&self.config.provider, None, format!("Request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let (error_type, message) = match serde_json::from_str::<OpenAIErrorResponse>(&body) {
                Ok(parsed) => (parsed.error.error_type.unwrap_or_default(), parsed.error.message),
                Err(_) => (String::new(), body),
            };
            return Err(to_provider_error(
                &self.config.provider,
                status.as_u16(),
                &error_type,
                &message,
            ));
        }

        let result: ChatCompletionResponse = response.json().await.map_err(|e| {
            Error::provider(
                &self.config.provider,
                Some(status.as_u16()),
                format!("Failed to parse response: {}", e),
            )
        })?;

        if let Some(usage) = &result.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| {
                Error::provider(&self.config.provider, Some(status.as_u16()), "No choices in response")
            })
    }

    /// Drive the model through tool calls until it stops asking or the
    /// iteration cap is reached.
    async fn run_tool_loop(
        &self,
        mut messages: Vec<ChatMessage>,
        handler: &mut dyn ToolHandler,
    ) -> Result<ToolLoopReport> {
        let tools: Vec<ToolDefinition> = document_tools().iter().map(ToolDefinition::from).collect();
        let mut report = ToolLoopReport::default();

        loop {
            if report.iterations >= self.config.max_tool_iterations {
                report.hit_iteration_cap = true;
                warn!(
                    iterations = report.iterations,
                    tool_calls = report.tool_calls,
                    "Tool loop stopped at iteration cap"
                );
                break;
            }
            report.iterations += 1;

            let message = self.chat(&messages, Some(&tools), false).await?;
            let calls = message.tool_calls.clone().unwrap_or_default();
            messages.push(message);

            if calls.is_empty() {
                break;
            }

            for call in calls {
                report.tool_calls += 1;
                debug!(tool = %call.function.name, call_id = %call.id, "Dispatching tool call");
                let output = match parse_arguments(&call.function.arguments) {
                    Ok(args) => match handler.handle(&call.function.name, &args) {
                        Ok(value) => value,
                        Err(e) => json!({ "error": e.to_string() }),
                    },
                    Err(e) => json!({ "error": e.to_string() }),
                };
                messages.push(ChatMessage::tool_result(call.id, output.to_string()));
            }
        }

        Ok(report)
    }
}

fn parse_arguments(raw: &str) -> Result<JsonValue> {
    if raw.trim().is_empty() {
        return Ok(JsonValue::Object(Map::new()));
    }
    serde_json::from_str(raw)
        .map_err(|e| Error::InvalidInput(format!("tool arguments are not valid JSON: {}", e)))
}

/// Pull the JSON object out of a model reply that may be fenced or wrapped
/// in prose.
pub fn parse_json_object(content: &str) -> Result<Map<String, JsonValue>> {
    let start = content.find('{');
    let end = content.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if s < e => &content[s..=e],
        _ => {
            return Err(Error::Serialization(
                "model reply contains no JSON object".to_string(),
            ))
        }
    };
    match serde_json::from_str::<JsonValue>(slice)? {
        JsonValue::Object(map) => Ok(map),
        _ => Err(Error::Serialization("model reply is not a JSON object".to_string())),
    }
}

fn as_confidence(value: Option<&JsonValue>) -> Option<f32> {
    let raw = match value? {
        JsonValue::Number(n) => n.as_f64()?,
        JsonValue::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    Some((raw as f32).clamp(0.0, 1.0))
}

fn as_text(value: Option<&JsonValue>) -> Option<String> {
    value
        .and_then(JsonValue::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn classification_from_reply(content: &str) -> Result<LlmClassification> {
    let map = parse_json_object(content)?;
    let concept_id = as_text(map.get("concept_id"))
        .ok_or_else(|| Error::Serialization("classification reply lacks concept_id".to_string()))?;
    Ok(LlmClassification {
        concept_id,
        confidence: as_confidence(map.get("confidence")).unwrap_or(0.0),
        reasoning: as_text(map.get("reasoning")),
    })
}

/// Accepts `{"properties": {...}, ...}` or a flat object of field values.
fn extraction_from_reply(content: &str) -> Result<LlmExtraction> {
    let mut map = parse_json_object(content)?;
    let summary = as_text(map.get("summary"));
    let confidence = as_confidence(map.get("confidence"));
    let properties = match map.remove("properties") {
        Some(JsonValue::Object(props)) => props,
        _ => {
            map.remove("summary");
            map.remove("confidence");
            map
        }
    };
    Ok(LlmExtraction {
        properties,
        summary,
        confidence,
    })
}

fn encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn provider_name(&self) -> &str {
        &self.config.provider
    }

    #[instrument(skip_all, fields(concepts = concepts.len()))]
    async fn classify_document(
        &self,
        excerpt: &str,
        concepts: &[ConceptCatalogueEntry],
    ) -> Result<LlmClassification> {
        let messages = vec![
            ChatMessage::system(prompts::CLASSIFY_SYSTEM),
            ChatMessage::user(prompts::classify_user(excerpt, concepts)),
        ];
        let reply = self.chat(&messages, None, true).await?;
        classification_from_reply(reply.text().unwrap_or_default())
    }

    #[instrument(skip(self, text, fields), fields(fields = fields.len()))]
    async fn extract_metadata(
        &self,
        text: &str,
        concept_id: &str,
        fields: &[TemplateField],
    ) -> Result<LlmExtraction> {
        let messages = vec![
            ChatMessage::system(prompts::EXTRACT_SYSTEM),
            ChatMessage::user(prompts::extract_user(text, concept_id, fields)),
        ];
        let reply = self.chat(&messages, None, true).await?;
        extraction_from_reply(reply.text().unwrap_or_default())
    }

    #[instrument(skip(self, pdf, concepts, handler), fields(bytes = pdf.len()))]
    async fn process_pdf_with_tools(
        &self,
        pdf: &[u8],
        filename: &str,
        concepts: &[ConceptCatalogueEntry],
        handler: &mut dyn ToolHandler,
    ) -> Result<ToolLoopReport> {
        let messages = vec![
            ChatMessage::system(prompts::TOOLS_SYSTEM),
            ChatMessage::user_parts(vec![
                ContentPart::text(prompts::tools_user(filename, concepts)),
                ContentPart::pdf_base64(filename, &encode(pdf)),
            ]),
        ];
        self.run_tool_loop(messages, handler).await
    }

    #[instrument(skip(self, image, concepts, handler), fields(bytes = image.len()))]
    async fn process_image_with_tools(
        &self,
        image: &[u8],
        mime_type: &str,
        source_url: Option<&str>,
        concepts: &[ConceptCatalogueEntry],
        handler: &mut dyn ToolHandler,
    ) -> Result<ToolLoopReport> {
        let source = source_url.unwrap_or("uploaded image");
        let messages = vec![
            ChatMessage::system(prompts::TOOLS_SYSTEM),
            ChatMessage::user_parts(vec![
                ContentPart::text(prompts::tools_user(source, concepts)),
                ContentPart::image_base64(mime_type, &encode(image)),
            ]),
        ];
        self.run_tool_loop(messages, handler).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_object_strips_fences() {
        let reply = "```json\n{\"concept_id\": \"Invoice\", \"confidence\": 0.9}\n```";
        let map = parse_json_object(reply).unwrap();
        assert_eq!(map["concept_id"], "Invoice");
    }

    #[test]
    fn test_parse_json_object_rejects_prose() {
        assert!(parse_json_object("I think it is an invoice").is_err());
        assert!(parse_json_object("} backwards {").is_err());
    }

    #[test]
    fn test_classification_reply_clamps_confidence() {
        let c = classification_from_reply(r#"{"concept_id":"Receipt","confidence":"1.7"}"#).unwrap();
        assert_eq!(c.concept_id, "Receipt");
        assert_eq!(c.confidence, 1.0);
        assert!(c.reasoning.is_none());
    }

    #[test]
    fn test_classification_reply_requires_concept() {
        assert!(classification_from_reply(r#"{"confidence":0.5}"#).is_err());
    }

    #[test]
    fn test_extraction_reply_nested_and_flat() {
        let nested = extraction_from_reply(
            r#"{"properties":{"invoice_number":"F-1"},"summary":" ACME invoice ","confidence":0.7}"#,
        )
        .unwrap();
        assert_eq!(nested.properties["invoice_number"], "F-1");
        assert_eq!(nested.summary.as_deref(), Some("ACME invoice"));
        assert_eq!(nested.confidence, Some(0.7));

        let flat = extraction_from_reply(r#"{"invoice_number":"F-2","summary":"x"}"#).unwrap();
        assert_eq!(flat.properties.len(), 1);
        assert_eq!(flat.properties["invoice_number"], "F-2");
    }

    #[test]
    fn test_parse_arguments_empty_is_object() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert!(parse_arguments("{oops").is_err());
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = LlmConfig::default().with_model("");
        assert!(OpenAiClient::new(config).is_err());
    }
}
