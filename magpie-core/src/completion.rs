//! Completion-service client and response parsing.
//!
//! The service returns free-form text that is expected to contain a JSON
//! object; `parse_review_payload` handles fenced and prose-wrapped output,
//! and callers fall back to `basic_insights` when even that fails.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::review::{Finding, Recommendations, Severity};

/// Injectable seam for the LLM completion call.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub format_type: String,
    pub json_schema: JsonSchema,
}

#[derive(Debug, Serialize)]
pub struct JsonSchema {
    pub name: String,
    pub strict: bool,
    pub schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// HTTP client for the chat-completions endpoint.
#[derive(Clone)]
pub struct CompletionClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

impl CompletionClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("magpie/0.1.0")
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            model,
        }
    }

    /// Strict JSON-schema response format for the review payload, so the
    /// completion service is steered towards parseable output. Parsing still
    /// tolerates malformed responses; the schema is an optimization, not a
    /// guarantee.
    pub fn create_response_format() -> ResponseFormat {
        let schema = serde_json::json!({
            "type": "object",
            "properties": {
                "summary": { "type": "string" },
                "findings": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string" },
                            "message": { "type": "string" },
                            "severity": { "type": "string" },
                            "file": { "type": ["string", "null"] },
                            "line": { "type": ["integer", "null"] },
                            "reasoning": { "type": ["string", "null"] },
                            "suggestedCode": { "type": ["string", "null"] }
                        },
                        "required": ["title", "message", "severity"],
                        "additionalProperties": false
                    }
                },
                "recommendations": {
                    "type": "object",
                    "properties": {
                        "immediate": { "type": "array", "items": { "type": "string" } },
                        "shortTerm": { "type": "array", "items": { "type": "string" } },
                        "longTerm": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["immediate", "shortTerm", "longTerm"],
                    "additionalProperties": false
                }
            },
            "required": ["summary", "findings", "recommendations"],
            "additionalProperties": false
        });

        ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: JsonSchema {
                name: "code_review".to_string(),
                strict: true,
                schema,
            },
        }
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
            response_format: Self::create_response_format(),
        };

        info!("Requesting completion from model {}", self.model);

        let response = self
            .client
            .post(COMPLETIONS_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Completion API error: {} - {}",
                status,
                error_text
            ));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Completion response contained no choices"))?;

        info!("Received completion ({} bytes)", content.len());
        Ok(content)
    }
}

/// The structured payload expected inside the completion text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiReviewPayload {
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<AiFinding>,
    #[serde(default)]
    pub recommendations: AiRecommendations,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AiFinding {
    pub title: String,
    pub message: String,
    pub severity: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u64>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default, rename = "suggestedCode")]
    pub suggested_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AiRecommendations {
    #[serde(default)]
    pub immediate: Vec<String>,
    #[serde(default, rename = "shortTerm")]
    pub short_term: Vec<String>,
    #[serde(default, rename = "longTerm")]
    pub long_term: Vec<String>,
}

impl AiReviewPayload {
    /// Convert the wire payload into domain findings. Severity labels the
    /// model invented map to `Suggestion` rather than being dropped.
    pub fn into_domain(self) -> (String, Vec<Finding>, Recommendations) {
        let findings = self
            .findings
            .into_iter()
            .map(|f| Finding {
                severity: Severity::from_label(&f.severity).unwrap_or(Severity::Suggestion),
                title: f.title,
                message: f.message,
                file: f.file,
                line: f.line,
                reasoning: f.reasoning,
                suggested_code: f.suggested_code,
            })
            .collect();
        let recommendations = Recommendations {
            immediate: self.recommendations.immediate,
            short_term: self.recommendations.short_term,
            long_term: self.recommendations.long_term,
        };
        (self.summary, findings, recommendations)
    }
}

/// Extract and parse the JSON object from completion text.
///
/// Accepts bare JSON, fenced code blocks, and prose with an embedded
/// object. Returns an error for anything without a parseable object; the
/// caller is responsible for falling back.
pub fn parse_review_payload(text: &str) -> Result<AiReviewPayload> {
    let trimmed = text.trim();

    // Fast path: the whole response is the object.
    if let Ok(payload) = serde_json::from_str::<AiReviewPayload>(trimmed) {
        return Ok(payload);
    }

    // Otherwise take the outermost brace span, which also handles
    // ```json fences and leading/trailing prose.
    let start = trimmed
        .find('{')
        .ok_or_else(|| anyhow!("No JSON object in completion text"))?;
    let end = trimmed
        .rfind('}')
        .ok_or_else(|| anyhow!("No JSON object in completion text"))?;
    if end <= start {
        return Err(anyhow!("No JSON object in completion text"));
    }

    serde_json::from_str(&trimmed[start..=end])
        .context("Completion text contained malformed JSON")
}
