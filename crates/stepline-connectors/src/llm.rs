//! Model-inference connector.
//!
//! The single operation `generate` takes an ordered list of
//! `{role, type, content}` messages and returns the generated content.
//! Transport is behind [`ModelBackend`]; [`OpenAiCompatBackend`] speaks the
//! OpenAI chat-completions API, which also covers Ollama, Groq and other
//! compatible servers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use stepline_config::LlmConnectorSection;
use stepline_pipeline::{Connector, ConnectorContext, ConnectorError, ConnectorResult};

use crate::error::{Error, Result};
use crate::params;

// ─────────────────────────────────────────────────────────────────────────────
// Request / response types
// ─────────────────────────────────────────────────────────────────────────────

/// One message of a generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,

    /// `text` or `image_url`.
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,

    pub content: String,
}

fn default_message_type() -> String {
    "text".to_string()
}

impl ChatMessage {
    pub fn text(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            kind: default_message_type(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerateRequest {
    /// Overrides the backend's configured model.
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Generation {
    pub content: String,
    pub model: String,
    pub finish_reason: Option<String>,
    pub usage: Option<Value>,
}

impl Generation {
    fn into_value(self) -> Value {
        let mut out = Map::new();
        out.insert("content".into(), Value::String(self.content));
        out.insert("model".into(), Value::String(self.model));
        if let Some(reason) = self.finish_reason {
            out.insert("finishReason".into(), Value::String(reason));
        }
        if let Some(usage) = self.usage {
            out.insert("usage".into(), usage);
        }
        Value::Object(out)
    }
}

/// A model-inference backend.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, request: GenerateRequest) -> Result<Generation>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────────────────

pub struct LlmConnector {
    backend: Arc<dyn ModelBackend>,
}

impl LlmConnector {
    pub fn new<B: ModelBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn with_shared_backend(backend: Arc<dyn ModelBackend>) -> Self {
        Self { backend }
    }

    fn parse_request(params: &Map<String, Value>) -> std::result::Result<GenerateRequest, ConnectorError> {
        let messages = params::required(params, "messages")?;
        let messages: Vec<ChatMessage> = serde_json::from_value(messages.clone())
            .map_err(|e| ConnectorError::invalid_params(format!("invalid 'messages': {e}")))?;
        if messages.is_empty() {
            return Err(ConnectorError::invalid_params("'messages' must not be empty"));
        }
        for (i, message) in messages.iter().enumerate() {
            if message.role.trim().is_empty() {
                return Err(ConnectorError::invalid_params(format!(
                    "message {i} has no role"
                )));
            }
            if !matches!(message.kind.as_str(), "text" | "image_url") {
                return Err(ConnectorError::invalid_params(format!(
                    "message {i} has unsupported type '{}'",
                    message.kind
                )));
            }
        }

        let temperature = params.get("temperature").and_then(Value::as_f64);
        let max_tokens = params
            .get("maxTokens")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok());

        Ok(GenerateRequest {
            model: params::optional_str(params, "model")?.map(str::to_string),
            messages,
            temperature,
            max_tokens,
        })
    }
}

#[async_trait]
impl Connector for LlmConnector {
    fn name(&self) -> &str {
        "llm"
    }

    fn description(&self) -> &str {
        "Generate content from an ordered list of chat messages"
    }

    fn operations(&self) -> Vec<String> {
        vec!["generate".to_string()]
    }

    async fn invoke(
        &self,
        operation: &str,
        params: &Map<String, Value>,
        ctx: &ConnectorContext,
    ) -> ConnectorResult {
        if operation != "generate" {
            return Err(ConnectorError::unknown_operation(self.name(), operation));
        }
        let request = Self::parse_request(params)?;
        tracing::debug!(
            backend = %self.backend.name(),
            step = %ctx.step_id,
            messages = request.messages.len(),
            "generating"
        );
        let generation = self.backend.generate(request).await?;
        Ok(generation.into_value())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI-compatible backend
// ─────────────────────────────────────────────────────────────────────────────

/// Chat-completions client for OpenAI-compatible servers.
pub struct OpenAiCompatBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatBackend {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_config(config: &LlmConnectorSection) -> Result<Self> {
        Self::new(
            &config.base_url,
            &config.model,
            config.api_key(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = &self.api_key
            && let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}"))
        {
            headers.insert(AUTHORIZATION, value);
        }
        headers
    }

    fn to_openai_request(&self, request: &GenerateRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| match m.kind.as_str() {
                "image_url" => json!({
                    "role": m.role,
                    "content": [{"type": "image_url", "image_url": {"url": m.content}}],
                }),
                _ => json!({"role": m.role, "content": m.content}),
            })
            .collect();

        let mut body = json!({
            "model": request.model.as_deref().unwrap_or(&self.model),
            "messages": messages,
        });
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        body
    }

    async fn handle_response(response: Response) -> Result<Generation> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<OpenAiErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}: {body}"));
            return Err(match status.as_u16() {
                401 | 403 => Error::Auth(message),
                _ => Error::Backend(message),
            });
        }

        let parsed: OpenAiChatResponse =
            serde_json::from_str(&body).map_err(|e| Error::Serialization(e.to_string()))?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Backend("response contained no choices".to_string()))?;
        Ok(Generation {
            content: choice.message.content.unwrap_or_default(),
            model: parsed.model,
            finish_reason: choice.finish_reason,
            usage: parsed.usage,
        })
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        "openai-compat"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<Generation> {
        let body = self.to_openai_request(&request);
        tracing::debug!(model = %body["model"], url = %self.completions_url(), "chat completion request");
        let response = self
            .client
            .post(self.completions_url())
            .headers(self.headers())
            .json(&body)
            .send()
            .await?;
        Self::handle_response(response).await
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorResponse {
    error: OpenAiErrorBody,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorBody {
    message: String,
}
