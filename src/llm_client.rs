//! A thin, provider-agnostic chat-completions client.
//!
//! Deliberately minimal: one operation ([`LlmClient::chat`]), no retries, a
//! caller-supplied timeout, and a defensive JSON-extraction helper for
//! coercing a model's reply into the JSON shape a caller expects. The actual
//! upstream provider (Mistral, OpenAI, or anything with an equivalent
//! chat-completions contract) is deliberately abstracted behind this trait.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// A single chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }
}

/// Failure modes of an LLM call, independent of which core component is
/// calling it. Orchestrator and auditor each wrap this into their own error
/// taxonomy variant (`OrchestratorError::LLMError` / `AuditorError::LLMError`).
#[derive(Debug)]
pub struct LlmError(pub String);

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for LlmError {}

/// Provider-agnostic chat-completions client.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send `messages` to the configured model and return the assistant's
    /// raw text reply.
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError>;
}

/// `reqwest`-backed [`LlmClient`] pointed at a single chat-completions
/// endpoint, authenticated with a bearer token loaded once at startup.
pub struct HttpLlmClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    bearer_token: Option<String>,
}

impl HttpLlmClient {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            bearer_token,
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        timeout: Duration,
    ) -> Result<String, LlmError> {
        let token = self
            .bearer_token
            .as_ref()
            .ok_or_else(|| LlmError("missing LLM bearer token".to_string()))?;

        let body = serde_json::json!({
            "model": self.model,
            "temperature": temperature,
            "messages": messages,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| LlmError(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(LlmError(format!(
                "LLM endpoint returned status {}",
                response.status()
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| LlmError(format!("invalid JSON response: {}", e)))?;

        payload
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| LlmError("no assistant content in response".to_string()))
    }
}

/// Parse `text` as JSON; on failure, fall back to extracting the substring
/// between the first `{` and the last `}` and retrying once.
pub fn extract_json(text: &str) -> Result<Value, LlmError> {
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }

    let start = text.find('{');
    let end = text.rfind('}');
    match (start, end) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&text[start..=end])
            .map_err(|e| LlmError(format!("could not coerce LLM reply to JSON: {}", e))),
        _ => Err(LlmError(
            "LLM reply contained no JSON object".to_string(),
        )),
    }
}

/// Load the bearer token for `provider` from the LLM secret file (a JSON
/// object mapping provider name to token). Missing file or missing key both
/// resolve to `None` rather than an error — callers decide whether that is
/// fatal (it is, for planning/audit; it is not, for health/metrics).
pub fn load_secret(path: &Path, provider: &str) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let value: Value = serde_json::from_str(&raw).ok()?;
    value.get(provider)?.as_str().map(str::to_string)
}
