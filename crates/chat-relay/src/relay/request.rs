//! Inbound chat request parsing and upstream payload composition

use serde::Serialize;
use serde_json::{Value, json};

use super::error::ChatError;

/// Temperature sent upstream when the caller doesn't supply a numeric one
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

/// A validated `POST /api/chat` body
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    /// Conversation messages, forwarded upstream verbatim
    pub messages: Vec<Value>,
    /// Requested model, `None` when absent or empty
    pub model: Option<String>,
    /// Optional system prompt (untrimmed)
    pub system_prompt: Option<String>,
    /// Requested temperature, `None` when absent or non-numeric
    pub temperature: Option<f64>,
    /// Whether the caller wants an event stream back
    pub stream: bool,
}

impl ChatRequest {
    /// Parse a raw request body.
    ///
    /// Anything that isn't a JSON object with a `messages` array is rejected
    /// with [`ChatError::InvalidInput`].
    pub fn from_slice(body: &[u8]) -> Result<Self, ChatError> {
        let value: Value = serde_json::from_slice(body).map_err(|_| ChatError::InvalidInput)?;
        Self::from_value(&value)
    }

    /// Build a request from an already-parsed JSON body
    pub fn from_value(body: &Value) -> Result<Self, ChatError> {
        let messages = body
            .get("messages")
            .and_then(Value::as_array)
            .ok_or(ChatError::InvalidInput)?
            .clone();

        let model = body
            .get("model")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let system_prompt = body
            .get("systemPrompt")
            .and_then(Value::as_str)
            .map(str::to_string);

        let temperature = body.get("temperature").and_then(Value::as_f64);

        let stream = body.get("stream").is_some_and(is_truthy);

        Ok(Self {
            messages,
            model,
            system_prompt,
            temperature,
            stream,
        })
    }

    /// Compose the upstream chat-completions payload.
    ///
    /// A non-blank system prompt is trimmed and prepended as a `system`
    /// message; the caller's messages follow in their original order.
    pub fn into_upstream(self, default_model: &str) -> UpstreamRequest {
        let system = self
            .system_prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| json!({"role": "system", "content": p}));

        let mut messages = Vec::with_capacity(self.messages.len() + 1);
        messages.extend(system);
        messages.extend(self.messages);

        UpstreamRequest {
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            messages,
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            stream: self.stream,
        }
    }
}

/// Body of `POST {base_url}/chat/completions`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpstreamRequest {
    pub model: String,
    pub messages: Vec<Value>,
    pub temperature: f64,
    pub stream: bool,
}

/// Pull `choices[0].message.content` out of a non-streaming completion,
/// defaulting to an empty reply when any part of the path is missing.
pub fn extract_reply(response: &Value) -> String {
    response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Loose truthiness for JSON flags: `true`, non-zero numbers, non-empty
/// strings, arrays and objects all count.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
