//! Base trait abstraction for chat-completion providers.
//!
//! Providers expose exactly two capabilities: structured completion against a
//! JSON schema and raw token streaming. Provider-specific transport failures
//! are mapped to the closed [`ErrorKind`] taxonomy here at the edge.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::errors::taxonomy::ErrorKind;

/// One entry in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call generation parameters.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 200,
        }
    }
}

/// LLM-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited: {0}")]
    RateLimit(String),

    #[error("provider error: {0}")]
    Server(String),

    #[error("malformed structured output: {0}")]
    Malformed(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

impl LlmError {
    /// Map to the closed taxonomy value that crosses component boundaries.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LlmError::Network(_) => ErrorKind::Network,
            LlmError::Timeout(_) => ErrorKind::Timeout,
            LlmError::RateLimit(_) => ErrorKind::RateLimit,
            LlmError::Server(_) | LlmError::Malformed(_) => ErrorKind::ServerError,
            LlmError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// Map a transport error from reqwest into the taxonomy.
pub fn map_transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout(err.to_string())
    } else if err.is_connect() || err.is_request() {
        LlmError::Network(err.to_string())
    } else {
        LlmError::Unknown(err.to_string())
    }
}

/// Map an HTTP status + body from a provider into the taxonomy.
pub fn map_status_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let detail = format!("{status}: {}", body.chars().take(200).collect::<String>());
    if status.as_u16() == 429 {
        LlmError::RateLimit(detail)
    } else if status.as_u16() == 408 {
        LlmError::Timeout(detail)
    } else if status.is_server_error() {
        LlmError::Server(detail)
    } else {
        LlmError::Unknown(detail)
    }
}

pub type LlmResult<T> = Result<T, LlmError>;

/// A lazy sequence of text chunks from a streaming completion.
pub type TokenStream = Pin<Box<dyn Stream<Item = LlmResult<String>> + Send>>;

/// Base trait for chat-completion providers.
///
/// Implementations are plug-in objects selected by an id -> implementation
/// map inside the gateway; the `model` argument is the provider-local model
/// name (the `provider/` prefix already stripped).
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Request a completion constrained to the given JSON schema and return
    /// the parsed JSON value.
    async fn structured_complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<serde_json::Value>;

    /// Stream raw text tokens for the given messages.
    async fn stream_tokens(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> LlmResult<TokenStream>;
}

/// Strip a markdown code fence if a provider wrapped its JSON in one.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Split an incremental SSE byte buffer into complete `data:` payloads,
/// leaving any trailing partial line in the buffer.
pub fn drain_sse_data_lines(buffer: &mut String) -> Vec<String> {
    let mut payloads = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line: String = buffer.drain(..=pos).collect();
        let line = line.trim();
        if let Some(data) = line.strip_prefix("data:") {
            let data = data.trim();
            if !data.is_empty() && data != "[DONE]" {
                payloads.push(data.to_string());
            }
        }
    }
    payloads
}
