//! Anthropic messages provider.
//!
//! The messages API takes the system prompt out-of-band and has no native
//! JSON-schema response format, so structured completion appends a schema
//! instruction and parses the returned text as JSON.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use super::base::{
    ChatMessage, ChatModel, GenerationParams, LlmError, LlmResult, Role, TokenStream,
    drain_sse_data_lines, map_status_error, map_transport_error, strip_code_fence,
};

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AnthropicChat {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: ANTHROPIC_MESSAGES_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Split system entries from the turn list; the messages API rejects
    /// `system` roles inside `messages`.
    fn split_messages(messages: &[ChatMessage]) -> (String, Vec<serde_json::Value>) {
        let mut system = String::new();
        let mut turns = Vec::new();
        for message in messages {
            match message.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&message.content);
                }
                Role::User => turns.push(json!({"role": "user", "content": message.content})),
                Role::Assistant => {
                    turns.push(json!({"role": "assistant", "content": message.content}))
                }
            }
        }
        (system, turns)
    }

    fn request_body(
        &self,
        model: &str,
        system: &str,
        turns: Vec<serde_json::Value>,
        params: &GenerationParams,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": model,
            "messages": turns,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        body
    }

    async fn post(&self, body: &serde_json::Value) -> LlmResult<serde_json::Value> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| LlmError::Server(format!("invalid messages envelope: {e}")))
    }
}

#[async_trait]
impl ChatModel for AnthropicChat {
    async fn structured_complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<serde_json::Value> {
        let (mut system, turns) = Self::split_messages(messages);
        system.push_str(&format!(
            "\n\nRespond with a single JSON object matching this JSON Schema, with no prose around it:\n{schema}"
        ));

        let body = self.request_body(model, &system, turns, params);
        let parsed = self.post(&body).await?;

        let content = parsed["content"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::Server("response has no text content".to_string()))?;

        serde_json::from_str(strip_code_fence(content))
            .map_err(|e| LlmError::Malformed(format!("content is not schema JSON: {e}")))
    }

    async fn stream_tokens(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> LlmResult<TokenStream> {
        let (system, turns) = Self::split_messages(messages);
        let mut body = self.request_body(model, &system, turns, params);
        body["stream"] = json!(true);

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &text));
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_transport_error))
            .scan(String::new(), |buffer, chunk| {
                let out = match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        drain_sse_data_lines(buffer)
                            .into_iter()
                            .filter_map(|payload| {
                                let value: serde_json::Value =
                                    serde_json::from_str(&payload).ok()?;
                                if value["type"] == "content_block_delta" {
                                    value["delta"]["text"].as_str().map(|s| Ok(s.to_string()))
                                } else {
                                    None
                                }
                            })
                            .collect::<Vec<LlmResult<String>>>()
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(futures::stream::iter(out)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
