//! OpenAI chat-completions provider.
//!
//! Structured completion uses the `json_schema` response format; streaming
//! parses the SSE `chat.completion.chunk` frames.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use super::base::{
    ChatMessage, ChatModel, GenerationParams, LlmError, LlmResult, TokenStream,
    drain_sse_data_lines, map_status_error, map_transport_error,
};

pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: OPENAI_CHAT_URL.to_string(),
        }
    }

    /// Override the endpoint (used by tests and OpenAI-compatible gateways).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> serde_json::Value {
        json!({
            "model": model,
            "messages": messages,
            "temperature": params.temperature,
            "max_tokens": params.max_tokens,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn structured_complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<serde_json::Value> {
        let mut body = self.request_body(model, messages, params);
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema
                    .get("title")
                    .and_then(|t| t.as_str())
                    .unwrap_or("structured_response"),
                "schema": schema,
            },
        });

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, &text));
        }

        let parsed: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| LlmError::Server(format!("invalid completion envelope: {e}")))?;
        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LlmError::Server("completion has no message content".to_string()))?;

        serde_json::from_str(content)
            .map_err(|e| LlmError::Malformed(format!("content is not schema JSON: {e}")))
    }

    async fn stream_tokens(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> LlmResult<TokenStream> {
        let mut body = self.request_body(model, messages, params);
        body["stream"] = json!(true);

        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &text));
        }

        let byte_stream = response.bytes_stream();
        let stream = byte_stream
            .map(|chunk| chunk.map_err(map_transport_error))
            .scan(String::new(), |buffer, chunk| {
                let out = match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        let tokens: Vec<LlmResult<String>> = drain_sse_data_lines(buffer)
                            .into_iter()
                            .filter_map(|payload| {
                                let value: serde_json::Value =
                                    serde_json::from_str(&payload).ok()?;
                                value["choices"][0]["delta"]["content"]
                                    .as_str()
                                    .map(|s| Ok(s.to_string()))
                            })
                            .collect();
                        tokens
                    }
                    Err(e) => vec![Err(e)],
                };
                futures::future::ready(Some(futures::stream::iter(out)))
            })
            .flatten();

        Ok(Box::pin(stream))
    }
}
