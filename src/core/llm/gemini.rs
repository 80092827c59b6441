//! Google Gemini provider (generateContent API).
//!
//! Structured completion uses `responseMimeType: application/json` with a
//! `responseSchema`; the schema is pruned to the OpenAPI subset Gemini
//! accepts.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use super::base::{
    ChatMessage, ChatModel, GenerationParams, LlmError, LlmResult, Role, TokenStream,
    drain_sse_data_lines, map_status_error, map_transport_error, strip_code_fence,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

pub struct GeminiChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl GeminiChat {
    pub fn new(client: reqwest::Client, api_key: String) -> Self {
        Self {
            client,
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request_body(
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> serde_json::Value {
        let mut system = String::new();
        let mut contents = Vec::new();
        for message in messages {
            match message.role {
                Role::System => {
                    if !system.is_empty() {
                        system.push('\n');
                    }
                    system.push_str(&message.content);
                }
                Role::User => contents.push(json!({
                    "role": "user",
                    "parts": [{"text": message.content}],
                })),
                Role::Assistant => contents.push(json!({
                    "role": "model",
                    "parts": [{"text": message.content}],
                })),
            }
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": params.temperature,
                "maxOutputTokens": params.max_tokens,
            },
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        body
    }

    /// Drop JSON-Schema keywords the generateContent API rejects.
    fn prune_schema(schema: &serde_json::Value) -> serde_json::Value {
        match schema {
            serde_json::Value::Object(map) => {
                let pruned: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .filter(|(key, _)| {
                        !matches!(
                            key.as_str(),
                            "$schema" | "title" | "definitions" | "$defs" | "additionalProperties"
                        )
                    })
                    .map(|(key, value)| (key.clone(), Self::prune_schema(value)))
                    .collect();
                serde_json::Value::Object(pruned)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::prune_schema).collect())
            }
            other => other.clone(),
        }
    }

    fn extract_text(parsed: &serde_json::Value) -> LlmResult<&str> {
        parsed["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| LlmError::Server("response has no candidate text".to_string()))
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn structured_complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<serde_json::Value> {
        let mut body = Self::request_body(messages, params);
        body["generationConfig"]["responseMimeType"] = json!("application/json");
        body["generationConfig"]["responseSchema"] = Self::prune_schema(schema);

        let url = format!("{}/{model}:generateContent?key={}", self.base_url, self.api_key);
        let response = self
            .client
            .post(&url)
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
            .map_err(|e| LlmError::Server(format!("invalid generateContent envelope: {e}")))?;
        let content = Self::extract_text(&parsed)?;

        serde_json::from_str(strip_code_fence(content))
            .map_err(|e| LlmError::Malformed(format!("content is not schema JSON: {e}")))
    }

    async fn stream_tokens(
        &self,
        model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> LlmResult<TokenStream> {
        let body = Self::request_body(messages, params);
        let url = format!(
            "{}/{model}:streamGenerateContent?alt=sse&key={}",
            self.base_url, self.api_key
        );

        let response = self
            .client
            .post(&url)
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
                                Self::extract_text(&value)
                                    .ok()
                                    .map(|s| Ok(s.to_string()))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_schema_drops_unsupported_keywords() {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "title": "SpokenResponse",
            "type": "object",
            "additionalProperties": false,
            "properties": {
                "text": {"type": "string"},
            },
        });
        let pruned = GeminiChat::prune_schema(&schema);
        assert!(pruned.get("$schema").is_none());
        assert!(pruned.get("title").is_none());
        assert!(pruned.get("additionalProperties").is_none());
        assert_eq!(pruned["properties"]["text"]["type"], "string");
    }
}
