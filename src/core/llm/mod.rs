//! LLM gateway: uniform structured completion and token streaming over
//! multiple model families.
//!
//! Providers are plug-in [`ChatModel`] objects selected by the prefix of the
//! agent's `provider/model` string. Retries for transient classes and the
//! per-call timeout live here so callers never see provider-specific failure
//! shapes.

pub mod anthropic;
pub mod base;
pub mod gemini;
pub mod openai;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::core::agents::AgentId;

pub use base::{ChatMessage, ChatModel, GenerationParams, LlmError, LlmResult, Role, TokenStream};

use anthropic::AnthropicChat;
use gemini::GeminiChat;
use openai::OpenAiChat;

/// Base delay for exponential retry backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

pub struct LlmGateway {
    providers: HashMap<&'static str, Arc<dyn ChatModel>>,
    timeout: Duration,
    retries: u32,
}

impl LlmGateway {
    /// Build the gateway from configured provider secrets. Providers without
    /// a key are simply absent; calls against them fail with a clear error.
    pub fn from_config(config: &ServerConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .unwrap_or_default();

        let mut providers: HashMap<&'static str, Arc<dyn ChatModel>> = HashMap::new();
        if let Some(key) = &config.openai_api_key {
            providers.insert(
                "openai",
                Arc::new(OpenAiChat::new(client.clone(), key.clone())),
            );
        }
        if let Some(key) = &config.anthropic_api_key {
            providers.insert(
                "anthropic",
                Arc::new(AnthropicChat::new(client.clone(), key.clone())),
            );
        }
        if let Some(key) = &config.google_api_key {
            providers.insert(
                "gemini",
                Arc::new(GeminiChat::new(client.clone(), key.clone())),
            );
        }

        Self {
            providers,
            timeout: Duration::from_secs(config.timeout_s),
            retries: config.retries.max(1),
        }
    }

    /// Build a gateway with explicit provider implementations (tests plug
    /// mocks in through this).
    pub fn with_providers(
        providers: HashMap<&'static str, Arc<dyn ChatModel>>,
        timeout: Duration,
        retries: u32,
    ) -> Self {
        Self {
            providers,
            timeout,
            retries: retries.max(1),
        }
    }

    fn resolve<'a>(&self, full: &'a str) -> LlmResult<(&Arc<dyn ChatModel>, &'a str)> {
        let (provider, model) = full
            .split_once('/')
            .ok_or_else(|| LlmError::Unknown(format!("malformed model string: {full}")))?;
        let implementation = self.providers.get(provider).ok_or_else(|| {
            LlmError::Unknown(format!("no client configured for provider: {provider}"))
        })?;
        Ok((implementation, model))
    }

    /// Structured completion parsed into `T`, with bounded retries for
    /// `network`/`timeout`/`rate_limit` and the per-call timeout applied.
    pub async fn structured<T>(
        &self,
        agent_id: AgentId,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> LlmResult<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        self.structured_for_model(agent_id.model(), messages, params)
            .await
    }

    /// Same as [`structured`](Self::structured) but against an explicit
    /// `provider/model` string, for callers outside the agent table (the
    /// sentiment analyser runs on its own fast model).
    pub async fn structured_for_model<T>(
        &self,
        full_model: &str,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> LlmResult<T>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let schema = serde_json::to_value(schemars::schema_for!(T))
            .map_err(|e| LlmError::Unknown(format!("schema generation failed: {e}")))?;
        let value = self
            .structured_complete_for_model(full_model, messages, &schema, params)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| LlmError::Malformed(format!("schema mismatch: {e}")))
    }

    /// Structured completion returning the raw JSON value.
    pub async fn structured_complete(
        &self,
        agent_id: AgentId,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<serde_json::Value> {
        self.structured_complete_for_model(agent_id.model(), messages, schema, params)
            .await
    }

    /// Raw structured completion against an explicit `provider/model` string.
    pub async fn structured_complete_for_model(
        &self,
        full_model: &str,
        messages: &[ChatMessage],
        schema: &serde_json::Value,
        params: &GenerationParams,
    ) -> LlmResult<serde_json::Value> {
        let (provider, model) = self.resolve(full_model)?;

        let mut attempt = 0u32;
        loop {
            let call = provider.structured_complete(model, messages, schema, params);
            let result = match tokio::time::timeout(self.timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(LlmError::Timeout(format!(
                    "structured completion exceeded {}s",
                    self.timeout.as_secs()
                ))),
            };

            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                    warn!(
                        "LLM call failed ({}), retrying in {:?} (attempt {}/{}): {}",
                        err.kind(),
                        delay,
                        attempt + 1,
                        self.retries,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    debug!("LLM call for {} failed: {}", full_model, err);
                    return Err(err);
                }
            }
        }
    }

    /// Token streaming for the agent's model. Retries apply only to opening
    /// the stream; mid-stream failures surface as stream items.
    pub async fn stream_tokens(
        &self,
        agent_id: AgentId,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> LlmResult<TokenStream> {
        let (provider, model) = self.resolve(agent_id.model())?;

        let mut attempt = 0u32;
        loop {
            match provider.stream_tokens(model, messages, params).await {
                Ok(stream) => return Ok(stream),
                Err(err) if err.is_retryable() && attempt + 1 < self.retries => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                    warn!(
                        "LLM stream open failed ({}), retrying in {:?}: {}",
                        err.kind(),
                        delay,
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Probe {
        text: String,
    }

    struct FlakyModel {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl ChatModel for FlakyModel {
        async fn structured_complete(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _schema: &serde_json::Value,
            _params: &GenerationParams,
        ) -> LlmResult<serde_json::Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(LlmError::RateLimit("slow down".to_string()))
            } else {
                Ok(serde_json::json!({"text": "ok"}))
            }
        }

        async fn stream_tokens(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> LlmResult<TokenStream> {
            Ok(Box::pin(futures::stream::iter(vec![Ok("ok".to_string())])))
        }
    }

    fn gateway_with(model: Arc<dyn ChatModel>) -> LlmGateway {
        let mut providers: HashMap<&'static str, Arc<dyn ChatModel>> = HashMap::new();
        providers.insert("openai", model.clone());
        providers.insert("anthropic", model.clone());
        providers.insert("gemini", model);
        LlmGateway::with_providers(providers, Duration::from_secs(5), 3)
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures() {
        let model = Arc::new(FlakyModel {
            calls: AtomicU32::new(0),
            fail_first: 2,
        });
        let gateway = gateway_with(model.clone());

        let result: Probe = gateway
            .structured(AgentId::Gpt4o, &[ChatMessage::user("hi")], &Default::default())
            .await
            .unwrap();
        assert_eq!(result.text, "ok");
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let model = Arc::new(FlakyModel {
            calls: AtomicU32::new(0),
            fail_first: 10,
        });
        let gateway = gateway_with(model.clone());

        let result: LlmResult<Probe> = gateway
            .structured(AgentId::Gpt4o, &[ChatMessage::user("hi")], &Default::default())
            .await;
        assert!(matches!(result, Err(LlmError::RateLimit(_))));
        assert_eq!(model.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_fast() {
        let gateway =
            LlmGateway::with_providers(HashMap::new(), Duration::from_secs(5), 3);
        let result: LlmResult<Probe> = gateway
            .structured(AgentId::Gpt4o, &[], &Default::default())
            .await;
        assert!(matches!(result, Err(LlmError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_structured_for_model_resolves_by_prefix() {
        let model = Arc::new(FlakyModel {
            calls: AtomicU32::new(0),
            fail_first: 0,
        });
        let gateway = gateway_with(model);

        // A model string outside the agent table still routes by prefix.
        let result: Probe = gateway
            .structured_for_model(
                "openai/gpt-4o-mini",
                &[ChatMessage::user("hi")],
                &Default::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.text, "ok");

        let missing: LlmResult<Probe> = gateway
            .structured_for_model("mystery/model", &[], &Default::default())
            .await;
        assert!(matches!(missing, Err(LlmError::Unknown(_))));
    }
}
