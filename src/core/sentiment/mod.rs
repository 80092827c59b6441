//! Sentiment analysis of the visitor's message.
//!
//! Runs on a fast model in parallel with turn 1; the result reaches the
//! renderer as an early `user_sentiment` push message so loading effects can
//! match the visitor's mood. Failures and timeouts degrade to silence and
//! never stall the workflow.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::core::llm::{ChatMessage, GenerationParams, LlmGateway};
use crate::core::workflow::prompts::render_sentiment_prompt;

/// Overall emotional tone of the whispered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SentimentValue {
    Positive,
    Neutral,
    Negative,
}

impl SentimentValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentValue::Positive => "positive",
            SentimentValue::Neutral => "neutral",
            SentimentValue::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured output from the sentiment analysis call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SentimentResult {
    pub sentiment: SentimentValue,
    pub justification: String,
}

/// Analyze the sentiment of the visitor's message.
///
/// Returns `None` when disabled, on any provider error, or past
/// `sentiment_timeout_s`; callers treat absence as "no signal".
pub async fn analyze_sentiment(
    llm: &LlmGateway,
    config: &ServerConfig,
    user_message: &str,
) -> Option<SentimentResult> {
    if !config.sentiment_enabled {
        return None;
    }

    let messages = vec![ChatMessage::user(render_sentiment_prompt(user_message))];
    let params = GenerationParams {
        temperature: config.sentiment_temperature,
        max_tokens: config.sentiment_max_tokens,
    };

    let call = llm.structured_for_model::<SentimentResult>(&config.sentiment_model, &messages, &params);
    match tokio::time::timeout(Duration::from_secs_f64(config.sentiment_timeout_s), call).await {
        Ok(Ok(result)) => {
            info!(
                "Sentiment: {} - {}...",
                result.sentiment,
                result.justification.chars().take(50).collect::<String>()
            );
            Some(result)
        }
        Ok(Err(err)) => {
            warn!("Sentiment analysis error: {}", err);
            None
        }
        Err(_) => {
            warn!("Sentiment analysis timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::llm::{ChatModel, LlmResult, TokenStream};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedModel {
        calls: Arc<AtomicU32>,
        delay: Duration,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn structured_complete(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _schema: &serde_json::Value,
            _params: &GenerationParams,
        ) -> LlmResult<serde_json::Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(json!({
                "sentiment": "positive",
                "justification": "bright and hopeful",
            }))
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

    fn gateway(calls: Arc<AtomicU32>, delay: Duration) -> LlmGateway {
        let model: Arc<dyn ChatModel> = Arc::new(ScriptedModel { calls, delay });
        let mut providers: HashMap<&'static str, Arc<dyn ChatModel>> = HashMap::new();
        providers.insert("openai", model);
        LlmGateway::with_providers(providers, Duration::from_secs(5), 1)
    }

    #[test]
    fn test_wire_format_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&SentimentValue::Negative).unwrap(),
            "\"negative\""
        );
        let back: SentimentValue = serde_json::from_str("\"neutral\"").unwrap();
        assert_eq!(back, SentimentValue::Neutral);
    }

    #[tokio::test]
    async fn test_disabled_skips_the_call() {
        let calls = Arc::new(AtomicU32::new(0));
        let llm = gateway(calls.clone(), Duration::ZERO);
        let config = ServerConfig {
            sentiment_enabled: false,
            ..Default::default()
        };

        let result = analyze_sentiment(&llm, &config, "hello water").await;
        assert!(result.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_successful_analysis() {
        let calls = Arc::new(AtomicU32::new(0));
        let llm = gateway(calls.clone(), Duration::ZERO);
        let config = ServerConfig::default();

        let result = analyze_sentiment(&llm, &config, "hello water")
            .await
            .expect("sentiment result");
        assert_eq!(result.sentiment, SentimentValue::Positive);
        assert_eq!(result.justification, "bright and hopeful");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_none() {
        let calls = Arc::new(AtomicU32::new(0));
        let llm = gateway(calls.clone(), Duration::from_secs(5));
        let config = ServerConfig {
            sentiment_timeout_s: 0.05,
            ..Default::default()
        };

        let result = analyze_sentiment(&llm, &config, "hello water").await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_degrades_to_none() {
        let llm = LlmGateway::with_providers(HashMap::new(), Duration::from_secs(5), 1);
        let config = ServerConfig::default();

        let result = analyze_sentiment(&llm, &config, "hello water").await;
        assert!(result.is_none());
    }
}
