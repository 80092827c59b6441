use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::core::conversations::ConversationStore;
use crate::core::events::{EventsHandle, EventsOrchestrator};
use crate::core::llm::LlmGateway;
use crate::core::stt::ScribeClient;
use crate::core::tts::{ElevenLabsClient, MultiVoiceTts, SpeechRenderer, TtsError, TtsResult};
use crate::core::waves::WaveWorkerPool;
use crate::core::workflow::WorkflowContext;

/// Renderer used when no ElevenLabs key is configured: every render fails
/// with `tts_error`, which the workflow isolates per slot.
struct UnconfiguredTts;

#[async_trait]
impl SpeechRenderer for UnconfiguredTts {
    async fn render_to_file(&self, _text: &str, _profile: &str, _path: &Path) -> TtsResult<()> {
        Err(TtsError::InvalidConfiguration(
            "ELEVENLABS_API_KEY not configured".to_string(),
        ))
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub conversations: Arc<ConversationStore>,
    pub llm: Arc<LlmGateway>,
    pub tts: Arc<dyn SpeechRenderer>,
    pub stt: Option<Arc<ScribeClient>>,
    pub waves: Arc<WaveWorkerPool>,
    pub events: EventsHandle,
}

impl AppState {
    pub async fn new(config: ServerConfig) -> Arc<Self> {
        let config = Arc::new(config);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_s))
            .build()
            .unwrap_or_default();

        let conversations = Arc::new(ConversationStore::new(&config.default_system_prompt));
        let llm = Arc::new(LlmGateway::from_config(&config));

        let tts: Arc<dyn SpeechRenderer> = match &config.elevenlabs_api_key {
            Some(key) => match ElevenLabsClient::new(http_client.clone(), key.clone()) {
                Ok(client) => Arc::new(MultiVoiceTts::new(client)),
                Err(e) => {
                    tracing::warn!("TTS client unavailable: {}", e);
                    Arc::new(UnconfiguredTts)
                }
            },
            None => {
                tracing::warn!("ELEVENLABS_API_KEY not set; TTS rendering disabled");
                Arc::new(UnconfiguredTts)
            }
        };

        let stt = config
            .elevenlabs_api_key
            .as_ref()
            .and_then(|key| ScribeClient::new(http_client, key.clone()).ok())
            .map(Arc::new);

        // Wire the wave pool's completions into the event orchestrator.
        let events = EventsOrchestrator::start(&config);
        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let waves = Arc::new(WaveWorkerPool::start(&config, results_tx));
        {
            let events = events.clone();
            tokio::spawn(async move {
                while let Some(result) = results_rx.recv().await {
                    events.notify_result(result);
                }
            });
        }

        Arc::new(Self {
            config,
            conversations,
            llm,
            tts,
            stt,
            waves,
            events,
        })
    }

    /// Workflow view of the application state, one per request.
    pub fn workflow_context(&self) -> Arc<WorkflowContext> {
        Arc::new(WorkflowContext {
            config: self.config.clone(),
            llm: self.llm.clone(),
            tts: self.tts.clone(),
            conversations: self.conversations.clone(),
            waves: self.waves.clone(),
            events: self.events.clone(),
        })
    }
}
