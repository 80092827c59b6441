//! ElevenLabs text-to-speech client.
//!
//! Requests raw PCM from the REST API and hands it to the WAV helpers; the
//! renderer trait implementation lives in the parent module.

use serde_json::json;

use super::TtsError;
use super::profiles::VoiceProfile;

pub const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

pub struct ElevenLabsClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ElevenLabsClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Result<Self, TtsError> {
        if api_key.is_empty() {
            return Err(TtsError::InvalidConfiguration(
                "API key is required for ElevenLabs".to_string(),
            ));
        }
        Ok(Self {
            client,
            api_key,
            base_url: ELEVENLABS_TTS_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Request PCM audio for `text` with the given profile.
    ///
    /// Returns raw signed 16-bit little-endian mono PCM at the sample rate
    /// encoded in `output_format` (e.g. `pcm_24000`).
    pub async fn generate_pcm(
        &self,
        text: &str,
        profile: &VoiceProfile,
        output_format: &str,
    ) -> Result<Vec<u8>, TtsError> {
        let url = format!(
            "{}/{}?output_format={output_format}",
            self.base_url, profile.voice_id
        );

        let body = json!({
            "text": text,
            "model_id": profile.model_id,
            "voice_settings": profile.settings,
        });

        tracing::info!(
            "Generating TTS: voice={}, model={}, format={}",
            profile.voice_name,
            profile.model_id,
            output_format
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header("Accept", "audio/pcm")
            .json(&body)
            .send()
            .await
            .map_err(|e| TtsError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(TtsError::ProviderError(format!(
                "ElevenLabs returned {status}: {}",
                detail.chars().take(200).collect::<String>()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::NetworkError(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
