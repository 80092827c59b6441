//! Text-to-speech rendering for the six installation voices.
//!
//! [`SpeechRenderer`] is the seam the workflow talks to; the production
//! implementation resolves a voice profile, requests PCM from ElevenLabs,
//! and writes a WAV clip to the session directory.

pub mod elevenlabs;
pub mod profiles;
pub mod wav;

use async_trait::async_trait;
use std::path::Path;

use crate::errors::taxonomy::ErrorKind;

pub use elevenlabs::ElevenLabsClient;
pub use profiles::{FALLBACK_PROFILE, VoiceProfile, VoiceProfileName, get_profile};

/// TTS-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum TtsError {
    #[error("Empty text cannot be synthesised")]
    EmptyText,

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

impl TtsError {
    /// Every TTS failure maps to `tts_error` on the wire.
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TtsError
    }
}

pub type TtsResult<T> = Result<T, TtsError>;

/// Render a piece of text with a named voice profile to a WAV clip on disk.
#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    async fn render_to_file(
        &self,
        text: &str,
        profile_name: &str,
        path: &Path,
    ) -> TtsResult<()>;
}

const OUTPUT_FORMAT: &str = "pcm_24000";
const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Production renderer backed by ElevenLabs.
pub struct MultiVoiceTts {
    client: ElevenLabsClient,
}

impl MultiVoiceTts {
    pub fn new(client: ElevenLabsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SpeechRenderer for MultiVoiceTts {
    async fn render_to_file(
        &self,
        text: &str,
        profile_name: &str,
        path: &Path,
    ) -> TtsResult<()> {
        if text.trim().is_empty() {
            return Err(TtsError::EmptyText);
        }

        let profile = get_profile(VoiceProfileName::resolve(profile_name));

        tracing::info!(
            "Generating WAV to file: profile={}, path={}",
            profile_name,
            path.display()
        );

        let pcm = self.client.generate_pcm(text, &profile, OUTPUT_FORMAT).await?;
        wav::write_wav_file(&pcm, path, OUTPUT_SAMPLE_RATE).await?;

        tracing::info!("Wrote WAV file: {} ({} PCM bytes)", path.display(), pcm.len());
        Ok(())
    }
}
