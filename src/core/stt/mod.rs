//! Speech-to-text ingest: ElevenLabs Scribe client and STT session storage.
//!
//! The Scribe RPC is opaque to the rest of the system; this module persists
//! the uploaded clip and the transcript artifacts:
//!
//! ```text
//! artifacts/stt/sessions/<ssid>/
//!     input.<ext>  transcript.json  transcript.txt  metadata.json
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const STT_SESSIONS_BASE: &str = "stt/sessions";
pub const ELEVENLABS_STT_URL: &str = "https://api.elevenlabs.io/v1/speech-to-text";
const SCRIBE_MODEL_ID: &str = "scribe_v1";

#[derive(Debug, thiserror::Error)]
pub enum SttError {
    #[error("ELEVENLABS_API_KEY not configured")]
    MissingApiKey,

    #[error("transcription transport failure: {0}")]
    Transport(String),

    #[error("Scribe API error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("artifact io failure: {0}")]
    Io(String),
}

/// Raw transcription result from Scribe.
#[derive(Debug, Clone, Deserialize)]
pub struct ScribeTranscript {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub language_code: Option<String>,
    /// Full response, persisted verbatim as `transcript.json`.
    #[serde(skip)]
    pub raw: serde_json::Value,
}

/// Client for the ElevenLabs Scribe v1 speech-to-text API.
pub struct ScribeClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl ScribeClient {
    pub fn new(client: reqwest::Client, api_key: String) -> Result<Self, SttError> {
        if api_key.is_empty() {
            return Err(SttError::MissingApiKey);
        }
        Ok(Self {
            client,
            api_key,
            base_url: ELEVENLABS_STT_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Transcribe an uploaded clip. Language is auto-detected.
    pub async fn transcribe(
        &self,
        file_name: &str,
        audio: Vec<u8>,
        mime_type: &str,
    ) -> Result<ScribeTranscript, SttError> {
        tracing::info!(
            "Transcribing audio: file={}, size={} bytes",
            file_name,
            audio.len()
        );

        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| SttError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model_id", SCRIBE_MODEL_ID)
            .part("file", part);

        let response = self
            .client
            .post(&self.base_url)
            .header("xi-api-key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| SttError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SttError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(SttError::Upstream {
                status: status.as_u16(),
                message: body.chars().take(300).collect(),
            });
        }

        let raw: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| SttError::Transport(e.to_string()))?;
        let mut transcript: ScribeTranscript = serde_json::from_value(raw.clone())
            .map_err(|e| SttError::Transport(e.to_string()))?;
        transcript.raw = raw;

        tracing::info!(
            "Transcription complete: {} chars, language={}",
            transcript.text.len(),
            transcript.language_code.as_deref().unwrap_or("unknown")
        );
        Ok(transcript)
    }
}

/// Manages an STT session and its artifacts.
#[derive(Debug, Clone)]
pub struct SttSession {
    pub session_id: String,
    output_dir: PathBuf,
    created_at: String,
}

impl SttSession {
    pub fn create(artifacts_root: &Path) -> Result<Self, SttError> {
        let session_id = Uuid::new_v4().to_string();
        let output_dir = artifacts_root.join(STT_SESSIONS_BASE).join(&session_id);
        std::fs::create_dir_all(&output_dir).map_err(|e| SttError::Io(e.to_string()))?;
        Ok(Self {
            session_id,
            output_dir,
            created_at: chrono::Utc::now().to_rfc3339(),
        })
    }

    pub fn input_relative_path(&self, ext: &str) -> String {
        format!("{STT_SESSIONS_BASE}/{}/input.{ext}", self.session_id)
    }

    pub fn transcript_relative_path(&self) -> String {
        format!("{STT_SESSIONS_BASE}/{}/transcript.txt", self.session_id)
    }

    pub fn save_input_audio(&self, audio: &[u8], ext: &str) -> Result<PathBuf, SttError> {
        let path = self.output_dir.join(format!("input.{ext}"));
        std::fs::write(&path, audio).map_err(|e| SttError::Io(e.to_string()))?;
        Ok(path)
    }

    pub fn write_transcript(&self, transcript: &ScribeTranscript) -> Result<(), SttError> {
        let json_path = self.output_dir.join("transcript.json");
        let txt_path = self.output_dir.join("transcript.txt");
        let json =
            serde_json::to_vec_pretty(&transcript.raw).map_err(|e| SttError::Io(e.to_string()))?;
        std::fs::write(json_path, json).map_err(|e| SttError::Io(e.to_string()))?;
        std::fs::write(txt_path, transcript.text.as_bytes())
            .map_err(|e| SttError::Io(e.to_string()))?;
        Ok(())
    }

    pub fn write_metadata(
        &self,
        mime_type: &str,
        duration_ms: u64,
        size_bytes: usize,
    ) -> Result<(), SttError> {
        let metadata = SttMetadata {
            session_id: self.session_id.clone(),
            created_at: self.created_at.clone(),
            mime_type: mime_type.to_string(),
            duration_ms,
            size_bytes,
        };
        let path = self.output_dir.join("metadata.json");
        let json = serde_json::to_vec_pretty(&metadata).map_err(|e| SttError::Io(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| SttError::Io(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SttMetadata {
    session_id: String,
    created_at: String,
    mime_type: String,
    duration_ms: u64,
    size_bytes: usize,
}

/// Map an uploaded clip's MIME type to a storage extension. `None` means the
/// type is not accepted.
pub fn extension_for_mime(mime_type: &str) -> Option<&'static str> {
    let essence = mime_type.split(';').next().unwrap_or(mime_type).trim();
    match essence {
        "audio/webm" | "video/webm" => Some("webm"),
        "audio/ogg" | "application/ogg" => Some("ogg"),
        "audio/wav" | "audio/x-wav" | "audio/wave" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/mp4" | "audio/x-m4a" => Some("m4a"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        _ => None,
    }
}

/// Duration of a WAV payload in milliseconds, when it parses as WAV.
/// Non-WAV containers report 0; the renderer does not depend on it.
pub fn wav_duration_ms(audio: &[u8]) -> u64 {
    let cursor = std::io::Cursor::new(audio);
    match hound::WavReader::new(cursor) {
        Ok(reader) => {
            let spec = reader.spec();
            if spec.sample_rate == 0 {
                return 0;
            }
            (reader.duration() as u64 * 1_000) / spec.sample_rate as u64
        }
        Err(_) => 0,
    }
}
