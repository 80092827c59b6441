//! `POST /v1/stt`: accept a recorded clip, transcribe it with Scribe, and
//! persist the session artifacts.

use axum::{
    extract::{Multipart, State},
    response::Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::core::stt::{SttError, SttSession, extension_for_mime, wav_duration_ms};
use crate::errors::app_error::AppError;
use crate::state::AppState;

/// Upload bounds: recordings are short push-to-talk clips.
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;
const MIN_UPLOAD_BYTES: usize = 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SttResponse {
    pub stt_session_id: String,
    pub transcript: String,
    pub audio_path: String,
    pub transcript_path: String,
    pub duration_ms: u64,
    pub mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,
}

pub async fn stt_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<SttResponse>, AppError> {
    let mut upload: Option<(String, String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("malformed multipart body: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let file_name = field.file_name().unwrap_or("input").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::PayloadTooLarge(format!("upload read failed: {e}")))?;
        upload = Some((mime_type, file_name, data.to_vec()));
        break;
    }

    let Some((mime_type, file_name, audio)) = upload else {
        return Err(AppError::BadRequest("missing multipart field 'file'".to_string()));
    };

    if audio.len() > MAX_UPLOAD_BYTES {
        return Err(AppError::PayloadTooLarge(format!(
            "{} bytes exceeds limit",
            audio.len()
        )));
    }
    let Some(ext) = extension_for_mime(&mime_type) else {
        return Err(AppError::UnsupportedMediaType(mime_type));
    };
    if audio.len() < MIN_UPLOAD_BYTES {
        return Err(AppError::UnprocessableEntity(format!(
            "clip too short: {} bytes",
            audio.len()
        )));
    }

    let scribe = state
        .stt
        .as_ref()
        .ok_or_else(|| AppError::InternalServerError("STT client not configured".to_string()))?
        .clone();

    let session = SttSession::create(&state.config.artifacts_dir)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    session
        .save_input_audio(&audio, ext)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let duration_ms = wav_duration_ms(&audio);

    let transcript = scribe
        .transcribe(&file_name, audio.clone(), &mime_type)
        .await
        .map_err(|e| match e {
            SttError::Upstream { .. } | SttError::Transport(_) => {
                AppError::UpstreamFailure(e.to_string())
            }
            other => AppError::InternalServerError(other.to_string()),
        })?;

    session
        .write_transcript(&transcript)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    session
        .write_metadata(&mime_type, duration_ms, audio.len())
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    Ok(Json(SttResponse {
        stt_session_id: session.session_id.clone(),
        transcript: transcript.text.clone(),
        audio_path: session.input_relative_path(ext),
        transcript_path: session.transcript_relative_path(),
        duration_ms,
        mime_type,
        language_code: transcript.language_code,
    }))
}
