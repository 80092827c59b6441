//! `POST /v1/chat`: the four-turn workflow as one ordered SSE stream.
//!
//! The handler validates the request, allocates the session, spawns the
//! workflow, and drains the multiplexer queue into the response body. Events
//! from concurrent per-slot producers arrive in queue order; the stream
//! always terminates with a single `done` event.

use axum::{
    extract::State,
    http::HeaderName,
    response::{
        AppendHeaders, IntoResponse, Json, Response,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::core::sessions::TtsSession;
use crate::core::workflow::models::{ChatRequest, QueueItem, SseMessage};
use crate::core::workflow::spawn_workflow;
use crate::errors::app_error::AppError;
use crate::state::AppState;

pub async fn chat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    request.validate().map_err(AppError::BadRequest)?;

    tracing::info!(
        "Chat request: message='{}', slots={:?}",
        request.message.chars().take(50).collect::<String>(),
        request
            .slots
            .iter()
            .map(|s| (s.slot_id, s.agent_id))
            .collect::<Vec<_>>()
    );

    let session = TtsSession::create(&state.config.artifacts_dir)
        .map_err(|e| AppError::InternalServerError(format!("session directory: {e}")))?;

    let rx = spawn_workflow(
        state.workflow_context(),
        session,
        request.message,
        request.slots,
    );

    let stream = UnboundedReceiverStream::new(rx).map(|item| {
        let message = match item {
            QueueItem::Event(message) => message,
            QueueItem::Done(done) => SseMessage::new("done", &done),
        };
        Ok::<Event, Infallible>(Event::default().event(message.event).data(message.data))
    });

    let sse = Sse::new(stream).keep_alive(KeepAlive::default());
    // Disable nginx buffering so events reach the UI as they happen.
    let headers = AppendHeaders([(HeaderName::from_static("x-accel-buffering"), "no")]);
    Ok((headers, sse).into_response())
}
