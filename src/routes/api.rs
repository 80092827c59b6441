use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::path::Path;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::{api, chat, stt};
use crate::state::AppState;
use std::sync::Arc;

/// Create the versioned API router. Artifacts (TTS clips, wave tracks,
/// manifests) are served read-only under `/v1/audio`.
pub fn create_api_router(artifacts_dir: &Path) -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/health", get(api::health_check))
        .route("/v1/agents", get(api::list_agents))
        .route("/v1/chat", post(chat::chat_handler))
        .route("/v1/reset", post(api::reset_conversations))
        .route(
            "/v1/stt",
            post(stt::stt_handler).layer(DefaultBodyLimit::max(stt::MAX_UPLOAD_BYTES)),
        )
        .nest_service("/v1/audio", ServeDir::new(artifacts_dir))
        .layer(TraceLayer::new_for_http())
}
