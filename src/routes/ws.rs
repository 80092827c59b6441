use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::ws;
use crate::state::AppState;
use std::sync::Arc;

/// Create the renderer push-channel router.
///
/// The endpoint is unauthenticated: the renderer host lives on the same
/// installation network, and the channel only pushes artifact paths.
pub fn create_ws_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/events", get(ws::events_ws_handler))
        .layer(TraceLayer::new_for_http())
}
