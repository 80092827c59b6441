use axum::Router;
use axum::http::{HeaderValue, Method};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tracing_subscriber::EnvFilter;

use anyhow::anyhow;

use resonance::{AppState, ServerConfig, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so the log level applies from the start
    let config = ServerConfig::from_env().map_err(|e| anyhow!(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    let address = config.address();
    tracing::info!("Starting server on {address}");

    // CORS for the installation UI dev hosts
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(AllowHeaders::mirror_request());

    // Create application state (starts the wave pool and event orchestrator)
    let artifacts_dir = config.artifacts_dir.clone();
    let app_state = AppState::new(config).await;

    // Combine API + renderer push routes
    let app = Router::new()
        .merge(routes::api::create_api_router(&artifacts_dir))
        .merge(routes::ws::create_ws_router())
        .layer(cors)
        .with_state(app_state);

    let listener = TcpListener::bind(&address).await?;
    tracing::info!("Server listening on {address}");

    axum::serve(listener, app).await?;

    Ok(())
}
