//! `WS /v1/events`: the renderer push channel.
//!
//! Single-client policy: a new connection evicts the incumbent (the
//! orchestrator drops the old sender, which ends its writer task and closes
//! the socket). The server only pushes; the one recognised client message is
//! an optional `hello`, answered with `hello.ack`.

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::events::{HelloAckMessage, models::HelloMessage};
use crate::state::AppState;

pub async fn events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    if !state.events.is_enabled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "events channel disabled").into_response();
    }
    info!("Renderer WebSocket upgrade requested");
    ws.on_upgrade(move |socket| handle_events_socket(socket, state))
}

async fn handle_events_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<String>();
    let client_id = state.events.attach_client(frame_tx.clone());

    // Writer: every outbound frame goes through one task. It ends when the
    // orchestrator drops the sender (eviction) or the socket dies.
    let writer = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<HelloMessage>(&text) {
                Ok(hello) if hello.message_type == "hello" => {
                    info!("Renderer hello from '{}', sending hello.ack", hello.client);
                    let ack = serde_json::to_string(&HelloAckMessage::default())
                        .unwrap_or_else(|_| "{}".to_string());
                    let _ = frame_tx.send(ack);
                }
                Ok(other) => debug!("Unknown renderer message type: {}", other.message_type),
                Err(_) => warn!(
                    "Renderer sent invalid JSON: {}",
                    text.chars().take(100).collect::<String>()
                ),
            },
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    state.events.detach_client(client_id);
    writer.abort();
    info!("Renderer WebSocket connection ended");
}
