use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::agents::{AgentInfo, SlotId, agent_catalog};
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check handler
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Serialize)]
pub struct AgentsResponse {
    pub agents: Vec<AgentInfo>,
}

/// `GET /v1/agents`: the six stable agent descriptors.
pub async fn list_agents() -> Json<AgentsResponse> {
    Json(AgentsResponse {
        agents: agent_catalog(),
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub status: String,
    pub cleared_slots: Vec<SlotId>,
}

/// `POST /v1/reset`: flush every slot conversation.
pub async fn reset_conversations(State(state): State<Arc<AppState>>) -> Json<ResetResponse> {
    let cleared = state.conversations.reset_all();
    tracing::info!("Reset conversations for slots: {:?}", cleared);
    Json(ResetResponse {
        status: "ok".to_string(),
        cleared_slots: cleared,
    })
}
