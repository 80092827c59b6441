//! Renderer push channel: readiness aggregation and the single-client
//! WebSocket feed.

pub mod models;
pub mod orchestrator;
pub mod state;

pub use models::{
    DialogueReadyPayload, EventEnvelope, FinalSummaryPayload, HelloAckMessage, ReadyStatus,
    SlotWaves, TurnWavesPayload, UserSentimentPayload,
};
pub use orchestrator::{EventsHandle, EventsOrchestrator};
pub use state::{DialogueSpec, SessionEventsState, SlotWaveMeta};
