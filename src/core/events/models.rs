//! Wire models for the renderer push channel.
//!
//! Every frame is UTF-8 JSON in a common envelope with a per-session
//! monotonic `seq`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::agents::SlotId;
use crate::core::sentiment::SentimentValue;
use crate::core::waves::WaveTrack;

/// Common envelope for all push messages.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub session_id: String,
    pub seq: u64,
    pub ts: String,
    pub payload: serde_json::Value,
}

impl EventEnvelope {
    pub fn create<T: Serialize>(
        event_type: &str,
        session_id: &str,
        seq: u64,
        payload: &T,
    ) -> Self {
        Self {
            event_type: event_type.to_string(),
            session_id: session_id.to_string(),
            seq,
            ts: Utc::now().to_rfc3339(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Aggregated readiness status carried by every waves message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadyStatus {
    Complete,
    Partial,
}

/// Wave tracks for one source slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotWaves {
    pub slot_id: SlotId,
    pub agent_id: String,
    pub voice_profile: String,
    pub waves: Vec<WaveTrack>,
}

/// Payload of `turn.waves_ready` (one per turn 1-3).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnWavesPayload {
    pub turn_index: u8,
    pub status: ReadyStatus,
    pub slots_expected: usize,
    pub slots_ready: usize,
    pub slots: Vec<SlotWaves>,
    pub missing_slot_ids: Vec<SlotId>,
}

/// Playback ordering hint inside a dialogue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayOrderItem {
    pub role: &'static str,
    pub slot_id: SlotId,
}

/// One comment/reply dialogue in the aggregate view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueInfo {
    pub dialogue_id: String,
    pub target_slot_id: SlotId,
    pub commenters: Vec<SlotWaves>,
    pub respondent: SlotWaves,
    pub play_order: Vec<PlayOrderItem>,
}

/// Payload of the optional `dialogue.ready` aggregate message.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueReadyPayload {
    pub status: ReadyStatus,
    pub dialogues: Vec<DialogueInfo>,
}

/// Payload of `final_summary.ready`: the six summary waves keyed by slot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalSummaryPayload {
    pub status: ReadyStatus,
    pub text: String,
    pub voice_profile: String,
    pub waves: BTreeMap<SlotId, WaveTrack>,
    pub missing_slot_ids: Vec<SlotId>,
}

/// Payload of `user_sentiment`: early mood signal emitted beside turn 1 so
/// the renderer can match its loading effects to the visitor.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSentimentPayload {
    pub sentiment: SentimentValue,
    pub justification: String,
}

/// Optional handshake from the renderer client.
#[derive(Debug, Clone, Deserialize)]
pub struct HelloMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub client: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HelloAckMessage {
    #[serde(rename = "type")]
    pub message_type: &'static str,
    pub server: &'static str,
}

impl Default for HelloAckMessage {
    fn default() -> Self {
        Self {
            message_type: "hello.ack",
            server: "whispering-water",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_shape() {
        let payload = TurnWavesPayload {
            turn_index: 1,
            status: ReadyStatus::Complete,
            slots_expected: 6,
            slots_ready: 6,
            slots: vec![],
            missing_slot_ids: vec![],
        };
        let envelope = EventEnvelope::create("turn.waves_ready", "sid", 1, &payload);
        let json: serde_json::Value = serde_json::from_str(&envelope.to_json()).unwrap();
        assert_eq!(json["type"], "turn.waves_ready");
        assert_eq!(json["sessionId"], "sid");
        assert_eq!(json["seq"], 1);
        assert!(json["ts"].as_str().unwrap().contains('T'));
        assert_eq!(json["payload"]["status"], "complete");
        assert_eq!(json["payload"]["turnIndex"], 1);
    }
}
