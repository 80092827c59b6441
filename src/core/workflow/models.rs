//! Data model for the four-turn workflow: request validation, structured
//! LLM outputs, SSE event payloads, and per-turn result records.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::agents::{AgentId, SlotId};
use crate::core::sessions::TtsSession;
use crate::core::tts::VoiceProfileName;
use crate::errors::taxonomy::ErrorDetail;

/// Kind of utterance a turn produces, paired 1:1 with the turn index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Response,
    Comment,
    Reply,
    Summary,
}

impl MessageKind {
    pub fn for_turn(turn_index: u8) -> MessageKind {
        match turn_index {
            1 => MessageKind::Response,
            2 => MessageKind::Comment,
            3 => MessageKind::Reply,
            _ => MessageKind::Summary,
        }
    }
}

/// Hard caps enforced before text reaches the TTS renderer.
pub const MAX_RESPONSE_CHARS: usize = 400;
pub const MAX_COMMENT_CHARS: usize = 200;
pub const MAX_SUMMARY_CHARS: usize = 1_200;

/// Truncate overlong model output at the last sentence boundary that fits,
/// falling back to a hard cut when no boundary exists.
pub fn truncate_at_sentence(text: &str, max_chars: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_chars {
        return text.to_string();
    }
    let head = &chars[..max_chars];
    let boundary = head
        .iter()
        .rposition(|c| matches!(c, '.' | '!' | '?'));
    match boundary {
        Some(pos) if pos > 0 => head[..=pos].iter().collect(),
        _ => head.iter().collect(),
    }
}

// =============================================================================
// Request model
// =============================================================================

/// One slot assignment in a chat request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAssignment {
    pub slot_id: SlotId,
    pub agent_id: AgentId,
}

/// Body of `POST /v1/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub slots: Vec<SlotAssignment>,
}

impl ChatRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.message.trim().is_empty() {
            return Err("message must not be empty".to_string());
        }
        if self.slots.is_empty() || self.slots.len() > 6 {
            return Err("between 1 and 6 slots are required".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for slot in &self.slots {
            if !(1..=6).contains(&slot.slot_id) {
                return Err(format!("slotId {} out of range 1-6", slot.slot_id));
            }
            if !seen.insert(slot.slot_id) {
                return Err(format!("slotId {} assigned twice", slot.slot_id));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Structured LLM outputs
// =============================================================================

/// Structured output for turns 1 and 3 (and the summary): what to say and
/// which voice to say it with.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SpokenResponse {
    pub text: String,
    pub voice_profile: VoiceProfileName,
}

/// Structured output for turn 2: which peer to address and the comment.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommentSelection {
    #[serde(rename = "targetSlotId")]
    pub target_slot_id: SlotId,
    pub comment: String,
    pub voice_profile: VoiceProfileName,
}

// =============================================================================
// SSE event payloads
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStartEvent {
    pub session_id: String,
    pub slots: Vec<SlotAssignment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartEvent {
    pub session_id: String,
    pub turn_index: u8,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnDoneEvent {
    pub session_id: String,
    pub turn_index: u8,
    pub slot_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotStartEvent {
    pub session_id: String,
    pub turn_index: u8,
    pub kind: MessageKind,
    pub slot_id: SlotId,
    pub agent_id: AgentId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDoneEvent {
    pub session_id: String,
    pub turn_index: u8,
    pub kind: MessageKind,
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub text: String,
    pub voice_profile: VoiceProfileName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_slot_id: Option<SlotId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAudioEvent {
    pub session_id: String,
    pub turn_index: u8,
    pub kind: MessageKind,
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub voice_profile: VoiceProfileName,
    pub audio_format: &'static str,
    pub audio_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotErrorEvent {
    pub session_id: String,
    pub turn_index: u8,
    pub kind: MessageKind,
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStartEvent {
    pub session_id: String,
    pub turn_index: u8,
    pub slot_id: SlotId,
    pub agent_id: AgentId,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDoneEvent {
    pub session_id: String,
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub text: String,
    pub voice_profile: VoiceProfileName,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryAudioEvent {
    pub session_id: String,
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub voice_profile: VoiceProfileName,
    pub audio_format: &'static str,
    pub audio_path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneEvent {
    pub session_id: String,
    pub completed_slots: usize,
    pub turns: u8,
}

/// One named SSE frame, payload already serialised.
#[derive(Debug, Clone)]
pub struct SseMessage {
    pub event: &'static str,
    pub data: String,
}

impl SseMessage {
    pub fn new<T: Serialize>(event: &'static str, payload: &T) -> Self {
        Self {
            event,
            data: serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string()),
        }
    }
}

/// Items flowing through the per-request multiplexer queue. `Done` doubles
/// as the sentinel: it is the last frame and terminates the stream.
#[derive(Debug, Clone)]
pub enum QueueItem {
    Event(SseMessage),
    Done(DoneEvent),
}

// =============================================================================
// Per-turn result records
// =============================================================================

#[derive(Debug, Clone)]
pub struct Turn1Result {
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub text: String,
    pub voice_profile: VoiceProfileName,
    pub success: bool,
    pub audio_rel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Turn2Result {
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub target_slot_id: SlotId,
    pub comment: String,
    pub voice_profile: VoiceProfileName,
    pub success: bool,
    pub audio_rel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Turn3Result {
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub text: String,
    pub voice_profile: VoiceProfileName,
    pub success: bool,
    pub audio_rel: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReceivedComment {
    pub from_slot_id: SlotId,
    pub from_agent_id: AgentId,
    pub comment: String,
}

#[derive(Debug, Clone)]
pub struct SummaryResult {
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub text: String,
    pub voice_profile: VoiceProfileName,
    pub success: bool,
    pub audio_rel: Option<String>,
}

/// Transient state for one request, owned by the workflow supervisor.
/// `BTreeMap` keeps every iteration order deterministic.
pub struct WorkflowState {
    pub session: TtsSession,
    pub slots: Vec<SlotAssignment>,
    pub user_message: String,
    pub turn1: BTreeMap<SlotId, Turn1Result>,
    pub turn2: BTreeMap<SlotId, Turn2Result>,
    pub turn3: BTreeMap<SlotId, Turn3Result>,
    pub comments_by_target: BTreeMap<SlotId, Vec<ReceivedComment>>,
    pub summary: Option<SummaryResult>,
}

impl WorkflowState {
    pub fn new(session: TtsSession, slots: Vec<SlotAssignment>, user_message: String) -> Self {
        Self {
            session,
            slots,
            user_message,
            turn1: BTreeMap::new(),
            turn2: BTreeMap::new(),
            turn3: BTreeMap::new(),
            comments_by_target: BTreeMap::new(),
            summary: None,
        }
    }

    pub fn turn1_succeeded(&self, slot_id: SlotId) -> bool {
        self.turn1.get(&slot_id).map(|r| r.success).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_for_turn_pairing() {
        assert_eq!(MessageKind::for_turn(1), MessageKind::Response);
        assert_eq!(MessageKind::for_turn(2), MessageKind::Comment);
        assert_eq!(MessageKind::for_turn(3), MessageKind::Reply);
        assert_eq!(MessageKind::for_turn(4), MessageKind::Summary);
    }

    #[test]
    fn test_truncate_within_limit_is_identity() {
        assert_eq!(truncate_at_sentence("short.", 200), "short.");
    }

    #[test]
    fn test_truncate_prefers_sentence_boundary() {
        let text = "First wave rises. Second wave falls. Third wave keeps going on and on";
        let cut = truncate_at_sentence(text, 40);
        assert_eq!(cut, "First wave rises. Second wave falls.");
    }

    #[test]
    fn test_truncate_hard_cuts_without_boundary() {
        let text = "no boundary here just a very long run of words";
        let cut = truncate_at_sentence(text, 10);
        assert_eq!(cut, "no boundar");
    }

    #[test]
    fn test_chat_request_validation() {
        let ok: ChatRequest = serde_json::from_str(
            r#"{"message":"hi","slots":[{"slotId":1,"agentId":"gpt-4o"}]}"#,
        )
        .unwrap();
        assert!(ok.validate().is_ok());

        let empty: ChatRequest =
            serde_json::from_str(r#"{"message":"  ","slots":[{"slotId":1,"agentId":"gpt-4o"}]}"#)
                .unwrap();
        assert!(empty.validate().is_err());

        let out_of_range: ChatRequest = serde_json::from_str(
            r#"{"message":"hi","slots":[{"slotId":7,"agentId":"gpt-4o"}]}"#,
        )
        .unwrap();
        assert!(out_of_range.validate().is_err());

        let duplicate: ChatRequest = serde_json::from_str(
            r#"{"message":"hi","slots":[{"slotId":1,"agentId":"gpt-4o"},{"slotId":1,"agentId":"gemini-3"}]}"#,
        )
        .unwrap();
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn test_slot_done_event_wire_shape() {
        let event = SlotDoneEvent {
            session_id: "sid".to_string(),
            turn_index: 2,
            kind: MessageKind::Comment,
            slot_id: 4,
            agent_id: AgentId::Gemini3,
            text: "a ripple".to_string(),
            voice_profile: VoiceProfileName::CalmSoothing,
            target_slot_id: Some(2),
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&event).unwrap()).unwrap();
        assert_eq!(json["sessionId"], "sid");
        assert_eq!(json["kind"], "comment");
        assert_eq!(json["agentId"], "gemini-3");
        assert_eq!(json["voiceProfile"], "calm_soothing");
        assert_eq!(json["targetSlotId"], 2);
    }

    #[test]
    fn test_structured_output_schema_is_closed() {
        let schema = serde_json::to_value(schemars::schema_for!(CommentSelection)).unwrap();
        let properties = schema["properties"].as_object().unwrap();
        assert!(properties.contains_key("targetSlotId"));
        assert!(properties.contains_key("comment"));
        assert!(properties.contains_key("voice_profile"));
    }
}
