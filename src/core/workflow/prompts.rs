//! Prompt rendering for the four turns.
//!
//! Plain formatting functions; the persona, JSON response format, and voice
//! profile table live in the shared system prompt.

use crate::core::agents::{AgentId, SlotId};

use super::models::ReceivedComment;

/// Turn 1: reflect the visitor's whispered message.
pub fn render_turn1_prompt(user_message: &str) -> String {
    format!(
        "A visitor whispers into the water:\n\n\"{user_message}\"\n\n\
         Reflect what you receive in 1-2 short sentences. \
         Respond as JSON: {{\"text\": \"...\", \"voice_profile\": \"...\"}}"
    )
}

/// One peer response shown to a commenting slot.
pub struct PeerResponse {
    pub slot_id: SlotId,
    pub agent_id: AgentId,
    pub text: String,
}

/// Turn 2: pick exactly one peer and speak to their reflection.
pub fn render_turn2_prompt(slot_id: SlotId, peers: &[PeerResponse]) -> String {
    let mut listing = String::new();
    for peer in peers {
        listing.push_str(&format!(
            "- Slot {} ({}): \"{}\"\n",
            peer.slot_id, peer.agent_id, peer.text
        ));
    }
    format!(
        "You are the voice in slot {slot_id}. The other voices reflected:\n\n{listing}\n\
         Choose exactly one of these slots and speak to its reflection in a single short sentence. \
         You may not choose your own slot.\n\
         Respond as JSON: {{\"targetSlotId\": N, \"comment\": \"...\", \"voice_profile\": \"...\"}}"
    )
}

/// Correction appended when the model picked an invalid comment target.
pub fn render_turn2_retry_prompt(invalid_target: SlotId, valid_slots: &[SlotId]) -> String {
    let valid: Vec<String> = valid_slots.iter().map(|s| s.to_string()).collect();
    format!(
        "Slot {invalid_target} is not available to comment on. \
         Choose one of these slots instead: {}. \
         Respond again as JSON: {{\"targetSlotId\": N, \"comment\": \"...\", \"voice_profile\": \"...\"}}",
        valid.join(", ")
    )
}

/// Turn 3: reply to the comments the slot received.
pub fn render_turn3_prompt(
    slot_id: SlotId,
    original_response: &str,
    received: &[ReceivedComment],
) -> String {
    let mut listing = String::new();
    for comment in received {
        listing.push_str(&format!(
            "- Slot {} ({}): \"{}\"\n",
            comment.from_slot_id, comment.from_agent_id, comment.comment
        ));
    }
    format!(
        "You are the voice in slot {slot_id}. You reflected:\n\n\"{original_response}\"\n\n\
         Other voices spoke to your reflection:\n\n{listing}\n\
         Reply to them in 1-2 short sentences, staying within the water.\n\
         Respond as JSON: {{\"text\": \"...\", \"voice_profile\": \"...\"}}"
    )
}

/// Sentiment analysis of the visitor's message (runs beside turn 1).
pub fn render_sentiment_prompt(user_message: &str) -> String {
    format!(
        "A visitor whispered this into a vessel of water:\n\n\"{user_message}\"\n\n\
         Classify the overall emotional tone as \"positive\", \"neutral\", or \"negative\", \
         with a one-sentence justification.\n\
         Respond as JSON: {{\"sentiment\": \"...\", \"justification\": \"...\"}}"
    )
}

/// One utterance fed into the summary prompt, in temporal order.
pub struct DialogueLine {
    pub slot_id: SlotId,
    pub turn_label: &'static str,
    pub text: String,
}

/// Turn 4: distil the whole exchange into one closing paragraph.
pub fn render_turn4_prompt(user_message: &str, lines: &[DialogueLine]) -> String {
    let mut listing = String::new();
    for line in lines {
        listing.push_str(&format!(
            "- Slot {} ({}): \"{}\"\n",
            line.slot_id, line.turn_label, line.text
        ));
    }
    format!(
        "A visitor whispered into the water:\n\n\"{user_message}\"\n\n\
         The voices answered across three turns:\n\n{listing}\n\
         Distil this whole exchange into a single poetic paragraph, as the water itself speaking, \
         letting the dialogue settle back into stillness.\n\
         Respond as JSON: {{\"text\": \"...\", \"voice_profile\": \"...\"}}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn2_prompt_lists_every_peer() {
        let peers = vec![
            PeerResponse {
                slot_id: 2,
                agent_id: AgentId::Gpt4o,
                text: "still water".to_string(),
            },
            PeerResponse {
                slot_id: 5,
                agent_id: AgentId::Gemini3,
                text: "a ripple".to_string(),
            },
        ];
        let prompt = render_turn2_prompt(1, &peers);
        assert!(prompt.contains("slot 1"));
        assert!(prompt.contains("Slot 2 (gpt-4o)"));
        assert!(prompt.contains("Slot 5 (gemini-3)"));
        assert!(prompt.contains("targetSlotId"));
    }

    #[test]
    fn test_turn3_prompt_includes_comments_and_original() {
        let received = vec![ReceivedComment {
            from_slot_id: 3,
            from_agent_id: AgentId::Gpt51,
            comment: "your wave carried far".to_string(),
        }];
        let prompt = render_turn3_prompt(2, "I echoed the wish", &received);
        assert!(prompt.contains("I echoed the wish"));
        assert!(prompt.contains("Slot 3 (gpt-5.1)"));
    }

    #[test]
    fn test_retry_prompt_names_valid_slots() {
        let prompt = render_turn2_retry_prompt(4, &[1, 2, 6]);
        assert!(prompt.contains("Slot 4 is not available"));
        assert!(prompt.contains("1, 2, 6"));
    }

    #[test]
    fn test_sentiment_prompt_carries_message_and_labels() {
        let prompt = render_sentiment_prompt("I miss the sea");
        assert!(prompt.contains("I miss the sea"));
        assert!(prompt.contains("\"positive\""));
        assert!(prompt.contains("justification"));
    }
}
