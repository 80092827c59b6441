//! Process-wide per-slot conversation store.
//!
//! Conversations persist across requests by design: a visitor speaking twice
//! into the basin continues the same six threads. `reset_all` is the only
//! flush. The orchestrator serialises writes per slot within a request, so a
//! plain mutex around the map is all the locking this needs.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::agents::SlotId;
use crate::core::llm::{ChatMessage, Role};

/// Ordered transcript for one slot. The first entry is always the shared
/// persona system prompt.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    fn seeded(system_prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn add_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }

    pub fn history(&self) -> Vec<ChatMessage> {
        self.messages.clone()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

pub struct ConversationStore {
    system_prompt: String,
    conversations: Mutex<HashMap<SlotId, Conversation>>,
}

impl ConversationStore {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Append the user message to the slot's conversation, seeding it with
    /// the system prompt on first access.
    pub fn append_user(&self, slot_id: SlotId, content: impl Into<String>) {
        let mut conversations = self.conversations.lock().expect("conversation store poisoned");
        conversations
            .entry(slot_id)
            .or_insert_with(|| Conversation::seeded(&self.system_prompt))
            .add_user(content);
    }

    pub fn append_assistant(&self, slot_id: SlotId, content: impl Into<String>) {
        let mut conversations = self.conversations.lock().expect("conversation store poisoned");
        conversations
            .entry(slot_id)
            .or_insert_with(|| Conversation::seeded(&self.system_prompt))
            .add_assistant(content);
    }

    /// Snapshot of the slot's full history (seeding the conversation if this
    /// is its first access).
    pub fn history(&self, slot_id: SlotId) -> Vec<ChatMessage> {
        let mut conversations = self.conversations.lock().expect("conversation store poisoned");
        conversations
            .entry(slot_id)
            .or_insert_with(|| Conversation::seeded(&self.system_prompt))
            .history()
    }

    /// Clear everything. Returns the slot ids that held conversations, or
    /// all six when none were active, so the UI always gets a full list.
    pub fn reset_all(&self) -> Vec<SlotId> {
        let mut conversations = self.conversations.lock().expect("conversation store poisoned");
        let mut cleared: Vec<SlotId> = conversations.keys().copied().collect();
        conversations.clear();
        cleared.sort_unstable();
        if cleared.is_empty() {
            cleared = vec![1, 2, 3, 4, 5, 6];
        }
        cleared
    }

    pub fn active_slots(&self) -> Vec<SlotId> {
        let conversations = self.conversations.lock().expect("conversation store poisoned");
        let mut slots: Vec<SlotId> = conversations.keys().copied().collect();
        slots.sort_unstable();
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_access_seeds_system_prompt() {
        let store = ConversationStore::new("you are water");
        let history = store.history(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content, "you are water");
    }

    #[test]
    fn test_appends_preserve_order() {
        let store = ConversationStore::new("persona");
        store.append_user(2, "hello");
        store.append_assistant(2, "ripple");
        store.append_user(2, "again");

        let history = store.history(2);
        assert_eq!(history.len(), 4);
        assert_eq!(history[1].content, "hello");
        assert_eq!(history[2].role, Role::Assistant);
        assert_eq!(history[3].content, "again");
    }

    #[test]
    fn test_slots_are_independent() {
        let store = ConversationStore::new("persona");
        store.append_user(1, "one");
        store.append_user(2, "two");
        assert_eq!(store.history(1).len(), 2);
        assert_eq!(store.history(2).len(), 2);
        assert_eq!(store.history(3).len(), 1);
    }

    #[test]
    fn test_reset_all_reports_active_slots() {
        let store = ConversationStore::new("persona");
        store.append_user(3, "x");
        store.append_user(5, "y");
        assert_eq!(store.reset_all(), vec![3, 5]);
        // Nothing active: report all six anyway.
        assert_eq!(store.reset_all(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_reset_clears_history() {
        let store = ConversationStore::new("persona");
        store.append_user(1, "before");
        store.reset_all();
        let history = store.history(1);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
    }
}
