//! Per-session readiness state for the event orchestrator.
//!
//! Touched only by the orchestrator's single consumer task; no locking.

use std::collections::{BTreeMap, BTreeSet};

use crate::core::agents::SlotId;
use crate::core::waves::WaveTrack;

/// Metadata recorded when a slot's wave job completes. Carried through the
/// job itself (source of truth from the workflow), never parsed from
/// filenames.
#[derive(Debug, Clone)]
pub struct SlotWaveMeta {
    pub slot_id: SlotId,
    pub agent_id: String,
    pub voice_profile: String,
    pub tracks: Vec<WaveTrack>,
}

/// A comment/reply dialogue computed after turn 3.
#[derive(Debug, Clone)]
pub struct DialogueSpec {
    pub dialogue_id: String,
    pub target_slot_id: SlotId,
    pub commenter_slots: Vec<SlotId>,
    pub respondent_slot: SlotId,
}

/// Everything the orchestrator tracks for one session.
#[derive(Debug, Default)]
pub struct SessionEventsState {
    pub session_id: String,

    /// Slots whose wave jobs are expected, per turn (set at `turn_complete`).
    pub expected: BTreeMap<u8, BTreeSet<SlotId>>,
    /// Wave results received so far, per turn.
    pub ready: BTreeMap<u8, BTreeMap<SlotId, SlotWaveMeta>>,
    /// Turns whose `turn_complete` hook has fired.
    pub turn_complete_seen: BTreeSet<u8>,
    /// Turns whose `turn.waves_ready` has been published.
    pub turn_emitted: BTreeSet<u8>,

    pub dialogues: Vec<DialogueSpec>,
    pub dialogue_emitted: bool,

    /// Summary text/profile, set by `summary_complete`.
    pub summary_text: Option<(String, String)>,
    /// The six tracks of the summary wave job.
    pub summary_tracks: Option<SlotWaveMeta>,
    pub summary_emitted: bool,

    /// Set once the workflow has finished; enables cleanup.
    pub workflow_done: bool,

    seq: u64,
}

impl SessionEventsState {
    pub fn new(session_id: String) -> Self {
        Self {
            session_id,
            ..Default::default()
        }
    }

    /// Next sequence number; starts at 1 and increases monotonically.
    pub fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn record_turn_result(&mut self, turn_index: u8, meta: SlotWaveMeta) {
        self.ready
            .entry(turn_index)
            .or_default()
            .insert(meta.slot_id, meta);
    }

    /// All expected wave jobs for a turn are in.
    pub fn is_turn_ready(&self, turn_index: u8) -> bool {
        let Some(expected) = self.expected.get(&turn_index) else {
            return false;
        };
        let ready = self.ready.get(&turn_index);
        expected
            .iter()
            .all(|slot| ready.map(|r| r.contains_key(slot)).unwrap_or(false))
    }

    pub fn missing_slots(&self, turn_index: u8) -> Vec<SlotId> {
        let Some(expected) = self.expected.get(&turn_index) else {
            return Vec::new();
        };
        let ready = self.ready.get(&turn_index);
        expected
            .iter()
            .filter(|slot| !ready.map(|r| r.contains_key(slot)).unwrap_or(false))
            .copied()
            .collect()
    }

    /// Emission work for this session is finished; the state can be dropped.
    pub fn is_settled(&self) -> bool {
        if !self.workflow_done {
            return false;
        }
        let turns_settled = self
            .turn_complete_seen
            .iter()
            .all(|turn| self.turn_emitted.contains(turn));
        let summary_settled = self.summary_text.is_none() || self.summary_emitted;
        turns_settled && summary_settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(slot_id: SlotId) -> SlotWaveMeta {
        SlotWaveMeta {
            slot_id,
            agent_id: "gpt-4o".to_string(),
            voice_profile: "calm_soothing".to_string(),
            tracks: vec![],
        }
    }

    #[test]
    fn test_seq_starts_at_one_and_increases() {
        let mut state = SessionEventsState::new("sid".to_string());
        assert_eq!(state.next_seq(), 1);
        assert_eq!(state.next_seq(), 2);
        assert_eq!(state.next_seq(), 3);
    }

    #[test]
    fn test_turn_readiness_tracks_expected_set() {
        let mut state = SessionEventsState::new("sid".to_string());
        state.expected.insert(1, [1, 2, 3].into_iter().collect());

        assert!(!state.is_turn_ready(1));
        state.record_turn_result(1, meta(1));
        state.record_turn_result(1, meta(3));
        assert!(!state.is_turn_ready(1));
        assert_eq!(state.missing_slots(1), vec![2]);

        state.record_turn_result(1, meta(2));
        assert!(state.is_turn_ready(1));
        assert!(state.missing_slots(1).is_empty());
    }

    #[test]
    fn test_unknown_turn_is_never_ready() {
        let state = SessionEventsState::new("sid".to_string());
        assert!(!state.is_turn_ready(2));
        assert!(state.missing_slots(2).is_empty());
    }

    #[test]
    fn test_settlement_requires_all_emissions() {
        let mut state = SessionEventsState::new("sid".to_string());
        state.workflow_done = true;
        assert!(state.is_settled());

        state.turn_complete_seen.insert(1);
        assert!(!state.is_settled());
        state.turn_emitted.insert(1);
        assert!(state.is_settled());

        state.summary_text = Some(("text".to_string(), "calm_soothing".to_string()));
        assert!(!state.is_settled());
        state.summary_emitted = true;
        assert!(state.is_settled());
    }
}
