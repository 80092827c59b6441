//! Session store: artifact directory layout for one chat request.
//!
//! Each request allocates a UUID session owning the TTS clip tree:
//!
//! ```text
//! artifacts/tts/sessions/<sid>/
//!     turn_<n>/<slot>_<agentId>_<voiceProfile>[_comment_to_slot-<t>].wav
//!     summary/<agentId>_<voiceProfile>.wav
//!     session.json
//! ```
//!
//! Paths are deterministic given session id, turn, slot, agent, and voice
//! profile, so the renderer can derive them independently.

use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::core::agents::SlotId;

pub const TTS_SESSIONS_BASE: &str = "tts/sessions";

/// Strip characters that have no business in a filename.
pub fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct TtsSession {
    pub session_id: String,
    artifacts_root: PathBuf,
    session_dir: PathBuf,
}

impl TtsSession {
    /// Allocate a new session and create its root directory.
    pub fn create(artifacts_root: &Path) -> std::io::Result<Self> {
        let session_id = Uuid::new_v4().to_string();
        Self::with_id(artifacts_root, session_id)
    }

    pub fn with_id(artifacts_root: &Path, session_id: String) -> std::io::Result<Self> {
        let session_dir = artifacts_root.join(TTS_SESSIONS_BASE).join(&session_id);
        std::fs::create_dir_all(&session_dir)?;
        Ok(Self {
            session_id,
            artifacts_root: artifacts_root.to_path_buf(),
            session_dir,
        })
    }

    pub fn artifacts_root(&self) -> &Path {
        &self.artifacts_root
    }

    fn turn_file_name(
        slot_id: SlotId,
        agent_id: &str,
        voice_profile: &str,
        comment_target: Option<SlotId>,
    ) -> String {
        let agent = sanitize_component(agent_id);
        let profile = sanitize_component(voice_profile);
        match comment_target {
            Some(target) => format!("{slot_id}_{agent}_{profile}_comment_to_slot-{target}.wav"),
            None => format!("{slot_id}_{agent}_{profile}.wav"),
        }
    }

    /// Absolute path for a turn clip. Turn 2 clips carry the comment target.
    pub fn turn_audio_path(
        &self,
        turn_index: u8,
        slot_id: SlotId,
        agent_id: &str,
        voice_profile: &str,
        comment_target: Option<SlotId>,
    ) -> PathBuf {
        self.session_dir
            .join(format!("turn_{turn_index}"))
            .join(Self::turn_file_name(slot_id, agent_id, voice_profile, comment_target))
    }

    /// Artifact-relative path for the same clip (used in events and URLs).
    pub fn turn_relative_path(
        &self,
        turn_index: u8,
        slot_id: SlotId,
        agent_id: &str,
        voice_profile: &str,
        comment_target: Option<SlotId>,
    ) -> String {
        format!(
            "{TTS_SESSIONS_BASE}/{}/turn_{turn_index}/{}",
            self.session_id,
            Self::turn_file_name(slot_id, agent_id, voice_profile, comment_target)
        )
    }

    pub fn summary_audio_path(&self, agent_id: &str, voice_profile: &str) -> PathBuf {
        self.session_dir.join("summary").join(format!(
            "{}_{}.wav",
            sanitize_component(agent_id),
            sanitize_component(voice_profile)
        ))
    }

    pub fn summary_relative_path(&self, agent_id: &str, voice_profile: &str) -> String {
        format!(
            "{TTS_SESSIONS_BASE}/{}/summary/{}_{}.wav",
            self.session_id,
            sanitize_component(agent_id),
            sanitize_component(voice_profile)
        )
    }

    /// Write the session manifest. Best-effort: failures are logged, never
    /// propagated to the request.
    pub fn write_manifest(&self, manifest: &SessionManifest) {
        let path = self.session_dir.join("session.json");
        match serde_json::to_vec_pretty(manifest) {
            Ok(bytes) => {
                if let Err(e) = std::fs::write(&path, bytes) {
                    tracing::warn!("Failed to write manifest {}: {}", path.display(), e);
                } else {
                    tracing::info!("Manifest written: {}", path.display());
                }
            }
            Err(e) => tracing::warn!("Failed to serialise manifest: {}", e),
        }
    }
}

/// `session.json` payload: slot assignments and every artifact produced.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionManifest {
    pub session_id: String,
    pub created_at: String,
    pub slots: Vec<ManifestSlot>,
    pub turn1: Vec<ManifestEntry>,
    pub turn2: Vec<ManifestEntry>,
    pub turn3: Vec<ManifestEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<ManifestSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSlot {
    pub slot_id: SlotId,
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    pub slot_id: SlotId,
    pub agent_id: String,
    pub voice_profile: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_slot_id: Option<SlotId>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub received_comments: Vec<ManifestComment>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestComment {
    pub from_slot_id: SlotId,
    pub from_agent_id: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestSummary {
    pub agent_id: String,
    pub voice_profile: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths_are_deterministic() {
        let dir = tempdir().unwrap();
        let session = TtsSession::with_id(dir.path(), "abc-123".to_string()).unwrap();

        let rel = session.turn_relative_path(1, 3, "gpt-4o", "calm_soothing", None);
        assert_eq!(rel, "tts/sessions/abc-123/turn_1/3_gpt-4o_calm_soothing.wav");

        let abs = session.turn_audio_path(1, 3, "gpt-4o", "calm_soothing", None);
        assert!(abs.ends_with("tts/sessions/abc-123/turn_1/3_gpt-4o_calm_soothing.wav"));
    }

    #[test]
    fn test_turn2_paths_carry_comment_target() {
        let dir = tempdir().unwrap();
        let session = TtsSession::with_id(dir.path(), "abc-123".to_string()).unwrap();

        let rel = session.turn_relative_path(2, 5, "gemini-3", "playful_expressive", Some(2));
        assert_eq!(
            rel,
            "tts/sessions/abc-123/turn_2/5_gemini-3_playful_expressive_comment_to_slot-2.wav"
        );
    }

    #[test]
    fn test_summary_paths() {
        let dir = tempdir().unwrap();
        let session = TtsSession::with_id(dir.path(), "abc-123".to_string()).unwrap();
        assert_eq!(
            session.summary_relative_path("gpt-4o", "warm_professional"),
            "tts/sessions/abc-123/summary/gpt-4o_warm_professional.wav"
        );
    }

    #[test]
    fn test_sanitize_strips_path_separators() {
        assert_eq!(sanitize_component("../evil/name"), "..-evil-name");
        assert_eq!(sanitize_component("gpt-5.1"), "gpt-5.1");
    }

    #[test]
    fn test_create_makes_directory() {
        let dir = tempdir().unwrap();
        let session = TtsSession::create(dir.path()).unwrap();
        assert!(dir
            .path()
            .join(TTS_SESSIONS_BASE)
            .join(&session.session_id)
            .is_dir());
    }
}
