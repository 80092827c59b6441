//! Path layout for wave decomposition outputs.
//!
//! ```text
//! artifacts/waves/sessions/<sid>/
//!     turn_<n>/<basename>_v3_wave<k>.wav
//!     summary/<basename>_v3_wave<1..6>.wav
//! ```

use std::path::{Path, PathBuf};

pub const WAVES_SESSIONS_BASE: &str = "waves/sessions";

/// Turn index used for the summary clip's wave jobs.
pub const SUMMARY_TURN: u8 = 4;

fn turn_dir_name(turn_index: u8) -> String {
    if turn_index == SUMMARY_TURN {
        "summary".to_string()
    } else {
        format!("turn_{turn_index}")
    }
}

/// Absolute output directory for a session's turn (or summary).
pub fn waves_output_dir(artifacts_root: &Path, session_id: &str, turn_index: u8) -> PathBuf {
    artifacts_root
        .join(WAVES_SESSIONS_BASE)
        .join(session_id)
        .join(turn_dir_name(turn_index))
}

/// Artifact-relative directory for the same location.
pub fn waves_relative_dir(session_id: &str, turn_index: u8) -> String {
    format!(
        "{WAVES_SESSIONS_BASE}/{session_id}/{}",
        turn_dir_name(turn_index)
    )
}
