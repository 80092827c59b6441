//! Voice profile table for the six installation voices.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed set of voice profiles an agent can pick per utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VoiceProfileName {
    FriendlyCasual,
    WarmProfessional,
    EnergeticUpbeat,
    CalmSoothing,
    ConfidentCharming,
    PlayfulExpressive,
}

/// Profile used when an unknown name arrives from outside the typed path.
pub const FALLBACK_PROFILE: VoiceProfileName = VoiceProfileName::FriendlyCasual;

impl VoiceProfileName {
    pub const ALL: [VoiceProfileName; 6] = [
        VoiceProfileName::FriendlyCasual,
        VoiceProfileName::WarmProfessional,
        VoiceProfileName::EnergeticUpbeat,
        VoiceProfileName::CalmSoothing,
        VoiceProfileName::ConfidentCharming,
        VoiceProfileName::PlayfulExpressive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceProfileName::FriendlyCasual => "friendly_casual",
            VoiceProfileName::WarmProfessional => "warm_professional",
            VoiceProfileName::EnergeticUpbeat => "energetic_upbeat",
            VoiceProfileName::CalmSoothing => "calm_soothing",
            VoiceProfileName::ConfidentCharming => "confident_charming",
            VoiceProfileName::PlayfulExpressive => "playful_expressive",
        }
    }

    /// Parse a profile name, falling back to [`FALLBACK_PROFILE`] with a
    /// warning for anything unrecognised.
    pub fn resolve(name: &str) -> VoiceProfileName {
        match name {
            "friendly_casual" => VoiceProfileName::FriendlyCasual,
            "warm_professional" => VoiceProfileName::WarmProfessional,
            "energetic_upbeat" => VoiceProfileName::EnergeticUpbeat,
            "calm_soothing" => VoiceProfileName::CalmSoothing,
            "confident_charming" => VoiceProfileName::ConfidentCharming,
            "playful_expressive" => VoiceProfileName::PlayfulExpressive,
            other => {
                tracing::warn!(
                    "Invalid profile '{}', falling back to '{}'",
                    other,
                    FALLBACK_PROFILE.as_str()
                );
                FALLBACK_PROFILE
            }
        }
    }
}

impl fmt::Display for VoiceProfileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Voice-shaping parameters sent to ElevenLabs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
    pub style: f32,
    pub use_speaker_boost: bool,
    pub speed: f32,
}

/// Complete voice profile definition.
#[derive(Debug, Clone)]
pub struct VoiceProfile {
    pub name: VoiceProfileName,
    pub voice_id: &'static str,
    pub voice_name: &'static str,
    pub description: &'static str,
    pub model_id: &'static str,
    pub settings: VoiceSettings,
}

const DEFAULT_MODEL_ID: &str = "eleven_flash_v2_5";

pub fn get_profile(name: VoiceProfileName) -> VoiceProfile {
    let (voice_id, voice_name, description, stability, style, speed) = match name {
        VoiceProfileName::FriendlyCasual => (
            "cgSgspJ2msm6clMCkdW9",
            "Jessica",
            "Young female, American, expressive, conversational",
            0.45,
            0.15,
            1.0,
        ),
        VoiceProfileName::WarmProfessional => (
            "cjVigY5qzO86Huf0OWal",
            "Eric",
            "Middle-aged male, American, friendly, professional",
            0.55,
            0.1,
            0.95,
        ),
        VoiceProfileName::EnergeticUpbeat => (
            "FGY2WhTYpPnrIDTdsKH5",
            "Laura",
            "Young female, American, upbeat, energetic",
            0.35,
            0.25,
            1.05,
        ),
        VoiceProfileName::CalmSoothing => (
            "21m00Tcm4TlvDq8ikWAM",
            "Rachel",
            "Young female, American, calm, pleasant",
            0.65,
            0.05,
            0.92,
        ),
        VoiceProfileName::ConfidentCharming => (
            "JBFqnCBsd6RMkjVDRZzb",
            "George",
            "Middle-aged male, British, warm, articulate",
            0.50,
            0.15,
            0.98,
        ),
        VoiceProfileName::PlayfulExpressive => (
            "EXAVITQu4vr4xnSDxMaL",
            "Sarah",
            "Young female, expressive, dynamic range",
            0.30,
            0.30,
            1.0,
        ),
    };

    VoiceProfile {
        name,
        voice_id,
        voice_name,
        description,
        model_id: DEFAULT_MODEL_ID,
        settings: VoiceSettings {
            stability,
            similarity_boost: 0.75,
            style,
            use_speaker_boost: true,
            speed,
        },
    }
}
