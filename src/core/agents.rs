//! Agent registry: the fixed six-agent enumeration and its model mapping.
//!
//! `AgentId` is UI-stable; rewiring a slot to a newer provider model only
//! changes the mapping table below.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical speaker position around the basin (1-6).
pub type SlotId = u8;

/// The six symbolic agent identities selectable in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentId {
    #[serde(rename = "claude-sonnet-4-5")]
    ClaudeSonnet45,
    #[serde(rename = "claude-opus-4-5")]
    ClaudeOpus45,
    #[serde(rename = "gpt-5.2")]
    Gpt52,
    #[serde(rename = "gpt-5.1")]
    Gpt51,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gemini-3")]
    Gemini3,
}

impl AgentId {
    pub const ALL: [AgentId; 6] = [
        AgentId::ClaudeSonnet45,
        AgentId::ClaudeOpus45,
        AgentId::Gpt52,
        AgentId::Gpt51,
        AgentId::Gpt4o,
        AgentId::Gemini3,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentId::ClaudeSonnet45 => "claude-sonnet-4-5",
            AgentId::ClaudeOpus45 => "claude-opus-4-5",
            AgentId::Gpt52 => "gpt-5.2",
            AgentId::Gpt51 => "gpt-5.1",
            AgentId::Gpt4o => "gpt-4o",
            AgentId::Gemini3 => "gemini-3",
        }
    }

    /// `provider/model` string consumed by the LLM gateway.
    pub fn model(&self) -> &'static str {
        match self {
            AgentId::ClaudeSonnet45 => "anthropic/claude-sonnet-4-20250514",
            AgentId::ClaudeOpus45 => "anthropic/claude-opus-4-20250514",
            AgentId::Gpt52 => "openai/gpt-4.1",
            AgentId::Gpt51 => "openai/gpt-4o",
            AgentId::Gpt4o => "openai/gpt-4o",
            AgentId::Gemini3 => "gemini/gemini-2.0-flash",
        }
    }

    pub fn info(&self) -> AgentInfo {
        let (name, provider, description, color) = match self {
            AgentId::ClaudeSonnet45 => (
                "Claude Sonnet 4.5",
                "anthropic",
                "Anthropic's fast, capable model",
                "#7c3aed",
            ),
            AgentId::ClaudeOpus45 => (
                "Claude Opus 4.5",
                "anthropic",
                "Anthropic's most capable model",
                "#a855f7",
            ),
            AgentId::Gpt52 => ("GPT 5.2", "openai", "Latest GPT-4 series model", "#10b981"),
            AgentId::Gpt51 => ("GPT 5.1", "openai", "Advanced GPT-4o model", "#06b6d4"),
            AgentId::Gpt4o => ("GPT 4o", "openai", "OpenAI's multimodal flagship", "#0ea5e9"),
            AgentId::Gemini3 => ("Gemini 3", "google", "Google's fast Gemini model", "#f59e0b"),
        };
        AgentInfo {
            id: *self,
            name,
            provider,
            model: self.model(),
            description,
            color,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent descriptor served by `GET /v1/agents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: AgentId,
    pub name: &'static str,
    pub provider: &'static str,
    pub model: &'static str,
    pub description: &'static str,
    pub color: &'static str,
}

/// All six agent descriptors, in stable UI order.
pub fn agent_catalog() -> Vec<AgentInfo> {
    AgentId::ALL.iter().map(|a| a.info()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_round_trip_uses_ui_ids() {
        let json = serde_json::to_string(&AgentId::ClaudeSonnet45).unwrap();
        assert_eq!(json, "\"claude-sonnet-4-5\"");
        let back: AgentId = serde_json::from_str("\"gemini-3\"").unwrap();
        assert_eq!(back, AgentId::Gemini3);
    }

    #[test]
    fn test_every_agent_maps_to_a_provider_model() {
        for agent in AgentId::ALL {
            let model = agent.model();
            let (provider, rest) = model.split_once('/').expect("provider prefix");
            assert!(matches!(provider, "openai" | "anthropic" | "gemini"));
            assert!(!rest.is_empty());
        }
    }

    #[test]
    fn test_catalog_has_six_stable_entries() {
        let catalog = agent_catalog();
        assert_eq!(catalog.len(), 6);
        assert_eq!(catalog[0].id, AgentId::ClaudeSonnet45);
        assert_eq!(catalog[5].id, AgentId::Gemini3);
    }
}
