use std::env;
use std::path::PathBuf;

/// Default persona prompt shared by all six slots.
///
/// Seeded into every conversation on first access; the structured response
/// format and voice profile table live here so individual turn prompts can
/// stay short.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a voice within Whispering Water\u{2014}an installation where visitors whisper secrets, wishes, or confessions into a vessel of water.

Like ancient wells that received prayers without reply, you receive what is spoken and reflect its emotional essence. Your words become waves; the water carries them briefly before returning to stillness.

## Guidelines
- Receive without judgment, reflect emotional essence
- Speak in 1-2 sentences only (under 150 characters)
- Reference water, waves, ripples, or stillness naturally
- Let meaning dissolve into feeling

## Response Format
Always respond with valid JSON. The structure depends on what is asked:
- For reflections: {\"text\": \"...\", \"voice_profile\": \"...\"}
- For acknowledgments: {\"targetSlotId\": N, \"comment\": \"...\", \"voice_profile\": \"...\"}

## Voice Profiles
Choose based on the emotional quality you sense:

| Profile | Character | When to Use |
|---------|-----------|-------------|
| friendly_casual | Young female, warm tone | Gentle acknowledgment, soft ripples |
| warm_professional | Male, grounded presence | Steady reflection, deep currents |
| energetic_upbeat | Young female, bright | Sparkling response, dancing light |
| calm_soothing | Female, still waters | Quiet receiving, peaceful depth |
| confident_charming | Male, British, articulate | Clear resonance, measured waves |
| playful_expressive | Female, dynamic range | Shifting patterns, playful motion |";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub log_level: String,

    /// Root directory for all generated artifacts (TTS clips, wave tracks, STT sessions).
    pub artifacts_dir: PathBuf,

    // LLM behavior
    pub default_system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_s: u64,
    pub retries: u32,

    // Turn 4 summary
    pub summary_temperature: f32,

    // Sentiment analysis (early mood signal for the renderer)
    pub sentiment_enabled: bool,
    pub sentiment_model: String,
    pub sentiment_temperature: f32,
    pub sentiment_timeout_s: f64,
    pub sentiment_max_tokens: u32,

    // Wave decomposition
    pub waves_enabled: bool,
    pub waves_max_workers: usize,
    pub waves_queue_max_size: usize,
    pub waves_job_timeout_s: f64,
    pub waves_processing_sr: u32,

    // Renderer push channel
    pub events_ws_enabled: bool,
    pub events_turn1_timeout_s: f64,
    pub events_dialogue_timeout_s: f64,

    // Provider secrets (consumed only by the LLM gateway / TTS / STT clients)
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:4173".to_string(),
            ],
            log_level: "info".to_string(),
            artifacts_dir: PathBuf::from("artifacts"),
            default_system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: 200,
            timeout_s: 60,
            retries: 3,
            summary_temperature: 0.5,
            sentiment_enabled: true,
            sentiment_model: "openai/gpt-4o-mini".to_string(),
            sentiment_temperature: 0.3,
            sentiment_timeout_s: 10.0,
            sentiment_max_tokens: 100,
            waves_enabled: true,
            waves_max_workers: 2,
            waves_queue_max_size: 100,
            waves_job_timeout_s: 60.0,
            waves_processing_sr: 8000,
            events_ws_enabled: true,
            events_turn1_timeout_s: 15.0,
            events_dialogue_timeout_s: 30.0,
            openai_api_key: None,
            anthropic_api_key: None,
            google_api_key: None,
            elevenlabs_api_key: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);
        let port = env::var("PORT")
            .unwrap_or_else(|_| defaults.port.to_string())
            .parse::<u16>()
            .map_err(|e| format!("Invalid port number: {e}"))?;

        let cors_origins = match env::var("CORS_ORIGINS") {
            Ok(raw) => raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Err(_) => defaults.cors_origins,
        };

        Ok(ServerConfig {
            host,
            port,
            cors_origins,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            artifacts_dir: env::var("ARTIFACTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifacts_dir),
            default_system_prompt: env::var("DEFAULT_SYSTEM_PROMPT")
                .unwrap_or(defaults.default_system_prompt),
            temperature: parse_env("TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_env("MAX_TOKENS", defaults.max_tokens)?,
            timeout_s: parse_env("TIMEOUT_S", defaults.timeout_s)?,
            retries: parse_env("RETRIES", defaults.retries)?,
            summary_temperature: parse_env("SUMMARY_TEMPERATURE", defaults.summary_temperature)?,
            sentiment_enabled: parse_env("SENTIMENT_ENABLED", defaults.sentiment_enabled)?,
            sentiment_model: env::var("SENTIMENT_MODEL").unwrap_or(defaults.sentiment_model),
            sentiment_temperature: parse_env(
                "SENTIMENT_TEMPERATURE",
                defaults.sentiment_temperature,
            )?,
            sentiment_timeout_s: parse_env("SENTIMENT_TIMEOUT_S", defaults.sentiment_timeout_s)?,
            sentiment_max_tokens: parse_env("SENTIMENT_MAX_TOKENS", defaults.sentiment_max_tokens)?,
            waves_enabled: parse_env("WAVES_ENABLED", defaults.waves_enabled)?,
            waves_max_workers: parse_env("WAVES_MAX_WORKERS", defaults.waves_max_workers)?,
            waves_queue_max_size: parse_env("WAVES_QUEUE_MAX_SIZE", defaults.waves_queue_max_size)?,
            waves_job_timeout_s: parse_env("WAVES_JOB_TIMEOUT_S", defaults.waves_job_timeout_s)?,
            waves_processing_sr: parse_env("WAVES_PROCESSING_SR", defaults.waves_processing_sr)?,
            events_ws_enabled: parse_env("EVENTS_WS_ENABLED", defaults.events_ws_enabled)?,
            events_turn1_timeout_s: parse_env(
                "EVENTS_TURN1_TIMEOUT_S",
                defaults.events_turn1_timeout_s,
            )?,
            events_dialogue_timeout_s: parse_env(
                "EVENTS_DIALOGUE_TIMEOUT_S",
                defaults.events_dialogue_timeout_s,
            )?,
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY").ok(),
            google_api_key: env::var("GOOGLE_API_KEY").ok(),
            elevenlabs_api_key: env::var("ELEVENLABS_API_KEY").ok(),
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get API key for a specific provider
    ///
    /// # Arguments
    /// * `provider` - The name of the provider (e.g., "openai", "elevenlabs")
    pub fn get_api_key(&self, provider: &str) -> Result<String, String> {
        let key = match provider.to_lowercase().as_str() {
            "openai" => &self.openai_api_key,
            "anthropic" => &self.anthropic_api_key,
            "gemini" | "google" => &self.google_api_key,
            "elevenlabs" => &self.elevenlabs_api_key,
            _ => return Err(format!("Unsupported provider: {provider}")),
        };
        key.as_ref()
            .cloned()
            .ok_or_else(|| format!("{provider} API key not configured in server environment"))
    }
}

fn parse_env<T>(name: &str, default: T) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| format!("Invalid value for {name}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_installation_profile() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.waves_max_workers, 2);
        assert_eq!(config.waves_processing_sr, 8000);
        assert!(config.waves_enabled);
        assert!(config.events_ws_enabled);
        assert_eq!(config.events_turn1_timeout_s, 15.0);
        assert!(config.sentiment_enabled);
        assert_eq!(config.sentiment_model, "openai/gpt-4o-mini");
        assert_eq!(config.sentiment_timeout_s, 10.0);
    }

    #[test]
    fn test_get_api_key_success() {
        let config = ServerConfig {
            elevenlabs_api_key: Some("test-elevenlabs-key".to_string()),
            ..Default::default()
        };

        let result = config.get_api_key("elevenlabs");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "test-elevenlabs-key");
    }

    #[test]
    fn test_get_api_key_missing() {
        let config = ServerConfig::default();
        let result = config.get_api_key("openai");
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err(),
            "openai API key not configured in server environment"
        );
    }

    #[test]
    fn test_get_api_key_unsupported_provider() {
        let config = ServerConfig::default();
        let result = config.get_api_key("unsupported_provider");
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err(),
            "Unsupported provider: unsupported_provider"
        );
    }

    #[test]
    fn test_get_api_key_case_insensitive() {
        let config = ServerConfig {
            google_api_key: Some("test-google-key".to_string()),
            ..Default::default()
        };

        assert_eq!(config.get_api_key("GEMINI").unwrap(), "test-google-key");
        assert_eq!(config.get_api_key("Google").unwrap(), "test-google-key");
    }

    #[test]
    fn test_address_formatting() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9000,
            ..Default::default()
        };
        assert_eq!(config.address(), "127.0.0.1:9000");
    }
}
