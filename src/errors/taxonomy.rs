use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed error taxonomy crossing component boundaries.
///
/// Provider-specific failures are mapped to one of these values at the edge
/// (LLM gateway, TTS renderer, wave pool); nothing else travels between
/// components or onto the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Timeout,
    RateLimit,
    ServerError,
    TtsError,
    WaveError,
    Unknown,
}

impl ErrorKind {
    /// Classes the LLM gateway retries with backoff; everything else
    /// surfaces immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Timeout | Self::RateLimit)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::RateLimit => "rate_limit",
            Self::ServerError => "server_error",
            Self::TtsError => "tts_error",
            Self::WaveError => "wave_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error payload carried by `slot.error` SSE events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::RateLimit).unwrap(),
            "\"rate_limit\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::TtsError).unwrap(),
            "\"tts_error\""
        );
    }

    #[test]
    fn test_retryable_classes() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::RateLimit.is_retryable());
        assert!(!ErrorKind::ServerError.is_retryable());
        assert!(!ErrorKind::TtsError.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }
}
