pub mod agents;
pub mod conversations;
pub mod events;
pub mod llm;
pub mod sentiment;
pub mod sessions;
pub mod stt;
pub mod tts;
pub mod waves;
pub mod workflow;
