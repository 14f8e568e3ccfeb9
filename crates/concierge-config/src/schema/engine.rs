//! Conversation engine (Gemini Live) connection settings.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Bidirectional streaming endpoint.
    pub url: String,
    pub model: String,
    /// Prebuilt voice name used for spoken replies.
    pub voice: String,
    /// Environment variable holding the API key. The key itself never
    /// lives in the config file.
    pub api_key_env: String,
    pub connect_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent".into(),
            model: "models/gemini-2.0-flash-live-001".into(),
            voice: "Aoede".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            connect_timeout_secs: 15,
        }
    }
}
