use serde::{Deserialize, Serialize};

/// Typed outbound envelope delivered to one browser client as
/// `{"type": ..., "payload": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEnvelope {
    Connected,
    Error {
        message: String,
    },
    Interrupted,
    Audio {
        data: String,
    },
    InputTranscript {
        text: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    Transcript {
        text: String,
        #[serde(rename = "isFinal")]
        is_final: bool,
    },
    Sources {
        sources: Vec<String>,
        #[serde(rename = "formattedText")]
        formatted_text: String,
    },
    UserTurnComplete {
        text: String,
    },
    TurnComplete,
}

impl ClientEnvelope {
    /// The `type` tag, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEnvelope::Connected => "connected",
            ClientEnvelope::Error { .. } => "error",
            ClientEnvelope::Interrupted => "interrupted",
            ClientEnvelope::Audio { .. } => "audio",
            ClientEnvelope::InputTranscript { .. } => "input_transcript",
            ClientEnvelope::Transcript { .. } => "transcript",
            ClientEnvelope::Sources { .. } => "sources",
            ClientEnvelope::UserTurnComplete { .. } => "user_turn_complete",
            ClientEnvelope::TurnComplete => "turn_complete",
        }
    }
}
