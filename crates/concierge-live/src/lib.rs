//! Live voice sessions between browser clients and the conversation engine.
//!
//! Provides:
//! - A per-user session registry with atomic replacement
//! - The inbound engine-message state machine (audio, transcripts,
//!   interruptions, tool calls, citations)
//! - Concurrent tool-call dispatch against pluggable collaborators
//! - Background job results injected as system turns
//! - A Gemini Live connector over WebSockets

pub mod engine;
pub mod grounding;
pub mod instructions;
pub mod jobs;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod tools;
pub mod transcript;

pub use engine::{EngineCommand, EngineConnector, EngineEvent, EngineHandle, EngineSetup};
pub use grounding::GroundingSourceCollector;
pub use instructions::{compose_instructions, InstructionBuilder, InstructionContext, StaticPersona};
pub use jobs::{BackgroundJobBridge, JobBus, JobEvent, JobSink, JobSubscription};
pub use protocol::{ClientEnvelope, InboundMessage};
pub use relay::{ChannelRelay, ClientRelay, RelayReceiver};
pub use session::{
    HistoryTurn, Location, OrchestratorSettings, PageContext, Session, SessionOrchestrator,
    SessionRegistry, StartRequest,
};
pub use tools::{DispatchContext, ToolCallDispatcher};
pub use transcript::TranscriptAccumulator;

use serde::{Deserialize, Serialize};

/// Which side of the conversation a transcript fragment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    User,
    Assistant,
}

/// One speech-to-text event from the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    pub finished: bool,
    pub direction: Direction,
}

/// A function-style request issued by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// Outcome of one tool call, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(call: &ToolCall, result: serde_json::Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// A citation surfaced by the engine's search capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroundingChunk {
    pub uri: String,
    pub title: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("engine connection closed")]
    EngineClosed,
    #[error("client relay closed")]
    RelayClosed,
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("tool error: {0}")]
    Tool(String),
    #[error("collaborator error: {0}")]
    Collaborator(String),
    #[error("timeout")]
    Timeout,
    #[error("session start cancelled")]
    Cancelled,
}
