//! Connection to the conversation engine.
//!
//! A connection is a pair of queues: [`EngineHandle`] enqueues
//! [`EngineCommand`]s for a background writer task, and an event
//! receiver yields normalized [`EngineEvent`]s from the reader task.
//! Every outbound effect, including fire-and-forget turn injection, goes
//! through the command queue so ordering and failure stay observable.

mod gemini;
mod wire;

pub use gemini::{GeminiLiveConfig, GeminiLiveConnector};
pub use wire::encode_command;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::InboundMessage;
use crate::{LiveError, ToolResult};

/// Prefix marking a turn as authored by the host rather than the user.
pub const SYSTEM_TURN_PREFIX: &str = "[SYSTEM]";

/// Everything needed to open a session with the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineSetup {
    pub instruction: String,
    /// Function declarations in the engine's schema.
    pub function_declarations: Vec<serde_json::Value>,
    pub include_search: bool,
}

/// Outbound command for the engine connection.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Base64 PCM16 mono 16 kHz audio.
    Audio { data: String },
    /// A turn typed or spoken by the user.
    UserText { text: String },
    /// A turn authored by the host (proactive suggestions, job results).
    SystemTurn { text: String },
    /// One combined reply to a batch of tool calls.
    ToolResponse { results: Vec<ToolResult> },
    Close,
}

/// Inbound event from the engine connection.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Message(InboundMessage),
    /// The connection ended, cleanly or not. Always the last event.
    Closed { reason: Option<String> },
}

pub type EngineEvents = mpsc::Receiver<EngineEvent>;

/// Cloneable handle for enqueuing commands on one engine connection.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    command_tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub fn new(command_tx: mpsc::Sender<EngineCommand>) -> Self {
        Self { command_tx }
    }

    /// Create a handle together with the command receiver its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineCommand>) {
        let (command_tx, command_rx) = mpsc::channel(capacity);
        (Self { command_tx }, command_rx)
    }

    pub async fn send(&self, command: EngineCommand) -> Result<(), LiveError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| LiveError::EngineClosed)
    }

    pub async fn send_audio(&self, data: impl Into<String>) -> Result<(), LiveError> {
        self.send(EngineCommand::Audio { data: data.into() }).await
    }

    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), LiveError> {
        self.send(EngineCommand::UserText { text: text.into() }).await
    }

    pub async fn send_system_turn(&self, text: impl Into<String>) -> Result<(), LiveError> {
        self.send(EngineCommand::SystemTurn { text: text.into() }).await
    }

    pub async fn send_tool_response(&self, results: Vec<ToolResult>) -> Result<(), LiveError> {
        self.send(EngineCommand::ToolResponse { results }).await
    }

    /// Ask the writer to close the connection.
    pub async fn close(&self) -> Result<(), LiveError> {
        self.send(EngineCommand::Close).await
    }

    /// Ask the writer to close without waiting for queue space. Usable
    /// while holding a lock.
    pub fn request_close(&self) -> Result<(), LiveError> {
        match self.command_tx.try_send(EngineCommand::Close) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(command)) => {
                let tx = self.command_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(command).await;
                });
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(LiveError::EngineClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}

/// Opens engine connections. Implemented by [`GeminiLiveConnector`] in
/// production and by in-memory fakes in tests.
#[async_trait]
pub trait EngineConnector: Send + Sync {
    async fn connect(&self, setup: EngineSetup) -> Result<(EngineHandle, EngineEvents), LiveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn handle_enqueues_commands_in_order() {
        let (handle, mut rx) = EngineHandle::channel(8);
        handle.send_audio("AAA=").await.unwrap();
        handle.send_text("hello").await.unwrap();
        handle.close().await.unwrap();

        assert_eq!(rx.recv().await, Some(EngineCommand::Audio { data: "AAA=".into() }));
        assert_eq!(rx.recv().await, Some(EngineCommand::UserText { text: "hello".into() }));
        assert_eq!(rx.recv().await, Some(EngineCommand::Close));
    }

    #[tokio::test]
    async fn request_close_on_full_queue_still_arrives() {
        let (handle, mut rx) = EngineHandle::channel(1);
        handle.send_text("fills the queue").await.unwrap();
        handle.request_close().unwrap();

        assert!(matches!(rx.recv().await, Some(EngineCommand::UserText { .. })));
        assert_eq!(rx.recv().await, Some(EngineCommand::Close));
    }

    #[tokio::test]
    async fn send_after_writer_gone_is_engine_closed() {
        let (handle, rx) = EngineHandle::channel(8);
        drop(rx);
        assert!(handle.is_closed());
        assert!(matches!(handle.send_text("x").await, Err(LiveError::EngineClosed)));
    }
}
