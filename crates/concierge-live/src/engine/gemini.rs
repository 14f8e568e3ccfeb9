//! Gemini Live connector over `tokio-tungstenite`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::wire::{encode_command, setup_message};
use super::{EngineCommand, EngineConnector, EngineEvent, EngineEvents, EngineHandle, EngineSetup};
use crate::protocol::InboundMessage;
use crate::LiveError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const COMMAND_QUEUE: usize = 256;
const EVENT_QUEUE: usize = 256;

/// Connection settings for Gemini Live.
#[derive(Clone)]
pub struct GeminiLiveConfig {
    pub url: String,
    pub api_key: String,
    pub model: String,
    pub voice: String,
    pub connect_timeout: Duration,
    /// Depth bound for the citation-metadata search on inbound frames.
    pub scan_depth: usize,
}

impl std::fmt::Debug for GeminiLiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveConfig")
            .field("url", &self.url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("connect_timeout", &self.connect_timeout)
            .field("scan_depth", &self.scan_depth)
            .finish()
    }
}

impl GeminiLiveConfig {
    pub fn from_config(
        engine: &concierge_config::EngineConfig,
        live: &concierge_config::LiveConfig,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            url: engine.url.clone(),
            api_key: api_key.into(),
            model: engine.model.clone(),
            voice: engine.voice.clone(),
            connect_timeout: Duration::from_secs(engine.connect_timeout_secs),
            scan_depth: live.metadata_scan_depth,
        }
    }

    fn ws_url(&self) -> String {
        format!("{}?key={}", self.url, self.api_key)
    }
}

pub struct GeminiLiveConnector {
    config: GeminiLiveConfig,
}

impl GeminiLiveConnector {
    pub fn new(config: GeminiLiveConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EngineConnector for GeminiLiveConnector {
    async fn connect(&self, setup: EngineSetup) -> Result<(EngineHandle, EngineEvents), LiveError> {
        info!(url = %self.config.url, model = %self.config.model, "Connecting to Gemini Live");

        let ws = match tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(self.config.ws_url()),
        )
        .await
        {
            Ok(Ok((ws, _))) => ws,
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to Gemini Live");
                return Err(LiveError::Connect(e.to_string()));
            }
            Err(_elapsed) => {
                error!(
                    timeout = ?self.config.connect_timeout,
                    "Gemini Live connection timed out"
                );
                return Err(LiveError::Timeout);
            }
        };

        let (mut write, read) = ws.split();

        let setup_frame = setup_message(&self.config.model, &self.config.voice, &setup);
        write
            .send(WsMessage::Text(setup_frame.to_string().into()))
            .await
            .map_err(|e| LiveError::Connect(format!("setup send failed: {e}")))?;

        let (handle, command_rx) = EngineHandle::channel(COMMAND_QUEUE);
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        tokio::spawn(command_forwarder(command_rx, write));
        tokio::spawn(read_loop(read, event_tx, self.config.scan_depth));

        Ok((handle, event_rx))
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

async fn command_forwarder(
    mut command_rx: mpsc::Receiver<EngineCommand>,
    mut write: SplitSink<WsStream, WsMessage>,
) {
    while let Some(command) = command_rx.recv().await {
        let Some(frame) = encode_command(&command) else {
            debug!("Closing Gemini Live connection");
            break;
        };
        if let Err(e) = write.send(WsMessage::Text(frame.to_string().into())).await {
            warn!(error = %e, "Gemini Live send failed");
            return;
        }
    }
    // Either an explicit Close or every handle was dropped.
    let _ = write.send(WsMessage::Close(None)).await;
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Forward parsed frames as events. Frames that fail to parse are skipped;
/// a close or transport error ends the loop with a single `Closed`.
async fn read_loop<S, E>(mut read: S, event_tx: mpsc::Sender<EngineEvent>, scan_depth: usize)
where
    S: Stream<Item = Result<WsMessage, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut reason = None;

    while let Some(frame) = read.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text.as_str().to_owned(),
            // Gemini Live delivers JSON in binary frames.
            Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(_) => {
                    debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame");
                    continue;
                }
            },
            Ok(WsMessage::Close(frame)) => {
                reason = frame.map(|f| f.reason.as_str().to_owned());
                info!(reason = ?reason, "Gemini Live closed connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, "Gemini Live connection error");
                reason = Some(e.to_string());
                break;
            }
        };

        match InboundMessage::from_text(&text, scan_depth) {
            Ok(message) => {
                if event_tx.send(EngineEvent::Message(message)).await.is_err() {
                    // Session driver is gone; nobody is listening.
                    return;
                }
            }
            Err(e) => debug!(error = %e, "Unrecognized message from Gemini Live"),
        }
    }

    let _ = event_tx.send(EngineEvent::Closed { reason }).await;
}
