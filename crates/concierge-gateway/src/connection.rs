//! Per-connection handlers. Client connections open with a `start` frame
//! and run a voice session; job feed connections arrive on their own
//! listener and publish job completions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use concierge_common::{connection_tag, SessionId};
use concierge_live::{
    ChannelRelay, ClientEnvelope, JobBus, RelayReceiver, SessionOrchestrator, StartRequest,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::protocol::{ClientFrame, StartFrame};

/// Everything a connection needs from the process.
#[derive(Clone)]
pub struct Gateway {
    pub orchestrator: SessionOrchestrator,
    pub jobs: JobBus,
    pub start_timeout: Duration,
    pub client_channel_capacity: usize,
}

type WsSink<S> = SplitSink<WebSocketStream<S>, Message>;
type WsStream<S> = SplitStream<WebSocketStream<S>>;

/// Handle a single WebSocket connection.
pub async fn handle_connection<S>(ws: WebSocketStream<S>, addr: SocketAddr, gateway: Gateway)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn = connection_tag();
    let (mut sink, mut stream) = ws.split();

    match read_first(&mut stream, addr, gateway.start_timeout).await {
        Some(ClientFrame::Start(start)) => {
            run_client(&mut sink, &mut stream, &gateway, start, &conn).await;
        }
        Some(ClientFrame::JobFeed) => {
            warn!(peer = %addr, conn = %conn, "Job feed refused on client listener");
            let _ = send_envelope(
                &mut sink,
                &ClientEnvelope::Error {
                    message: "job feed is not served on this listener".into(),
                },
            )
            .await;
        }
        Some(other) => {
            warn!(peer = %addr, kind = other.kind(), "Expected start frame");
            let _ = send_envelope(
                &mut sink,
                &ClientEnvelope::Error {
                    message: "first frame must be start".into(),
                },
            )
            .await;
        }
        None => {}
    }

    let _ = sink.close().await;
    debug!(peer = %addr, conn = %conn, "Connection closed");
}

/// Handle a connection on the job feed listener. Every text frame is
/// expected to be a `job` event.
pub async fn handle_job_feed<S>(ws: WebSocketStream<S>, addr: SocketAddr, jobs: JobBus)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let conn = connection_tag();
    info!(peer = %addr, conn = %conn, "Job feed connected");
    let (mut sink, mut stream) = ws.split();
    run_job_feed(&mut stream, &jobs, &conn).await;
    let _ = sink.close().await;
}

async fn start_session(
    gateway: &Gateway,
    relay: &ChannelRelay,
    start: StartFrame,
) -> Option<(String, SessionId)> {
    let user_id = start.user_id;
    let request = StartRequest {
        user_id: user_id.clone(),
        relay: Arc::new(relay.clone()),
        history: start.history,
        location: start.location,
        page_context: start.page_context,
    };
    match gateway.orchestrator.start(request).await {
        Ok(id) => Some((user_id, id)),
        Err(_) => None,
    }
}

async fn run_client<S>(
    sink: &mut WsSink<S>,
    stream: &mut WsStream<S>,
    gateway: &Gateway,
    start: StartFrame,
    conn: &str,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (relay, mut outbound) = ChannelRelay::channel(gateway.client_channel_capacity);

    let Some((mut user_id, mut session_id)) = start_session(gateway, &relay, start).await else {
        // The orchestrator queued an error envelope; deliver it before closing.
        flush_outbound(sink, &mut outbound).await;
        return;
    };
    info!(conn = %conn, user = %user_id, session = %session_id, "Voice client attached");

    loop {
        tokio::select! {
            Some(envelope) = outbound.recv() => {
                if send_envelope(sink, &envelope).await.is_err() {
                    break;
                }
            }

            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Audio { data }) => {
                                gateway.orchestrator.send_audio(&user_id, data).await;
                            }
                            Ok(ClientFrame::Text { text }) => {
                                gateway.orchestrator.send_text(&user_id, text).await;
                            }
                            Ok(ClientFrame::Stop) => {
                                gateway.orchestrator.stop_if_current(&user_id, &session_id).await;
                                flush_outbound(sink, &mut outbound).await;
                                return;
                            }
                            Ok(ClientFrame::Start(start)) => {
                                gateway.orchestrator.stop_if_current(&user_id, &session_id).await;
                                match start_session(gateway, &relay, start).await {
                                    Some((user, id)) => {
                                        info!(conn = %conn, user = %user, session = %id, "Voice client restarted");
                                        user_id = user;
                                        session_id = id;
                                    }
                                    None => {
                                        flush_outbound(sink, &mut outbound).await;
                                        return;
                                    }
                                }
                            }
                            Ok(other) => {
                                debug!(conn = %conn, kind = other.kind(), "Ignoring frame on voice connection");
                            }
                            Err(e) => {
                                warn!(conn = %conn, error = %e, "Invalid client frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(conn = %conn, error = %e, "WS error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!(conn = %conn, user = %user_id, session = %session_id, "Voice client disconnected");
    gateway
        .orchestrator
        .stop_if_current(&user_id, &session_id)
        .await;
}

async fn run_job_feed<S>(stream: &mut WsStream<S>, jobs: &JobBus, conn: &str)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Job(event)) => {
                    let listeners = jobs.publish(event);
                    debug!(conn = %conn, listeners, "Job event published");
                }
                Ok(other) => {
                    debug!(conn = %conn, kind = other.kind(), "Ignoring frame on job feed");
                }
                Err(e) => warn!(conn = %conn, error = %e, "Invalid job frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(conn = %conn, error = %e, "WS error on job feed");
                break;
            }
        }
    }
    info!(conn = %conn, "Job feed disconnected");
}

/// Read and parse the first frame.
async fn read_first<S>(
    stream: &mut WsStream<S>,
    addr: SocketAddr,
    wait: Duration,
) -> Option<ClientFrame>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let frame = tokio::time::timeout(wait, stream.next()).await;

    match frame {
        Ok(Some(Ok(Message::Text(text)))) => match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!(peer = %addr, error = %e, "Invalid first frame");
                None
            }
        },
        Ok(Some(Ok(_))) => {
            warn!(peer = %addr, "Expected text first frame");
            None
        }
        Ok(Some(Err(e))) => {
            warn!(peer = %addr, error = %e, "WS error before first frame");
            None
        }
        Ok(None) => {
            debug!(peer = %addr, "Connection closed before first frame");
            None
        }
        Err(_) => {
            warn!(peer = %addr, timeout = ?wait, "First frame timeout");
            None
        }
    }
}

async fn flush_outbound<S>(sink: &mut WsSink<S>, outbound: &mut RelayReceiver)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Ok(envelope) = outbound.try_recv() {
        if send_envelope(sink, &envelope).await.is_err() {
            return;
        }
    }
}

/// Send an envelope as a JSON text frame.
async fn send_envelope<S>(
    sink: &mut WsSink<S>,
    envelope: &ClientEnvelope,
) -> Result<(), tokio_tungstenite::tungstenite::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let json = match serde_json::to_string(envelope) {
        Ok(json) => json,
        Err(e) => {
            warn!(kind = envelope.kind(), error = %e, "Envelope not serializable");
            return Ok(());
        }
    };
    sink.send(Message::Text(json.into())).await
}
