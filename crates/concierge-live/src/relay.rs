//! Delivery of outbound envelopes to one connected browser client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use crate::protocol::ClientEnvelope;
use crate::LiveError;

/// Sink for envelopes addressed to a single client.
///
/// Implementations must not block: the session state machine calls
/// `send` inline while processing engine messages.
pub trait ClientRelay: Send + Sync {
    fn send(&self, envelope: ClientEnvelope) -> Result<(), LiveError>;
}

/// Relay backed by a channel drained by the transport's writer task.
///
/// Only audio is subject to the backlog budget. Once `audio_budget`
/// envelopes are waiting, further audio chunks are shed; control,
/// transcript and source envelopes are always queued so the client
/// still sees every turn boundary in order.
#[derive(Clone)]
pub struct ChannelRelay {
    tx: mpsc::UnboundedSender<ClientEnvelope>,
    pending: Arc<AtomicUsize>,
    audio_budget: usize,
}

/// Receiving half handed to the transport.
pub struct RelayReceiver {
    rx: mpsc::UnboundedReceiver<ClientEnvelope>,
    pending: Arc<AtomicUsize>,
}

impl ChannelRelay {
    /// Create a relay together with the receiver the transport drains.
    pub fn channel(audio_budget: usize) -> (Self, RelayReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                pending: pending.clone(),
                audio_budget,
            },
            RelayReceiver { rx, pending },
        )
    }

    /// Envelopes queued but not yet taken by the transport.
    pub fn backlog(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl ClientRelay for ChannelRelay {
    fn send(&self, envelope: ClientEnvelope) -> Result<(), LiveError> {
        if self.tx.is_closed() {
            return Err(LiveError::RelayClosed);
        }
        if matches!(envelope, ClientEnvelope::Audio { .. }) && self.backlog() >= self.audio_budget
        {
            return Err(LiveError::Protocol(format!(
                "client backlog at {}, dropped audio",
                self.audio_budget
            )));
        }
        self.pending.fetch_add(1, Ordering::SeqCst);
        self.tx.send(envelope).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            LiveError::RelayClosed
        })
    }
}

impl RelayReceiver {
    pub async fn recv(&mut self) -> Option<ClientEnvelope> {
        let envelope = self.rx.recv().await?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Some(envelope)
    }

    pub fn try_recv(&mut self) -> Result<ClientEnvelope, TryRecvError> {
        let envelope = self.rx.try_recv()?;
        self.pending.fetch_sub(1, Ordering::SeqCst);
        Ok(envelope)
    }
}
