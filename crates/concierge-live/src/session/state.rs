use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use concierge_common::SessionId;
use tracing::debug;

use crate::engine::EngineHandle;
use crate::grounding::GroundingSourceCollector;
use crate::relay::ClientRelay;
use crate::transcript::TranscriptAccumulator;

/// Teardown callback, run at most once.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// Per-turn mutable state. Only the session's driver task touches it.
#[derive(Debug)]
pub struct TurnState {
    pub transcript: TranscriptAccumulator,
    pub sources: GroundingSourceCollector,
    pub diagnostics_logged: bool,
}

impl TurnState {
    pub fn new(blocked_source_hosts: &[String]) -> Self {
        Self {
            transcript: TranscriptAccumulator::new(),
            sources: GroundingSourceCollector::new(blocked_source_hosts),
            diagnostics_logged: false,
        }
    }
}

/// One user's live conversation.
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub conversation_id: String,
    pub engine: EngineHandle,
    pub relay: Arc<dyn ClientRelay>,
    stopping: Arc<AtomicBool>,
    close_requested: AtomicBool,
    pub(crate) turn: tokio::sync::Mutex<TurnState>,
    cleanups: Mutex<Vec<Cleanup>>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        engine: EngineHandle,
        relay: Arc<dyn ClientRelay>,
        blocked_source_hosts: &[String],
    ) -> Self {
        Self {
            id: SessionId::new(),
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            engine,
            relay,
            stopping: Arc::new(AtomicBool::new(false)),
            close_requested: AtomicBool::new(false),
            turn: tokio::sync::Mutex::new(TurnState::new(blocked_source_hosts)),
            cleanups: Mutex::new(Vec::new()),
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Returns true if the flag was already set.
    pub fn mark_stopping(&self) -> bool {
        self.stopping.swap(true, Ordering::SeqCst)
    }

    /// Shared view of the stopping flag for background listeners.
    pub fn stopping_flag(&self) -> Arc<AtomicBool> {
        self.stopping.clone()
    }

    /// Register a teardown callback. On a session that is already
    /// stopping the callback runs immediately.
    pub fn add_cleanup(&self, cleanup: Cleanup) {
        if self.is_stopping() {
            cleanup();
            return;
        }
        let mut cleanups = self.cleanups.lock().unwrap_or_else(|e| e.into_inner());
        cleanups.push(cleanup);
        drop(cleanups);
        // stop() may have drained the list between the check and the push.
        if self.is_stopping() {
            self.run_cleanups();
        }
    }

    pub fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.lock().unwrap_or_else(|e| e.into_inner()));
        for cleanup in cleanups {
            cleanup();
        }
    }

    /// Mark stopping, run cleanups and ask the engine connection to close.
    /// Safe to call more than once.
    pub fn teardown(&self) {
        self.mark_stopping();
        self.run_cleanups();
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.engine.request_close() {
            debug!(session = %self.id, error = %e, "Engine already closed");
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("conversation_id", &self.conversation_id)
            .field("stopping", &self.is_stopping())
            .finish_non_exhaustive()
    }
}
