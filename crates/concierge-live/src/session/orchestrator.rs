//! Session lifecycle: start, client input, stop, and the per-session
//! driver task that feeds engine messages through the handler.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use concierge_common::{new_conversation_id, SessionId};
use concierge_config::LiveConfig;
use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::handler::handle_message;
use super::{PageContext, Session, SessionRegistry, StartRequest};
use crate::engine::{EngineConnector, EngineEvent, EngineEvents, EngineSetup};
use crate::instructions::{compose_instructions, InstructionBuilder, InstructionContext};
use crate::jobs::{BackgroundJobBridge, JobSink};
use crate::protocol::ClientEnvelope;
use crate::tools::ToolCallDispatcher;
use crate::LiveError;

/// Openers for the proactive greeting. One is picked at random so
/// sessions on the same page do not open identically.
const GREETING_OPENERS: &[&str] = &[
    "Greet me briefly and suggest one useful next step.",
    "Say hello in one sentence and point out what deserves my attention here.",
    "Welcome me back and offer one concrete way you can help on this page.",
    "Open with a short greeting and ask what I want to get done.",
];

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub greeting_delay: Duration,
    pub tool_domains: Vec<String>,
    pub blocked_source_hosts: Vec<String>,
    pub include_search: bool,
}

impl OrchestratorSettings {
    pub fn from_config(config: &LiveConfig) -> Self {
        Self {
            greeting_delay: Duration::from_millis(config.greeting_delay_ms),
            tool_domains: config.tool_domains.clone(),
            blocked_source_hosts: config.blocked_source_hosts.clone(),
            include_search: config.include_search,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&LiveConfig::default())
    }
}

struct Inner {
    registry: SessionRegistry,
    connector: Arc<dyn EngineConnector>,
    instructions: Arc<dyn InstructionBuilder>,
    dispatcher: Arc<ToolCallDispatcher>,
    jobs: BackgroundJobBridge,
    settings: OrchestratorSettings,
    /// Generation of the latest in-flight start per user. A start that
    /// finds its entry gone or replaced after connecting was cancelled.
    pending: Mutex<HashMap<String, u64>>,
    generation: AtomicU64,
}

/// Entry point for client calls. Cheap to clone.
#[derive(Clone)]
pub struct SessionOrchestrator {
    inner: Arc<Inner>,
}

impl SessionOrchestrator {
    pub fn new(
        registry: SessionRegistry,
        connector: Arc<dyn EngineConnector>,
        instructions: Arc<dyn InstructionBuilder>,
        dispatcher: Arc<ToolCallDispatcher>,
        jobs: BackgroundJobBridge,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry,
                connector,
                instructions,
                dispatcher,
                jobs,
                settings,
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Open a live session for `request.user_id`, replacing any existing one.
    ///
    /// On connection failure the client gets an `error` envelope and
    /// nothing is registered. A `stop` or newer `start` for the same user
    /// that lands while connecting cancels this one with
    /// [`LiveError::Cancelled`].
    pub async fn start(&self, request: StartRequest) -> Result<SessionId, LiveError> {
        let StartRequest {
            user_id,
            relay,
            history,
            location,
            page_context,
        } = request;

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner
            .pending
            .lock()
            .await
            .insert(user_id.clone(), generation);

        if self.inner.registry.evict(&user_id).await {
            info!(user = %user_id, "Previous live session closed");
        }

        let instruction = compose_instructions(
            self.inner.instructions.as_ref(),
            InstructionContext {
                user_id: &user_id,
                history: &history,
                location: location.as_ref(),
                page_context: page_context.as_ref(),
            },
        )
        .await;
        let setup = EngineSetup {
            instruction,
            function_declarations: self.function_declarations(),
            include_search: self.inner.settings.include_search,
        };

        let (engine, events) = match self.inner.connector.connect(setup).await {
            Ok(pair) => pair,
            Err(e) => {
                error!(user = %user_id, error = %e, "Failed to open live session");
                self.clear_pending(&user_id, generation).await;
                let _ = relay.send(ClientEnvelope::Error {
                    message: format!("Failed to start voice session: {e}"),
                });
                return Err(e);
            }
        };

        let session = Arc::new(Session::new(
            user_id.clone(),
            new_conversation_id(),
            engine,
            relay,
            &self.inner.settings.blocked_source_hosts,
        ));
        let id = session.id.clone();

        {
            // Held across the check and `set` so a concurrent stop either
            // cancels us here or finds the registered session.
            let mut pending = self.inner.pending.lock().await;
            if pending.get(&user_id) != Some(&generation) {
                drop(pending);
                info!(user = %user_id, session = %id, "Start cancelled while connecting");
                session.teardown();
                return Err(LiveError::Cancelled);
            }
            pending.remove(&user_id);
            self.inner.registry.set(&user_id, session.clone()).await;
        }
        info!(user = %user_id, session = %id, "Live session started");

        if let Err(e) = session.relay.send(ClientEnvelope::Connected) {
            warn!(session = %id, error = %e, "Could not notify client of connection");
        }

        tokio::spawn(self.clone().drive(session.clone(), events));

        if let Some(page) = page_context {
            self.schedule_greeting(session.clone(), page);
        }

        let subscription = self.inner.jobs.subscribe(
            &user_id,
            JobSink {
                engine: session.engine.clone(),
                stopping: session.stopping_flag(),
            },
        );
        session.add_cleanup(Box::new(move || subscription.unsubscribe()));

        Ok(id)
    }

    /// Stop the user's session, cancelling a start still connecting.
    pub async fn stop(&self, user_id: &str) {
        if self.inner.pending.lock().await.remove(user_id).is_some() {
            info!(user = %user_id, "Pending start cancelled");
        }
        let Some(session) = self.inner.registry.get(user_id).await else {
            debug!(user = %user_id, "Stop for user without a live session");
            return;
        };
        self.stop_session(&session).await;
    }

    /// Stop only if `id` is still the user's current session.
    pub async fn stop_if_current(&self, user_id: &str, id: &SessionId) {
        match self.inner.registry.get(user_id).await {
            Some(session) if &session.id == id => self.stop_session(&session).await,
            _ => debug!(user = %user_id, session = %id, "Session already replaced or gone"),
        }
    }

    async fn stop_session(&self, session: &Session) {
        session.mark_stopping();
        self.inner
            .registry
            .remove_if_current(&session.user_id, &session.id)
            .await;
        session.teardown();
        info!(user = %session.user_id, session = %session.id, "Live session stopped");
    }

    pub async fn send_audio(&self, user_id: &str, data: String) {
        let Some(session) = self.active(user_id, "audio").await else {
            return;
        };
        if let Err(e) = session.engine.send_audio(data).await {
            warn!(session = %session.id, error = %e, "Audio not forwarded");
        }
    }

    pub async fn send_text(&self, user_id: &str, text: String) {
        let Some(session) = self.active(user_id, "text").await else {
            return;
        };
        if let Err(e) = session.engine.send_text(text).await {
            warn!(session = %session.id, error = %e, "Text not forwarded");
        }
    }

    /// Close every session. Called once on process shutdown.
    pub async fn shutdown(&self) {
        self.inner.pending.lock().await.clear();
        let closed = self.inner.registry.drain().await;
        info!(sessions = closed, "Live sessions drained");
    }

    async fn clear_pending(&self, user_id: &str, generation: u64) {
        let mut pending = self.inner.pending.lock().await;
        if pending.get(user_id) == Some(&generation) {
            pending.remove(user_id);
        }
    }

    async fn active(&self, user_id: &str, what: &str) -> Option<Arc<Session>> {
        match self.inner.registry.get(user_id).await {
            Some(session) if !session.is_stopping() => Some(session),
            Some(_) => {
                warn!(user = %user_id, what, "Dropping input for stopping session");
                None
            }
            None => {
                warn!(user = %user_id, what, "Dropping input, no live session");
                None
            }
        }
    }

    fn function_declarations(&self) -> Vec<serde_json::Value> {
        let registry = self.inner.dispatcher.registry();
        let tools: Vec<_> = self
            .inner
            .settings
            .tool_domains
            .iter()
            .flat_map(|domain| registry.tools_by_domain(domain))
            .collect();
        registry.to_function_declarations(&tools)
    }

    fn schedule_greeting(&self, session: Arc<Session>, page: PageContext) {
        let delay = self.inner.settings.greeting_delay;
        let text = greeting_text(&page);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if session.is_stopping() {
                debug!(session = %session.id, "Session stopped before greeting");
                return;
            }
            if let Err(e) = session.engine.send_text(text).await {
                warn!(session = %session.id, error = %e, "Greeting not sent");
            }
        });
    }

    /// Run engine events through the handler until the connection closes,
    /// then tear the session down.
    async fn drive(self, session: Arc<Session>, mut events: EngineEvents) {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Message(message) => {
                    if session.is_stopping() {
                        continue;
                    }
                    if let Err(e) =
                        handle_message(&session, &self.inner.dispatcher, message).await
                    {
                        warn!(session = %session.id, error = %e, "Engine message not handled");
                    }
                }
                EngineEvent::Closed { reason } => {
                    info!(session = %session.id, reason = ?reason, "Engine connection closed");
                    break;
                }
            }
        }

        session.mark_stopping();
        self.inner
            .registry
            .remove_if_current(&session.user_id, &session.id)
            .await;
        session.teardown();
        self.inner
            .dispatcher
            .end_session(&session.id.to_string())
            .await;
        debug!(session = %session.id, "Session driver finished");
    }
}

fn greeting_text(page: &PageContext) -> String {
    let mut rng = rand::thread_rng();
    let opener = GREETING_OPENERS
        .choose(&mut rng)
        .copied()
        .unwrap_or(GREETING_OPENERS[0]);

    let mut place = format!("I'm on the {} page", page.page);
    match (page.entity_type.as_deref(), page.entity_name.as_deref()) {
        (Some(kind), Some(name)) => place.push_str(&format!(" looking at the {kind} {name}")),
        (None, Some(name)) => place.push_str(&format!(" looking at {name}")),
        _ => {}
    }
    format!("{place}. {opener}")
}
