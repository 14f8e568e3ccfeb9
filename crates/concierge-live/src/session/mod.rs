//! Live sessions: per-user state, the process-wide registry, and the
//! orchestrator that drives one engine connection per user.

mod handler;
mod orchestrator;
mod registry;
mod state;

pub use orchestrator::{OrchestratorSettings, SessionOrchestrator};
pub use registry::SessionRegistry;
pub use state::{Cleanup, Session, TurnState};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::relay::ClientRelay;

/// One prior conversation turn carried into a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// What the user is looking at when the session starts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub page: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mission: Option<String>,
}

pub struct StartRequest {
    pub user_id: String,
    pub relay: Arc<dyn ClientRelay>,
    pub history: Vec<HistoryTurn>,
    pub location: Option<Location>,
    pub page_context: Option<PageContext>,
}

impl StartRequest {
    pub fn new(user_id: impl Into<String>, relay: Arc<dyn ClientRelay>) -> Self {
        Self {
            user_id: user_id.into(),
            relay,
            history: Vec::new(),
            location: None,
            page_context: None,
        }
    }
}
