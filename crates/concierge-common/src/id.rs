//! Identifiers minted by the gateway.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Id for a conversation record; the backend keys transcripts by it.
pub fn new_conversation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Id for a tool call the engine sent without one. Prefixed so it never
/// collides with an engine-issued id in logs.
pub fn fallback_call_id() -> String {
    format!("local-{}", Uuid::new_v4().simple())
}

/// Eight hex chars tagging the log lines of one client connection.
pub fn connection_tag() -> String {
    let mut tag = Uuid::new_v4().simple().to_string();
    tag.truncate(8);
    tag
}

/// Identity of one live session. A user keeps the same user id across
/// reconnects but every `start` mints a fresh `SessionId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
