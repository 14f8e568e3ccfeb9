//! Tool calls: collaborator seams, the dispatcher, and reference
//! implementations of the collaborators.
//!
//! Tools are named `<domain>.<action>` (`contacts.create`,
//! `deals.update_stage`). The domain selects which tools are declared to
//! the engine and where result entities are remembered.

mod collaborators;
mod dispatcher;
mod follow_up;
mod http;
mod memory;
mod registry;

pub use collaborators::{ContextEnricher, Enrichment, EntityMemory, MemorySession, ToolExecutor};
pub use dispatcher::{Dispatched, ToolCallDispatcher};
pub use follow_up::follow_up_for;
pub use http::HttpBackend;
pub use memory::RecentEntityMemory;
pub use registry::{to_function_declaration, StaticToolRegistry, ToolRegistry};

use serde::{Deserialize, Serialize};

/// Entity domains whose `create` action triggers context enrichment,
/// with the singular entity type passed to the enricher.
pub const ENTITY_DOMAINS: &[(&str, &str)] = &[
    ("contacts", "contact"),
    ("properties", "property"),
    ("deals", "deal"),
];

/// A tool declaration from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
    /// Explicit domain; derived from the name prefix when empty.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub domain: String,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: empty_parameters(),
            domain: String::new(),
        }
    }

    pub fn domain(&self) -> &str {
        if !self.domain.is_empty() {
            return &self.domain;
        }
        self.name.split_once('.').map_or("", |(domain, _)| domain)
    }

    pub fn action(&self) -> &str {
        self.name
            .split_once('.')
            .map_or(self.name.as_str(), |(_, action)| action)
    }

    /// Entity type if this tool creates a recognized entity.
    pub fn creation_entity(&self) -> Option<&'static str> {
        if self.action() != "create" {
            return None;
        }
        ENTITY_DOMAINS
            .iter()
            .find(|(domain, _)| *domain == self.domain())
            .map(|(_, entity)| *entity)
    }
}

/// Who and where a tool call runs for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchContext {
    pub user_id: String,
    pub session_id: String,
    pub conversation_id: String,
    pub voice_mode: bool,
}
