//! Seams to the systems that actually run tools and remember entities.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{DispatchContext, ToolSpec};
use crate::LiveError;

fn normalize_tool_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Runs tools on behalf of a user.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Pick the tool meant by `name` when the engine misspells it
    /// (`contacts_create`, `Contacts.Create`).
    fn find_tool(&self, name: &str, candidates: &[ToolSpec]) -> Option<ToolSpec> {
        let wanted = normalize_tool_name(name);
        candidates
            .iter()
            .find(|t| normalize_tool_name(&t.name) == wanted)
            .cloned()
    }

    async fn execute(
        &self,
        tool: &ToolSpec,
        args: Value,
        ctx: &DispatchContext,
    ) -> Result<Value, LiveError>;
}

/// Reply from a context scan.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    pub success: bool,
    #[serde(default)]
    pub suggested_data: Option<Map<String, Value>>,
}

/// Fills in draft creation arguments from what the user was looking at.
#[async_trait]
pub trait ContextEnricher: Send + Sync {
    async fn scan_for_context(
        &self,
        user_id: &str,
        intent: &str,
        entity_type: &str,
        draft: &Value,
    ) -> Result<Enrichment, LiveError>;
}

/// Conversation-scoped memory handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySession {
    pub user_id: String,
    pub session_id: String,
}

/// Recently seen entities, used to resolve references like
/// "the second one" into concrete ids.
#[async_trait]
pub trait EntityMemory: Send + Sync {
    async fn get_or_create_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<MemorySession, LiveError>;

    async fn track_entities_from_result(
        &self,
        session_id: &str,
        domain: &str,
        result: &Value,
    ) -> Result<(), LiveError>;

    async fn resolve_smart_parameters(
        &self,
        session: &MemorySession,
        tool: &ToolSpec,
        args: Value,
    ) -> Result<Value, LiveError>;

    /// Drop what was remembered for a finished session.
    async fn forget_session(&self, _session_id: &str) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    #[async_trait]
    impl ToolExecutor for Nothing {
        async fn execute(
            &self,
            _tool: &ToolSpec,
            _args: Value,
            _ctx: &DispatchContext,
        ) -> Result<Value, LiveError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn default_find_tool_ignores_case_and_separators() {
        let candidates = vec![
            ToolSpec::new("contacts.create", ""),
            ToolSpec::new("deals.update_stage", ""),
        ];
        assert_eq!(
            Nothing.find_tool("Contacts_Create", &candidates).unwrap().name,
            "contacts.create"
        );
        assert_eq!(
            Nothing.find_tool("deals.updatestage", &candidates).unwrap().name,
            "deals.update_stage"
        );
        assert!(Nothing.find_tool("tasks.create", &candidates).is_none());
    }

    #[test]
    fn enrichment_parses_camel_case() {
        let e: Enrichment = serde_json::from_str(
            r#"{ "success": true, "suggestedData": { "address": "12 Elm St" } }"#,
        )
        .unwrap();
        assert!(e.success);
        assert_eq!(e.suggested_data.unwrap()["address"], "12 Elm St");
    }
}
