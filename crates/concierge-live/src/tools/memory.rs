//! In-memory recently-seen-entity store with ordinal resolution.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

use super::collaborators::{EntityMemory, MemorySession};
use super::ToolSpec;
use crate::LiveError;

/// Where a placeholder points inside the remembered list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ordinal {
    Index(usize),
    Last,
    /// "it", "that one": only meaningful when exactly one entity is known.
    Only,
}

const ORDINAL_WORDS: &[&str] = &[
    "first", "second", "third", "fourth", "fifth", "sixth", "seventh", "eighth", "ninth", "tenth",
];

fn parse_ordinal(text: &str) -> Option<Ordinal> {
    let lowered = text.trim().to_ascii_lowercase();
    let mut phrase = lowered.as_str();
    phrase = phrase.strip_prefix("the ").unwrap_or(phrase);
    phrase = phrase.strip_suffix(" one").unwrap_or(phrase);
    phrase = phrase.trim();

    match phrase {
        "last" | "latest" => return Some(Ordinal::Last),
        "it" | "that" | "this" | "same" => return Some(Ordinal::Only),
        _ => {}
    }
    if let Some(i) = ORDINAL_WORDS.iter().position(|w| *w == phrase) {
        return Some(Ordinal::Index(i));
    }

    let digits = phrase
        .strip_prefix('#')
        .or_else(|| phrase.strip_prefix("number "))
        .unwrap_or(phrase);
    let digits = ["st", "nd", "rd", "th"]
        .iter()
        .find_map(|suffix| digits.strip_suffix(suffix))
        .unwrap_or(digits);
    // Bare numbers are real ids, not ordinals.
    if digits.len() == phrase.len() {
        return None;
    }
    match digits.parse::<usize>() {
        Ok(n) if n > 0 => Some(Ordinal::Index(n - 1)),
        _ => None,
    }
}

/// Domain an id argument refers to: `contact_id` → `contacts`.
fn domain_for_key<'a>(key: &str, tool: &'a ToolSpec) -> Option<std::borrow::Cow<'a, str>> {
    if key == "id" {
        return Some(tool.domain().into());
    }
    let stem = key
        .strip_suffix("_id")
        .or_else(|| key.strip_suffix("Id"))?;
    if stem.is_empty() {
        return Some(tool.domain().into());
    }
    let stem = stem.to_ascii_lowercase();
    let plural = match stem.as_str() {
        "property" => "properties".to_string(),
        s if s.ends_with('s') => s.to_string(),
        s => format!("{s}s"),
    };
    Some(plural.into())
}

fn entities_in(result: &Value) -> Vec<Value> {
    match result {
        Value::Array(items) => items.clone(),
        Value::Object(obj) => {
            for key in ["items", "results", "data"] {
                if let Some(Value::Array(items)) = obj.get(key) {
                    return items.clone();
                }
            }
            if obj.contains_key("id") {
                vec![result.clone()]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

/// Remembers the most recent entity list per session and domain.
#[derive(Default)]
pub struct RecentEntityMemory {
    sessions: RwLock<HashMap<String, HashMap<String, Vec<Value>>>>,
}

impl RecentEntityMemory {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lookup(&self, session_id: &str, domain: &str, ordinal: Ordinal) -> Option<Value> {
        let sessions = self.sessions.read().await;
        let list = sessions.get(session_id)?.get(domain)?;
        let entity = match ordinal {
            Ordinal::Index(i) => list.get(i)?,
            Ordinal::Last => list.last()?,
            Ordinal::Only if list.len() == 1 => &list[0],
            Ordinal::Only => return None,
        };
        entity.get("id").cloned()
    }
}

#[async_trait]
impl EntityMemory for RecentEntityMemory {
    async fn get_or_create_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<MemorySession, LiveError> {
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default();
        Ok(MemorySession {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
        })
    }

    async fn track_entities_from_result(
        &self,
        session_id: &str,
        domain: &str,
        result: &Value,
    ) -> Result<(), LiveError> {
        let entities = entities_in(result);
        if entities.is_empty() || domain.is_empty() {
            return Ok(());
        }
        debug!(session = %session_id, domain = %domain, count = entities.len(), "Tracking entities");
        self.sessions
            .write()
            .await
            .entry(session_id.to_string())
            .or_default()
            .insert(domain.to_string(), entities);
        Ok(())
    }

    async fn resolve_smart_parameters(
        &self,
        session: &MemorySession,
        tool: &ToolSpec,
        args: Value,
    ) -> Result<Value, LiveError> {
        let Value::Object(mut map) = args else {
            return Ok(args);
        };

        for (key, value) in map.iter_mut() {
            let Some(text) = value.as_str() else { continue };
            let Some(ordinal) = parse_ordinal(text) else { continue };
            let Some(domain) = domain_for_key(key, tool) else { continue };
            if let Some(id) = self.lookup(&session.session_id, &domain, ordinal).await {
                debug!(key = %key, placeholder = %text, "Resolved smart parameter");
                *value = id;
            }
        }

        Ok(Value::Object(map))
    }

    async fn forget_session(&self, session_id: &str) {
        self.sessions.write().await.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_ordinals() {
        assert_eq!(parse_ordinal("the second one"), Some(Ordinal::Index(1)));
        assert_eq!(parse_ordinal("First"), Some(Ordinal::Index(0)));
        assert_eq!(parse_ordinal("3rd"), Some(Ordinal::Index(2)));
        assert_eq!(parse_ordinal("#4"), Some(Ordinal::Index(3)));
        assert_eq!(parse_ordinal("number 2"), Some(Ordinal::Index(1)));
        assert_eq!(parse_ordinal("the last one"), Some(Ordinal::Last));
        assert_eq!(parse_ordinal("that one"), Some(Ordinal::Only));
        assert_eq!(parse_ordinal("42"), None);
        assert_eq!(parse_ordinal("c_123"), None);
        assert_eq!(parse_ordinal("0th"), None);
    }

    #[test]
    fn id_keys_map_to_domains() {
        let tool = ToolSpec::new("deals.create", "");
        assert_eq!(domain_for_key("contact_id", &tool).unwrap(), "contacts");
        assert_eq!(domain_for_key("propertyId", &tool).unwrap(), "properties");
        assert_eq!(domain_for_key("_id", &tool).unwrap(), "deals");
        assert!(domain_for_key("name", &tool).is_none());
    }

    #[tokio::test]
    async fn resolves_ordinal_against_last_result() {
        let memory = RecentEntityMemory::new();
        let session = memory.get_or_create_session("u1", "s1").await.unwrap();
        memory
            .track_entities_from_result(
                "s1",
                "contacts",
                &json!({ "items": [{ "id": "c1" }, { "id": "c2" }, { "id": "c3" }] }),
            )
            .await
            .unwrap();

        let tool = ToolSpec::new("deals.create", "");
        let args = json!({ "contact_id": "the second one", "title": "Elm St" });
        let resolved = memory
            .resolve_smart_parameters(&session, &tool, args)
            .await
            .unwrap();
        assert_eq!(resolved["contact_id"], "c2");
        assert_eq!(resolved["title"], "Elm St");
    }

    #[tokio::test]
    async fn unresolvable_placeholders_are_left_alone() {
        let memory = RecentEntityMemory::new();
        let session = memory.get_or_create_session("u1", "s1").await.unwrap();
        memory
            .track_entities_from_result("s1", "contacts", &json!([{ "id": "a" }, { "id": "b" }]))
            .await
            .unwrap();

        let tool = ToolSpec::new("contacts.update", "");
        let resolved = memory
            .resolve_smart_parameters(&session, &tool, json!({ "id": "that one", "x": "fifth" }))
            .await
            .unwrap();
        // Two candidates: "that one" is ambiguous.
        assert_eq!(resolved["id"], "that one");
        assert_eq!(resolved["x"], "fifth");
    }

    #[tokio::test]
    async fn single_entity_results_are_tracked() {
        let memory = RecentEntityMemory::new();
        let session = memory.get_or_create_session("u1", "s1").await.unwrap();
        memory
            .track_entities_from_result("s1", "properties", &json!({ "id": "p9", "address": "1 Main" }))
            .await
            .unwrap();

        let tool = ToolSpec::new("properties.update", "");
        let resolved = memory
            .resolve_smart_parameters(&session, &tool, json!({ "property_id": "it" }))
            .await
            .unwrap();
        assert_eq!(resolved["property_id"], "p9");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let memory = RecentEntityMemory::new();
        memory
            .track_entities_from_result("s1", "deals", &json!([{ "id": "d1" }]))
            .await
            .unwrap();
        let other = memory.get_or_create_session("u2", "s2").await.unwrap();
        let tool = ToolSpec::new("deals.update_stage", "");
        let resolved = memory
            .resolve_smart_parameters(&other, &tool, json!({ "deal_id": "first" }))
            .await
            .unwrap();
        assert_eq!(resolved["deal_id"], "first");

        memory.forget_session("s1").await;
        assert!(memory.sessions.read().await.get("s1").is_none());
    }
}
