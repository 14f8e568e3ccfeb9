//! Citation handling: locating grounding metadata inside engine payloads
//! and collecting the per-turn set of display links.

use serde_json::Value;
use tracing::debug;

use crate::GroundingChunk;

/// Fields that carry bulk binary payloads and never contain citations.
const SKIPPED_FIELDS: &[&str] = &["inlinedata", "data", "audio", "mediachunks"];

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Search `value` for the first `groundingMetadata` object (any casing,
/// snake or camel) no deeper than `max_depth` levels and return its chunks.
pub fn find_grounding_chunks(value: &Value, max_depth: usize) -> Vec<GroundingChunk> {
    find_metadata(value, max_depth)
        .map(chunks_from_metadata)
        .unwrap_or_default()
}

fn find_metadata(value: &Value, depth_left: usize) -> Option<&Value> {
    match value {
        Value::Object(map) => {
            if let Some((_, found)) = map
                .iter()
                .find(|(k, _)| normalize_key(k) == "groundingmetadata")
            {
                return Some(found);
            }
            if depth_left == 0 {
                return None;
            }
            map.iter()
                .filter(|(k, _)| !SKIPPED_FIELDS.contains(&normalize_key(k).as_str()))
                .find_map(|(_, v)| find_metadata(v, depth_left - 1))
        }
        Value::Array(items) if depth_left > 0 => {
            items.iter().find_map(|v| find_metadata(v, depth_left - 1))
        }
        _ => None,
    }
}

fn lookup<'a>(value: &'a Value, name: &str) -> Option<&'a Value> {
    value
        .as_object()?
        .iter()
        .find(|(k, _)| normalize_key(k) == name)
        .map(|(_, v)| v)
}

fn chunks_from_metadata(metadata: &Value) -> Vec<GroundingChunk> {
    let Some(chunks) = lookup(metadata, "groundingchunks").and_then(Value::as_array) else {
        return Vec::new();
    };

    chunks
        .iter()
        .filter_map(|chunk| lookup(chunk, "web").or_else(|| lookup(chunk, "retrievedcontext")))
        .filter_map(|source| {
            let uri = lookup(source, "uri")?.as_str()?.to_string();
            let title = lookup(source, "title")
                .and_then(Value::as_str)
                .filter(|t| !t.trim().is_empty())
                .map(str::to_string);
            Some(GroundingChunk { uri, title })
        })
        .collect()
}

/// Deduplicating, host-filtering set of citation links for one turn.
#[derive(Debug, Default, Clone)]
pub struct GroundingSourceCollector {
    entries: Vec<String>,
    blocked_hosts: Vec<String>,
}

impl GroundingSourceCollector {
    pub fn new<I, S>(blocked_hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            entries: Vec::new(),
            blocked_hosts: blocked_hosts
                .into_iter()
                .map(|h| h.as_ref().trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    fn is_blocked(&self, host: &str) -> bool {
        self.blocked_hosts.iter().any(|blocked| {
            host == blocked
                || host
                    .strip_suffix(blocked.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// Add a citation. Returns `true` if it produced a new entry.
    pub fn add(&mut self, chunk: &GroundingChunk) -> bool {
        let host = match url::Url::parse(&chunk.uri) {
            Ok(parsed) => match parsed.host_str() {
                Some(host) => host.to_ascii_lowercase(),
                None => return false,
            },
            Err(e) => {
                debug!(uri = %chunk.uri, error = %e, "Discarding unparseable citation");
                return false;
            }
        };

        if self.is_blocked(&host) {
            debug!(host = %host, "Discarding blocked citation");
            return false;
        }

        let label = chunk.title.as_deref().unwrap_or(&host);
        let display = format!("[{label}]({})", chunk.uri);
        if self.entries.contains(&display) {
            return false;
        }
        self.entries.push(display);
        true
    }

    /// Take the collected entries in insertion order, leaving the set empty.
    pub fn flush(&mut self) -> Vec<String> {
        std::mem::take(&mut self.entries)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Render flushed entries as the numbered list sent alongside them.
pub fn format_sources(entries: &[String]) -> String {
    let mut text = String::from("Sources:");
    for (i, entry) in entries.iter().enumerate() {
        text.push_str(&format!("\n{}. {entry}", i + 1));
    }
    text
}
