//! Live-session behaviour knobs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    /// Delay before the proactive greeting is injected, letting the
    /// engine connection settle.
    pub greeting_delay_ms: u64,
    /// Tool domains declared to the engine at session start.
    pub tool_domains: Vec<String>,
    /// Citation hosts that are never shown to the user (matched
    /// case-insensitively, subdomains included).
    pub blocked_source_hosts: Vec<String>,
    /// Maximum nesting depth searched for citation metadata.
    pub metadata_scan_depth: usize,
    /// How the engine should phrase background job results.
    pub job_delivery_instruction: String,
    /// Declare the engine's built-in web search alongside our tools.
    pub include_search: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            greeting_delay_ms: 800,
            tool_domains: vec![
                "contacts".into(),
                "properties".into(),
                "deals".into(),
                "tasks".into(),
                "reports".into(),
            ],
            blocked_source_hosts: Vec::new(),
            metadata_scan_depth: 6,
            job_delivery_instruction: "a brief, natural spoken summary".into(),
            include_search: true,
        }
    }
}
