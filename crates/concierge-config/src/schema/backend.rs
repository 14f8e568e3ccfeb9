use serde::{Deserialize, Serialize};

/// CRM backend that executes tools and scans for creation context.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3000/api".into(),
            timeout_secs: 30,
        }
    }
}

/// Tool catalog location.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ToolsConfig {
    /// JSON file with the tool declarations. Empty means no tools.
    pub catalog: String,
}
