//! CRM backend client: executes tools and scans for creation context.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::collaborators::{ContextEnricher, Enrichment, ToolExecutor};
use super::{DispatchContext, ToolSpec};
use crate::LiveError;

/// `{success, result|error}` reply from the tool endpoint.
#[derive(Debug, Deserialize)]
struct ExecutionReply {
    success: bool,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

pub struct HttpBackend {
    base_url: String,
    http: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, LiveError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .map_err(|e| LiveError::Collaborator(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn from_config(config: &concierge_config::BackendConfig) -> Result<Self, LiveError> {
        Self::new(config.url.clone(), Duration::from_secs(config.timeout_secs))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LiveError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(url = %url, "Backend request");

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| LiveError::Collaborator(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LiveError::Collaborator(format!("HTTP {status}: {text}")));
        }

        response
            .json()
            .await
            .map_err(|e| LiveError::Collaborator(format!("invalid backend reply: {e}")))
    }
}

#[async_trait]
impl ToolExecutor for HttpBackend {
    async fn execute(
        &self,
        tool: &ToolSpec,
        args: Value,
        ctx: &DispatchContext,
    ) -> Result<Value, LiveError> {
        let body = json!({ "arguments": args, "context": ctx });
        let reply: ExecutionReply = serde_json::from_value(
            self.post(&format!("tools/{}", tool.name), &body).await?,
        )
        .map_err(|e| LiveError::Collaborator(format!("invalid tool reply: {e}")))?;

        if reply.success {
            Ok(reply.result.unwrap_or(Value::Null))
        } else {
            Err(LiveError::Tool(
                reply.error.unwrap_or_else(|| format!("{} failed", tool.name)),
            ))
        }
    }
}

#[async_trait]
impl ContextEnricher for HttpBackend {
    async fn scan_for_context(
        &self,
        user_id: &str,
        intent: &str,
        entity_type: &str,
        draft: &Value,
    ) -> Result<Enrichment, LiveError> {
        let body = json!({
            "userId": user_id,
            "intent": intent,
            "entityType": entity_type,
            "draft": draft,
        });
        serde_json::from_value(self.post("context/scan", &body).await?)
            .map_err(|e| LiveError::Collaborator(format!("invalid context reply: {e}")))
    }
}
