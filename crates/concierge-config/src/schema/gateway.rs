use serde::{Deserialize, Serialize};

/// Browser-facing WebSocket listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Outbound envelopes a client may have queued before audio is shed.
    pub client_channel_capacity: usize,
    /// Seconds to wait for the client's `start` frame.
    pub start_timeout_secs: u64,
    /// Listener for background job completions. Loopback by default:
    /// anything that can reach it can speak into any user's session.
    pub job_feed_addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8787,
            client_channel_capacity: 256,
            start_timeout_secs: 10,
            job_feed_addr: "127.0.0.1:8788".into(),
        }
    }
}
