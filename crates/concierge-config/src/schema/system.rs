//! Logging configuration.

use serde::{Deserialize, Serialize};

/// Log level.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Filter directive for `tracing_subscriber::EnvFilter`.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Trace => "concierge=trace",
            LogLevel::Debug => "concierge=debug",
            LogLevel::Info => "concierge=info",
            LogLevel::Warn => "concierge=warn",
            LogLevel::Error => "concierge=error",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Emit JSON lines instead of the human-readable format.
    pub json: bool,
}
