//! Configuration schema types for Concierge.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod backend;
mod engine;
mod gateway;
mod live;
mod system;

pub use backend::*;
pub use engine::*;
pub use gateway::*;
pub use live::*;
pub use system::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConciergeConfig {
    pub gateway: GatewayConfig,
    pub engine: EngineConfig,
    pub live: LiveConfig,
    pub backend: BackendConfig,
    pub tools: ToolsConfig,
    pub logging: LoggingConfig,
}
