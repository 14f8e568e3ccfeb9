//! Tool catalog lookup and conversion to engine function declarations.

use std::collections::HashMap;
use std::path::Path;

use super::ToolSpec;
use crate::LiveError;

/// Source of tool declarations.
pub trait ToolRegistry: Send + Sync {
    fn tools_by_domain(&self, domain: &str) -> Vec<ToolSpec>;
    fn tool(&self, name: &str) -> Option<ToolSpec>;
    fn all_tools(&self) -> Vec<ToolSpec>;

    fn to_function_declarations(&self, tools: &[ToolSpec]) -> Vec<serde_json::Value> {
        tools.iter().map(to_function_declaration).collect()
    }
}

/// Convert a tool to the engine's function-declaration format.
pub fn to_function_declaration(tool: &ToolSpec) -> serde_json::Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "parameters": tool.parameters,
    })
}

/// In-memory catalog, usually loaded once at startup from JSON.
#[derive(Debug, Clone, Default)]
pub struct StaticToolRegistry {
    tools: Vec<ToolSpec>,
    by_name: HashMap<String, usize>,
}

impl StaticToolRegistry {
    pub fn new(tools: Vec<ToolSpec>) -> Result<Self, LiveError> {
        let mut by_name = HashMap::with_capacity(tools.len());
        for (i, tool) in tools.iter().enumerate() {
            if by_name.insert(tool.name.clone(), i).is_some() {
                return Err(LiveError::Tool(format!("duplicate tool {}", tool.name)));
            }
        }
        Ok(Self { tools, by_name })
    }

    /// Parse a JSON array of tool declarations.
    pub fn from_json(json: &str) -> Result<Self, LiveError> {
        let tools: Vec<ToolSpec> = serde_json::from_str(json)
            .map_err(|e| LiveError::Tool(format!("invalid tool catalog: {e}")))?;
        Self::new(tools)
    }

    pub fn load(path: &Path) -> Result<Self, LiveError> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            LiveError::Tool(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl ToolRegistry for StaticToolRegistry {
    fn tools_by_domain(&self, domain: &str) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .filter(|t| t.domain() == domain)
            .cloned()
            .collect()
    }

    fn tool(&self, name: &str) -> Option<ToolSpec> {
        self.by_name.get(name).map(|&i| self.tools[i].clone())
    }

    fn all_tools(&self) -> Vec<ToolSpec> {
        self.tools.clone()
    }
}
