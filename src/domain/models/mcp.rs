//! MCP server descriptions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A known or installed MCP server and the tools it exposes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServerInfo {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Grouping used in prompt summaries, e.g. "memory", "search".
    #[serde(default)]
    pub category: String,
    /// Tool names exposed by the server (without the mcp__ prefix).
    #[serde(default)]
    pub tools: Vec<String>,
}

impl McpServerInfo {
    /// The wildcard pattern covering every tool on this server.
    pub fn tool_pattern(&self) -> String {
        format!("mcp__{}__*", self.name)
    }

    /// Fully-qualified names of the enumerated tools.
    pub fn qualified_tools(&self) -> Vec<String> {
        self.tools
            .iter()
            .map(|t| format!("mcp__{}__{}", self.name, t))
            .collect()
    }
}
