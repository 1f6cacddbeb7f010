//! Tool invocations made by the external agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse category of a tool, derived from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Mcp,
    Command,
    FileOperation,
    Testing,
    Other,
}

impl ToolCategory {
    pub fn classify(name: &str) -> Self {
        let lower = name.to_lowercase();
        if lower.starts_with("mcp__") {
            Self::Mcp
        } else if ["bash", "shell", "command", "exec", "run"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::Command
        } else if ["test", "pytest", "jest", "spec"].iter().any(|k| lower.contains(k)) {
            Self::Testing
        } else if ["read", "write", "edit", "create", "glob", "grep", "ls", "file"]
            .iter()
            .any(|k| lower.contains(k))
        {
            Self::FileOperation
        } else {
            Self::Other
        }
    }
}

/// Finer-grained type tag for analytics.
pub fn tool_type(name: &str) -> String {
    let lower = name.to_lowercase();
    if let Some(rest) = lower.strip_prefix("mcp__") {
        let server = rest.split("__").next().unwrap_or("unknown");
        return format!("mcp:{server}");
    }
    if lower.contains("grep") || lower.contains("glob") || lower.contains("search") {
        return "search".to_string();
    }
    if lower.contains("web") {
        return "web".to_string();
    }
    if lower.contains("git") {
        return "git".to_string();
    }
    match ToolCategory::classify(name) {
        ToolCategory::Command => "execution".to_string(),
        ToolCategory::FileOperation => "file_system".to_string(),
        ToolCategory::Testing => "testing".to_string(),
        ToolCategory::Mcp => "mcp".to_string(),
        ToolCategory::Other => "other".to_string(),
    }
}

/// One invocation of a named capability, tracked by id.
///
/// Active until `end_time` is set; success means ended without error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub parameters: Value,
    pub phase_id: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub category: ToolCategory,
    pub tool_type: String,
}

impl ToolCall {
    pub fn start(
        id: impl Into<String>,
        name: impl Into<String>,
        parameters: Value,
        phase_id: Option<String>,
    ) -> Self {
        let name = name.into();
        let category = ToolCategory::classify(&name);
        let tool_type = tool_type(&name);
        Self {
            id: id.into(),
            name,
            parameters,
            phase_id,
            start_time: Utc::now(),
            end_time: None,
            result: None,
            error: None,
            category,
            tool_type,
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }

    pub fn is_success(&self) -> bool {
        self.end_time.is_some() && self.error.is_none()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds().max(0) as u64)
    }
}
