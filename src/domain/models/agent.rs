//! Request and exit types for the external agent subprocess.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Output format requested from the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    StreamJson,
    Json,
}

impl OutputFormat {
    pub fn as_flag(self) -> &'static str {
        match self {
            Self::StreamJson => "stream-json",
            Self::Json => "json",
        }
    }
}

/// Everything needed to launch the agent for one phase attempt.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    /// Full prompt, delivered on stdin.
    pub prompt: String,
    pub model: String,
    pub max_turns: u32,
    /// Comma-joined into the allowed-tools argument.
    pub allowed_tools: Vec<String>,
    pub mcp_config_path: Option<PathBuf>,
    pub output_format: OutputFormat,
    /// The project output directory; becomes the child's working dir.
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

/// How a subprocess invocation ended.
///
/// A timeout is distinct from a non-zero exit, and both are distinct
/// from cancellation by the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentExit {
    Completed { exit_code: i32, stderr: String },
    TimedOut,
    Cancelled,
}

impl AgentExit {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Completed { exit_code: 0, .. })
    }
}
