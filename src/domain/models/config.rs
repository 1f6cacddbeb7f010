//! Build configuration record.

use serde::{Deserialize, Serialize};

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json, pretty).
    #[serde(default = "default_log_format")]
    pub format: String,
    /// Directory for rolling log files; stdout-only when unset.
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
        }
    }
}

/// The complete build configuration.
///
/// Loaded via figment from defaults, `.specforge/config.yaml`,
/// `.specforge/local.yaml`, and `SPECFORGE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Retries per phase after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the linear retry back-off, in seconds.
    #[serde(default = "default_base_retry_delay")]
    pub base_retry_delay_secs: u64,
    /// Keep going after a phase exhausts its retries.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Turn cap passed to the agent.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Per-phase subprocess timeout, in seconds.
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub research_enabled: bool,
    #[serde(default = "default_true")]
    pub mcp_discovery_enabled: bool,
    #[serde(default)]
    pub auto_confirm: bool,
    #[serde(default = "default_true")]
    pub stream_output: bool,
    /// Persist each composed prompt under `.prompts/`.
    #[serde(default)]
    pub save_prompts: bool,

    #[serde(default = "default_model_analyzer")]
    pub model_analyzer: String,
    #[serde(default = "default_model_executor")]
    pub model_executor: String,
    #[serde(default = "default_model_research")]
    pub model_research: String,

    #[serde(default = "default_min_phases")]
    pub min_phases: usize,
    #[serde(default = "default_min_tasks_per_phase")]
    pub min_tasks_per_phase: usize,
    /// Checkpoints kept beyond the protected names.
    #[serde(default = "default_checkpoint_retention")]
    pub checkpoint_retention: usize,

    /// Name or path of the external agent binary.
    #[serde(default = "default_agent_binary")]
    pub agent_binary: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_retry_delay_secs: default_base_retry_delay(),
            continue_on_error: false,
            max_turns: default_max_turns(),
            phase_timeout_secs: default_phase_timeout(),
            research_enabled: true,
            mcp_discovery_enabled: true,
            auto_confirm: false,
            stream_output: true,
            save_prompts: false,
            model_analyzer: default_model_analyzer(),
            model_executor: default_model_executor(),
            model_research: default_model_research(),
            min_phases: default_min_phases(),
            min_tasks_per_phase: default_min_tasks_per_phase(),
            checkpoint_retention: default_checkpoint_retention(),
            agent_binary: default_agent_binary(),
            logging: LoggingConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_retry_delay() -> u64 {
    2
}

fn default_max_turns() -> u32 {
    30
}

fn default_phase_timeout() -> u64 {
    600
}

fn default_true() -> bool {
    true
}

fn default_model_analyzer() -> String {
    "claude-opus-4-6".to_string()
}

fn default_model_executor() -> String {
    "claude-sonnet-4-5".to_string()
}

fn default_model_research() -> String {
    "claude-haiku-4-5".to_string()
}

fn default_min_phases() -> usize {
    3
}

fn default_min_tasks_per_phase() -> usize {
    2
}

fn default_checkpoint_retention() -> usize {
    20
}

fn default_agent_binary() -> String {
    "claude".to_string()
}
