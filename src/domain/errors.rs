//! Domain errors for the specforge build system.

use thiserror::Error;

/// Errors that can occur while planning and executing a build.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("Agent exited with code {exit_code}: {stderr}")]
    AgentFailed { exit_code: i32, stderr: String },

    #[error("Agent timed out after {elapsed_secs}s in phase {phase}")]
    AgentTimeout { phase: String, elapsed_secs: u64 },

    #[error("Build interrupted")]
    Interrupted,

    #[error("Unparseable agent event: {0}")]
    EventParse(String),

    #[error("Phase {phase} failed validation: {reason}")]
    PhaseValidation { phase: String, reason: String },

    #[error("Phase {phase} depends on {dependency}, which did not succeed")]
    DependencyNotSatisfied { phase: String, dependency: String },

    #[error("LLM request failed: {0}")]
    LlmApi(String),

    #[error("Checkpoint write failed: {0}")]
    CheckpointIo(String),

    #[error("Snapshot corrupt: {0}")]
    SnapshotCorrupt(String),

    #[error("No resumable state found")]
    NoResumableState,

    #[error("Invalid plan: {0}")]
    PlanInvalid(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type BuildResult<T> = Result<T, BuildError>;
