//! Domain models.

pub mod agent;
pub mod agent_event;
pub mod config;
pub mod cost;
pub mod instruction;
pub mod mcp;
pub mod memory;
pub mod phase;
pub mod research;
pub mod spec;
pub mod tool_call;

pub use agent::{AgentExit, AgentRequest, OutputFormat};
pub use agent_event::{AgentEvent, ContentBlock, ResultEvent};
pub use config::{BuildConfig, LoggingConfig};
pub use cost::{
    round_display, AgentSession, AgentSessionCost, CostCategory, TokenUsageEntry,
};
pub use instruction::{Instruction, InstructionScope};
pub use mcp::McpServerInfo;
pub use memory::{BuildMemory, Checkpoint, DecisionRecord, ErrorLogEntry};
pub use phase::{sort_phases, BuildPlan, Phase, PhaseStatus};
pub use research::{
    QueryStatus, ResearchFinding, ResearchQuery, ResearchResults, ResearchSynthesis,
};
pub use spec::{ComplexityTier, ProjectProfile, Specification};
pub use tool_call::{tool_type, ToolCall, ToolCategory};
