//! Specforge - autonomous multi-phase project builder.
//!
//! Orchestrates an external code-generation agent to construct a complete
//! software project from a natural-language specification:
//! - Phase planning as a validated DAG (LLM-assisted or templated)
//! - Sequential phase execution with retry and partial-failure policy
//! - Streaming NDJSON event classification from the agent subprocess
//! - Durable, atomically-checkpointed build memory with resumption
//! - Cost and tool-use analytics
//! - Parallel research fan-out with synthesis
//! - MCP server discovery and configuration

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
