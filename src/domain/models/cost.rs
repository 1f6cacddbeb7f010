//! Cost accounting entries.
//!
//! Entries are the source of truth; every aggregate is re-derivable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Spend attribution bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostCategory {
    Research,
    AgentExecution,
    Analysis,
}

/// One token-usage record reported by an LLM call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsageEntry {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub model: String,
    pub phase: Option<String>,
    pub category: CostCategory,
    /// Monetary cost, present only when the model has known pricing.
    /// Stored full-precision; rounding happens at display time.
    pub cost: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// Metadata describing one subprocess session of the external agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    pub session_id: String,
    pub phase: Option<String>,
    pub duration_ms: u64,
    pub num_turns: u32,
}

/// One scalar cost record for an entire agent session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSessionCost {
    pub cost_usd: f64,
    pub session: AgentSession,
    pub timestamp: DateTime<Utc>,
}

/// Round half-away-from-zero to 4 decimals, for display only.
pub fn round_display(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
