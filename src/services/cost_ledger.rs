//! Model-aware cost ledger.
//!
//! Aggregates token usage and agent-session costs by phase, model, and
//! category. Entries are authoritative; summaries are recomputed from them.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::models::{
    round_display, AgentSession, AgentSessionCost, CostCategory, TokenUsageEntry,
};

/// Pricing per million tokens for a specific model (USD).
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input: f64,
    pub output: f64,
}

/// Known model pricing table (costs in USD per million tokens).
const PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("claude-opus-4-6", ModelPricing { input: 15.0, output: 75.0 }),
    ("opus", ModelPricing { input: 15.0, output: 75.0 }),
    ("claude-sonnet-4-5", ModelPricing { input: 3.0, output: 15.0 }),
    ("sonnet", ModelPricing { input: 3.0, output: 15.0 }),
    ("claude-haiku-4-5", ModelPricing { input: 0.80, output: 4.0 }),
    ("haiku", ModelPricing { input: 0.80, output: 4.0 }),
];

/// Get pricing for a model by name or alias.
///
/// Matches known model name substrings (e.g. "sonnet" matches
/// "claude-sonnet-4-5-20250929").
pub fn model_pricing(model: &str) -> Option<ModelPricing> {
    let model_lower = model.to_lowercase();
    PRICING_TABLE
        .iter()
        .find(|(name, _)| model_lower.contains(name))
        .map(|(_, pricing)| *pricing)
}

/// Cost in USD for a token count pair, if the model is priced.
pub fn estimate_cost(model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
    let pricing = model_pricing(model)?;
    Some(
        (input_tokens as f64 * pricing.input + output_tokens as f64 * pricing.output)
            / 1_000_000.0,
    )
}

/// Token totals for one phase or model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct TokenTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Per-model usage row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub entry_count: usize,
}

/// Aggregated view over all entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CostSummary {
    pub total_cost: f64,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub cost_by_phase: BTreeMap<String, f64>,
    pub tokens_by_phase: BTreeMap<String, TokenTotals>,
    pub usage_by_model: BTreeMap<String, ModelUsage>,
    pub session_count: usize,
    pub average_session_cost: f64,
    pub research_cost: f64,
    pub agent_cost: f64,
    pub analysis_cost: f64,
}

impl CostSummary {
    /// Total cost rounded for display.
    pub fn display_total(&self) -> f64 {
        round_display(self.total_cost)
    }
}

/// One row of the per-model breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownRow {
    pub label: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_cost: f64,
    /// Present only on the synthetic agent-execution row.
    pub sessions: Option<usize>,
    pub average_turns: Option<f64>,
}

/// The build's cost ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostLedger {
    entries: Vec<TokenUsageEntry>,
    sessions: Vec<AgentSessionCost>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a token-usage event.
    ///
    /// Cost is attached only when the model is in the pricing table;
    /// unknown models still have their usage recorded.
    pub fn add_token_usage(
        &mut self,
        input_tokens: u64,
        output_tokens: u64,
        model: &str,
        phase: Option<&str>,
        category: CostCategory,
    ) {
        let cost = estimate_cost(model, input_tokens, output_tokens);
        self.entries.push(TokenUsageEntry {
            input_tokens,
            output_tokens,
            model: model.to_string(),
            phase: phase.map(String::from),
            category,
            cost,
            timestamp: Utc::now(),
        });
    }

    /// Record the scalar cost of a whole agent session.
    pub fn add_agent_session_cost(&mut self, cost_usd: f64, session: AgentSession) {
        self.sessions.push(AgentSessionCost {
            cost_usd,
            session,
            timestamp: Utc::now(),
        });
    }

    pub fn entries(&self) -> &[TokenUsageEntry] {
        &self.entries
    }

    pub fn sessions(&self) -> &[AgentSessionCost] {
        &self.sessions
    }

    /// Recompute the full summary from entries.
    pub fn summary(&self) -> CostSummary {
        let mut summary = CostSummary::default();

        for entry in &self.entries {
            let cost = entry.cost.unwrap_or(0.0);
            summary.total_cost += cost;
            summary.total_input_tokens += entry.input_tokens;
            summary.total_output_tokens += entry.output_tokens;

            let phase = entry.phase.as_deref().unwrap_or("unattributed");
            *summary.cost_by_phase.entry(phase.to_string()).or_default() += cost;
            let tokens = summary.tokens_by_phase.entry(phase.to_string()).or_default();
            tokens.input_tokens += entry.input_tokens;
            tokens.output_tokens += entry.output_tokens;

            let usage = summary
                .usage_by_model
                .entry(entry.model.clone())
                .or_default();
            usage.input_tokens += entry.input_tokens;
            usage.output_tokens += entry.output_tokens;
            usage.cost += cost;
            usage.entry_count += 1;

            match entry.category {
                CostCategory::Research => summary.research_cost += cost,
                CostCategory::AgentExecution => summary.agent_cost += cost,
                CostCategory::Analysis => summary.analysis_cost += cost,
            }
        }

        for session in &self.sessions {
            summary.total_cost += session.cost_usd;
            summary.agent_cost += session.cost_usd;
            let phase = session.session.phase.as_deref().unwrap_or("unattributed");
            *summary.cost_by_phase.entry(phase.to_string()).or_default() += session.cost_usd;
        }

        summary.session_count = self.sessions.len();
        summary.average_session_cost = if self.sessions.is_empty() {
            0.0
        } else {
            self.sessions.iter().map(|s| s.cost_usd).sum::<f64>() / self.sessions.len() as f64
        };

        summary
    }

    /// Per-model rows plus a synthetic agent-execution row,
    /// sorted by descending cost.
    pub fn breakdown(&self) -> Vec<BreakdownRow> {
        let summary = self.summary();
        let mut rows: Vec<BreakdownRow> = summary
            .usage_by_model
            .iter()
            .map(|(model, usage)| BreakdownRow {
                label: model.clone(),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                total_cost: usage.cost,
                sessions: None,
                average_turns: None,
            })
            .collect();

        if !self.sessions.is_empty() {
            let session_cost: f64 = self.sessions.iter().map(|s| s.cost_usd).sum();
            let total_turns: u32 = self.sessions.iter().map(|s| s.session.num_turns).sum();
            rows.push(BreakdownRow {
                label: "agent-execution".to_string(),
                input_tokens: 0,
                output_tokens: 0,
                total_cost: session_cost,
                sessions: Some(self.sessions.len()),
                average_turns: Some(f64::from(total_turns) / self.sessions.len() as f64),
            });
        }

        rows.sort_by(|a, b| {
            b.total_cost
                .partial_cmp(&a.total_cost)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        rows
    }
}
