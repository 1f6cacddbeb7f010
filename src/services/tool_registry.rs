//! Tool-use registry: live and completed invocations with streaming stats.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::models::ToolCall;

/// Registry behavior knobs.
#[derive(Debug, Clone)]
pub struct ToolRegistryConfig {
    /// Disable a tool whenever a single call runs longer than the
    /// threshold. Conflates latency with reliability; off by default.
    pub disable_slow_tools: bool,
    pub slow_call_threshold_ms: u64,
}

impl Default for ToolRegistryConfig {
    fn default() -> Self {
        Self {
            disable_slow_tools: false,
            slow_call_threshold_ms: 10_000,
        }
    }
}

/// Streaming per-name counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolStats {
    pub total_calls: u64,
    pub completed_calls: u64,
    pub successful_calls: u64,
    pub latencies_ms: Vec<u64>,
}

impl ToolStats {
    pub fn success_rate(&self) -> Option<f64> {
        if self.completed_calls == 0 {
            None
        } else {
            Some(self.successful_calls as f64 / self.completed_calls as f64)
        }
    }

    pub fn average_latency_ms(&self) -> Option<f64> {
        if self.latencies_ms.is_empty() {
            None
        } else {
            Some(self.latencies_ms.iter().sum::<u64>() as f64 / self.latencies_ms.len() as f64)
        }
    }
}

/// Aggregate statistics snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryStatistics {
    pub total_calls: u64,
    pub active_calls: usize,
    pub calls_by_name: BTreeMap<String, u64>,
    /// success-rate × frequency-share per name.
    pub efficiency_scores: BTreeMap<String, f64>,
    /// Names with success rate above 0.8.
    pub top_performers: Vec<String>,
    /// Names with success rate below 0.5.
    pub problem_tools: Vec<String>,
    pub disabled_tools: Vec<String>,
}

/// Tracks live and completed tool invocations for a build.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    config: ToolRegistryConfig,
    active: HashMap<String, ToolCall>,
    completed: Vec<ToolCall>,
    stats: BTreeMap<String, ToolStats>,
    disabled: BTreeSet<String>,
}

impl ToolRegistry {
    pub fn new(config: ToolRegistryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Record the start of a tool invocation.
    ///
    /// A second start for an id that is already active is a protocol bug;
    /// it is treated as a redundant end of the first invocation.
    pub fn start_call(
        &mut self,
        id: &str,
        name: &str,
        parameters: Value,
        phase_id: Option<&str>,
    ) {
        if self.active.contains_key(id) {
            warn!(call_id = id, tool = name, "duplicate tool_use id; treating as redundant end");
            self.end_call(id, None, None);
            return;
        }
        if self.completed.iter().any(|c| c.id == id) {
            return;
        }

        let call = ToolCall::start(id, name, parameters, phase_id.map(String::from));
        self.stats.entry(name.to_string()).or_default().total_calls += 1;
        self.active.insert(id.to_string(), call);
    }

    /// Complete a tool invocation. Idempotent: ending an id that is not
    /// active is a no-op.
    pub fn end_call(&mut self, id: &str, result: Option<String>, error: Option<String>) {
        let Some(mut call) = self.active.remove(id) else {
            return;
        };
        call.end_time = Some(Utc::now());
        call.result = result;
        call.error = error;

        let duration = call.duration_ms().unwrap_or(0);
        let stats = self.stats.entry(call.name.clone()).or_default();
        stats.completed_calls += 1;
        if call.is_success() {
            stats.successful_calls += 1;
        }
        stats.latencies_ms.push(duration);

        if self.config.disable_slow_tools && duration > self.config.slow_call_threshold_ms {
            warn!(tool = %call.name, duration_ms = duration, "disabling slow tool");
            self.disabled.insert(call.name.clone());
        }

        self.completed.push(call);
    }

    pub fn active_calls(&self) -> Vec<&ToolCall> {
        self.active.values().collect()
    }

    pub fn completed_calls(&self) -> &[ToolCall] {
        &self.completed
    }

    pub fn usage_count(&self, name: &str) -> u64 {
        self.stats.get(name).map_or(0, |s| s.total_calls)
    }

    pub fn success_rate(&self, name: &str) -> Option<f64> {
        self.stats.get(name).and_then(ToolStats::success_rate)
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled.contains(name)
    }

    pub fn disable(&mut self, name: &str) {
        self.disabled.insert(name.to_string());
    }

    pub fn disabled_tools(&self) -> &BTreeSet<String> {
        &self.disabled
    }

    pub fn statistics(&self) -> RegistryStatistics {
        let total_calls: u64 = self.stats.values().map(|s| s.total_calls).sum();

        let mut calls_by_name = BTreeMap::new();
        let mut efficiency_scores = BTreeMap::new();
        let mut top_performers = Vec::new();
        let mut problem_tools = Vec::new();

        for (name, stats) in &self.stats {
            calls_by_name.insert(name.clone(), stats.total_calls);
            if let Some(rate) = stats.success_rate() {
                let share = if total_calls == 0 {
                    0.0
                } else {
                    stats.total_calls as f64 / total_calls as f64
                };
                efficiency_scores.insert(name.clone(), rate * share);
                if rate > 0.8 {
                    top_performers.push(name.clone());
                } else if rate < 0.5 {
                    problem_tools.push(name.clone());
                }
            }
        }

        RegistryStatistics {
            total_calls,
            active_calls: self.active.len(),
            calls_by_name,
            efficiency_scores,
            top_performers,
            problem_tools,
            disabled_tools: self.disabled.iter().cloned().collect(),
        }
    }
}
