//! Build memory store: owns the durable `BuildMemory` entity and its
//! snapshot lifecycle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{
    BuildMemory, BuildPlan, Checkpoint, DecisionRecord, ErrorLogEntry, Phase,
};
use crate::infrastructure::persistence;

/// Checkpoint names never pruned by retention.
pub const PROTECTED_CHECKPOINT_MARKERS: [&str; 4] =
    ["emergency", "final", "interrupted", "failed"];

/// Condensed view of memory used by the prompt composer and reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemorySummary {
    pub project_name: String,
    pub build_id: String,
    pub total_phases: usize,
    pub completed_phases: usize,
    pub completion_ratio: f64,
    pub current_phase: Option<String>,
    pub files_created: usize,
    /// Extension → count over all created files.
    pub file_type_histogram: BTreeMap<String, usize>,
    /// Most recent important decisions, newest last.
    pub recent_decisions: Vec<String>,
    pub technology_stack: Vec<String>,
    pub research_available: bool,
    pub error_count: usize,
    pub checkpoint_count: usize,
}

/// The single writer over a build's memory.
#[derive(Debug)]
pub struct MemoryStore {
    memory: BuildMemory,
    snapshot_dir: Option<PathBuf>,
    retention: usize,
}

impl MemoryStore {
    pub fn new(project_name: impl Into<String>, specification_hash: impl Into<String>) -> Self {
        Self {
            memory: BuildMemory::new(project_name, specification_hash),
            snapshot_dir: None,
            retention: 20,
        }
    }

    /// Wrap a deserialized memory, rebuilding indexes and pruning
    /// dependencies that refer to ids no longer in the plan.
    pub fn from_memory(mut memory: BuildMemory) -> Self {
        memory.rebuild_index();
        memory.prune_dangling_dependencies();
        Self {
            memory,
            snapshot_dir: None,
            retention: 20,
        }
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    pub fn memory(&self) -> &BuildMemory {
        &self.memory
    }

    /// Install the validated plan's phases.
    pub fn install_plan(&mut self, plan: &BuildPlan) {
        for phase in &plan.phases {
            if self.memory.phase(&phase.id).is_none() {
                self.memory.add_phase(phase.clone());
            }
        }
    }

    pub fn add_phase(&mut self, phase: Phase) {
        self.memory.add_phase(phase);
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.memory.phase(id)
    }

    pub fn phase_mut(&mut self, id: &str) -> Option<&mut Phase> {
        self.memory.phase_mut(id)
    }

    pub fn set_current_phase(&mut self, id: Option<String>) {
        self.memory.current_phase = id;
        self.memory.touch();
    }

    pub fn set_context_value(&mut self, key: impl Into<String>, value: Value) {
        self.memory.context.insert(key.into(), value);
        self.memory.touch();
    }

    /// Mark a phase completed and capture its exported context.
    pub fn mark_completed(
        &mut self,
        id: &str,
        exported_context: BTreeMap<String, Value>,
    ) -> BuildResult<()> {
        let files = {
            let phase = self
                .memory
                .phase_mut(id)
                .ok_or_else(|| BuildError::PhaseNotFound(id.to_string()))?;
            phase.completed = true;
            phase.context = exported_context.clone();
            phase.files_created.clone()
        };
        if !self.memory.completed_phases.iter().any(|c| c == id) {
            self.memory.completed_phases.push(id.to_string());
        }
        self.memory
            .phase_contexts
            .insert(id.to_string(), exported_context);
        self.memory.add_created_files(&files);
        Ok(())
    }

    pub fn log_error(
        &mut self,
        error: impl Into<String>,
        phase_id: Option<&str>,
        context: Option<BTreeMap<String, Value>>,
    ) {
        self.memory.error_log.push(ErrorLogEntry {
            timestamp: Utc::now(),
            error: error.into(),
            phase_id: phase_id.map(String::from),
            context,
        });
        self.memory.touch();
    }

    pub fn record_decision(
        &mut self,
        decision: impl Into<String>,
        rationale: Option<String>,
        phase_id: Option<&str>,
    ) {
        self.memory.important_decisions.push(DecisionRecord {
            decision: decision.into(),
            rationale,
            phase_id: phase_id.map(String::from),
            timestamp: Utc::now(),
        });
        self.memory.touch();
    }

    /// Base context merged with the exported context of every phase that
    /// precedes `up_to_phase` in plan order. Later phases override.
    pub fn accumulated_context(&self, up_to_phase: &str) -> BTreeMap<String, Value> {
        let mut merged = self.memory.context.clone();
        let limit = self
            .memory
            .phases
            .iter()
            .position(|p| p.id == up_to_phase)
            .unwrap_or(self.memory.phases.len());
        for phase in &self.memory.phases[..limit] {
            if let Some(ctx) = self.memory.phase_contexts.get(&phase.id) {
                for (key, value) in ctx {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// Record a named checkpoint and persist a snapshot.
    ///
    /// Snapshot I/O failure is logged and never interrupts the run.
    pub fn checkpoint(&mut self, name: &str) -> Option<PathBuf> {
        self.memory.checkpoints.push(Checkpoint {
            name: name.to_string(),
            created_at: Utc::now(),
        });
        self.memory.touch();

        let dir = self.snapshot_dir.clone()?;
        match persistence::save_snapshot(&self.memory, &dir, name) {
            Ok(path) => {
                info!(checkpoint = name, path = %path.display(), "checkpoint written");
                if let Err(e) = persistence::prune_snapshots(
                    &dir,
                    self.retention,
                    &PROTECTED_CHECKPOINT_MARKERS,
                ) {
                    warn!(error = %e, "checkpoint retention prune failed");
                }
                Some(path)
            }
            Err(e) => {
                warn!(checkpoint = name, error = %e, "checkpoint write failed");
                None
            }
        }
    }

    /// Load the newest parseable snapshot from a directory.
    pub fn load_latest(dir: impl AsRef<Path>) -> BuildResult<Self> {
        let memory = persistence::load_latest_snapshot(dir.as_ref())?;
        Ok(Self::from_memory(memory).with_snapshot_dir(dir.as_ref()))
    }

    pub fn summary(&self) -> MemorySummary {
        let memory = &self.memory;
        let total = memory.phases.len();
        let completed = memory.completed_phases.len();

        let mut histogram: BTreeMap<String, usize> = BTreeMap::new();
        for file in &memory.created_files {
            let ext = Path::new(file)
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string();
            *histogram.entry(ext).or_default() += 1;
        }

        let recent_decisions = memory
            .important_decisions
            .iter()
            .rev()
            .take(5)
            .rev()
            .map(|d| d.decision.clone())
            .collect();

        let technology_stack = memory
            .context
            .get("technology_stack")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        MemorySummary {
            project_name: memory.project_name.clone(),
            build_id: memory.build_id.clone(),
            total_phases: total,
            completed_phases: completed,
            completion_ratio: if total == 0 {
                0.0
            } else {
                completed as f64 / total as f64
            },
            current_phase: memory.current_phase.clone(),
            files_created: memory.created_files.len(),
            file_type_histogram: histogram,
            recent_decisions,
            technology_stack,
            research_available: memory.context.contains_key("research_results"),
            error_count: memory.error_log.len(),
            checkpoint_count: memory.checkpoints.len(),
        }
    }
}
