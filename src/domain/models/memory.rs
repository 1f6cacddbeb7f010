//! Durable build memory: the root entity owning phases and contexts.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::phase::Phase;

/// A named, timestamped marker recorded whenever a snapshot is written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// An entry in the important-decisions audit log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecisionRecord {
    pub decision: String,
    pub rationale: Option<String>,
    pub phase_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// An entry in the error log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub error: String,
    pub phase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, Value>>,
}

/// The durable root entity for a build.
///
/// Owns every phase and all inter-phase context. Tool calls reference
/// phases by id, never by pointer, so serialization stays acyclic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildMemory {
    pub project_name: String,
    /// Stable across runs of the same build.
    pub build_id: String,
    pub specification_hash: String,

    pub phases: Vec<Phase>,
    pub completed_phases: Vec<String>,
    pub current_phase: Option<String>,

    /// Base context merged into every phase's accumulated context.
    pub context: BTreeMap<String, Value>,
    /// Deduped union of files created across all phases.
    pub created_files: Vec<String>,
    pub important_decisions: Vec<DecisionRecord>,
    /// Contexts exported by phases at completion, keyed by phase id.
    pub phase_contexts: BTreeMap<String, BTreeMap<String, Value>>,
    pub error_log: Vec<ErrorLogEntry>,
    /// Append-only.
    pub checkpoints: Vec<Checkpoint>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(skip)]
    phase_index: HashMap<String, usize>,
}

impl BuildMemory {
    pub fn new(project_name: impl Into<String>, specification_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            project_name: project_name.into(),
            build_id: Uuid::new_v4().to_string(),
            specification_hash: specification_hash.into(),
            phases: Vec::new(),
            completed_phases: Vec::new(),
            current_phase: None,
            context: BTreeMap::new(),
            created_files: Vec::new(),
            important_decisions: Vec::new(),
            phase_contexts: BTreeMap::new(),
            error_log: Vec::new(),
            checkpoints: Vec::new(),
            created_at: now,
            updated_at: now,
            phase_index: HashMap::new(),
        }
    }

    /// Rebuild the id index after deserialization or bulk mutation.
    pub fn rebuild_index(&mut self) {
        self.phase_index = self
            .phases
            .iter()
            .enumerate()
            .map(|(i, p)| (p.id.clone(), i))
            .collect();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn add_phase(&mut self, phase: Phase) {
        self.phase_index.insert(phase.id.clone(), self.phases.len());
        self.phases.push(phase);
        self.touch();
    }

    /// O(1) lookup by phase id.
    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phase_index.get(id).map(|&i| &self.phases[i])
    }

    pub fn phase_mut(&mut self, id: &str) -> Option<&mut Phase> {
        let i = *self.phase_index.get(id)?;
        self.updated_at = Utc::now();
        Some(&mut self.phases[i])
    }

    pub fn is_completed(&self, id: &str) -> bool {
        self.completed_phases.iter().any(|c| c == id)
    }

    /// Add created files, preserving order, dropping duplicates.
    pub fn add_created_files(&mut self, files: &[String]) {
        for file in files {
            if !self.created_files.contains(file) {
                self.created_files.push(file.clone());
            }
        }
        self.touch();
    }

    /// Drop dependencies that point at ids absent from the plan.
    ///
    /// Single pass over all phases; called when loading a snapshot.
    pub fn prune_dangling_dependencies(&mut self) {
        let ids: std::collections::HashSet<String> =
            self.phases.iter().map(|p| p.id.clone()).collect();
        for phase in &mut self.phases {
            phase.dependencies.retain(|d| ids.contains(d));
        }
        self.touch();
    }
}
