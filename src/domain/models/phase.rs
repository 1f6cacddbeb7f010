//! Phase lifecycle and the build plan graph.
//!
//! A plan is an ordered sequence of phases whose dependencies form a DAG.
//! Graph utilities here provide topological ordering and cycle handling.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle states of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
    Cancelled,
    Retrying,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Cancelled => "cancelled",
            Self::Retrying => "retrying",
        };
        write!(f, "{s}")
    }
}

impl PhaseStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Skipped | Self::Cancelled
        )
    }
}

/// A planned unit of the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Human-readable tasks, executed verbatim by the agent prompt.
    pub tasks: Vec<String>,
    /// Ids of phases that must succeed before this one runs.
    pub dependencies: Vec<String>,

    pub status: PhaseStatus,
    pub retry_count: u32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,

    /// Outputs.
    pub files_created: Vec<String>,
    pub tool_call_ids: Vec<String>,
    pub output_summary: Option<String>,
    pub error: Option<String>,
    /// Facts exported to later phases.
    pub context: BTreeMap<String, Value>,
    /// Component checklist filled by the external validator.
    pub validation_results: BTreeMap<String, bool>,
    pub completed: bool,
}

impl Phase {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tasks: Vec::new(),
            dependencies: Vec::new(),
            status: PhaseStatus::Pending,
            retry_count: 0,
            start_time: None,
            end_time: None,
            files_created: Vec::new(),
            tool_call_ids: Vec::new(),
            output_summary: None,
            error: None,
            context: BTreeMap::new(),
            validation_results: BTreeMap::new(),
            completed: false,
        }
    }

    pub fn with_tasks(mut self, tasks: Vec<String>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Transition to Running and stamp the start time.
    pub fn begin(&mut self) {
        self.status = PhaseStatus::Running;
        self.start_time = Some(Utc::now());
        self.error = None;
    }

    pub fn succeed(&mut self, summary: impl Into<String>) {
        self.status = PhaseStatus::Success;
        self.completed = true;
        self.output_summary = Some(summary.into());
        self.error = None;
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = PhaseStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.status = PhaseStatus::Skipped;
        self.error = Some(reason.into());
        self.end_time = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = PhaseStatus::Cancelled;
        self.end_time = Some(Utc::now());
    }

    pub fn duration_secs(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds() as f64 / 1000.0)
            }
            _ => None,
        }
    }

    /// Success postconditions: completed, no error, at least one file, summary present.
    pub fn meets_success_criteria(&self) -> bool {
        self.completed
            && self.error.is_none()
            && !self.files_created.is_empty()
            && self.output_summary.is_some()
    }
}

/// A topologically-sorted collection of phases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPlan {
    pub phases: Vec<Phase>,
}

impl BuildPlan {
    /// Build a plan from phases, sorting dependencies-first.
    ///
    /// Phases participating in a cycle are appended after the sorted
    /// portion in input order, with the edges among them cleared.
    pub fn from_phases(phases: Vec<Phase>) -> Self {
        let (sorted, _) = sort_phases(phases);
        Self { phases: sorted }
    }

    pub fn phase(&self, id: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == id)
    }

    pub fn first_phase_id(&self) -> Option<&str> {
        self.phases.first().map(|p| p.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.phases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.phases.is_empty()
    }
}

/// Topologically sort phases with Kahn's algorithm.
///
/// Returns the sorted phases (cyclic remainder appended in input order with
/// intra-cycle edges cleared) and the ids of phases found in a cycle.
pub fn sort_phases(phases: Vec<Phase>) -> (Vec<Phase>, Vec<String>) {
    let ids: HashSet<String> = phases.iter().map(|p| p.id.clone()).collect();
    let index_of: HashMap<String, usize> = phases
        .iter()
        .enumerate()
        .map(|(i, p)| (p.id.clone(), i))
        .collect();

    // In-degree counts only dependencies that exist in this plan.
    let mut in_degree: Vec<usize> = phases
        .iter()
        .map(|p| p.dependencies.iter().filter(|d| ids.contains(*d)).count())
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); phases.len()];
    for (i, phase) in phases.iter().enumerate() {
        for dep in &phase.dependencies {
            if let Some(&di) = index_of.get(dep) {
                dependents[di].push(i);
            }
        }
    }

    let mut queue: VecDeque<usize> = (0..phases.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order: Vec<usize> = Vec::with_capacity(phases.len());

    while let Some(i) = queue.pop_front() {
        order.push(i);
        for &dep in &dependents[i] {
            in_degree[dep] -= 1;
            if in_degree[dep] == 0 {
                queue.push_back(dep);
            }
        }
    }

    let placed: HashSet<usize> = order.iter().copied().collect();
    let cyclic: Vec<usize> = (0..phases.len()).filter(|i| !placed.contains(i)).collect();
    let cyclic_ids: HashSet<String> = cyclic.iter().map(|&i| phases[i].id.clone()).collect();

    let mut sorted: Vec<Phase> = Vec::with_capacity(phases.len());
    for &i in &order {
        sorted.push(phases[i].clone());
    }
    for &i in &cyclic {
        let mut phase = phases[i].clone();
        phase.dependencies.retain(|d| !cyclic_ids.contains(d));
        sorted.push(phase);
    }

    let cyclic_id_list = cyclic.iter().map(|&i| phases[i].id.clone()).collect();
    (sorted, cyclic_id_list)
}
