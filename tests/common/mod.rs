//! Shared helpers for integration tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, RwLock};

use specforge::domain::errors::BuildResult;
use specforge::domain::models::{
    AgentExit, AgentRequest, BuildConfig, BuildPlan, Phase, ProjectProfile, Specification,
};
use specforge::domain::ports::AgentInvoker;
use specforge::services::{BuildScheduler, CostLedger, MemoryStore, ToolRegistry};

/// One scripted subprocess invocation.
pub struct ScriptedRun {
    pub lines: Vec<String>,
    pub exit: AgentExit,
}

impl ScriptedRun {
    pub fn success(file: &str, cost: f64, turns: u32) -> Self {
        Self {
            lines: vec![
                r#"{"type":"system","subtype":"init","session_id":"S1","tools":["Read","Write"],"mcp_servers":[]}"#
                    .to_string(),
                format!(
                    r#"{{"type":"assistant","message":{{"content":[{{"type":"tool_use","id":"t-{file}","name":"Write","input":{{"file_path":"{file}"}}}}]}}}}"#
                ),
                format!(r#"{{"type":"tool_result","tool_use_id":"t-{file}","content":"written"}}"#),
                format!(
                    r#"{{"type":"result","subtype":"success","cost_usd":{cost},"num_turns":{turns},"duration_ms":1500,"session_id":"S1","result":"phase done"}}"#
                ),
            ],
            exit: AgentExit::Completed {
                exit_code: 0,
                stderr: String::new(),
            },
        }
    }

    pub fn crash(stderr: &str) -> Self {
        Self {
            lines: vec![],
            exit: AgentExit::Completed {
                exit_code: 1,
                stderr: stderr.to_string(),
            },
        }
    }
}

/// Replays scripted runs, one per invocation, in order.
pub struct ScriptedInvoker {
    scripts: Mutex<VecDeque<ScriptedRun>>,
}

impl ScriptedInvoker {
    pub fn new(scripts: Vec<ScriptedRun>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
        }
    }
}

#[async_trait]
impl AgentInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        _request: AgentRequest,
        lines: mpsc::Sender<String>,
        _shutdown: watch::Receiver<bool>,
    ) -> BuildResult<AgentExit> {
        let run = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .expect("scripted invoker exhausted");
        for line in run.lines {
            let _ = lines.send(line).await;
        }
        Ok(run.exit)
    }
}

/// A scheduler with its shared state, ready to run against a temp dir.
pub struct Harness {
    pub scheduler: BuildScheduler,
    pub ledger: Arc<RwLock<CostLedger>>,
    pub registry: Arc<RwLock<ToolRegistry>>,
    pub memory: Arc<RwLock<MemoryStore>>,
}

pub fn phase(id: &str, name: &str, deps: &[&str]) -> Phase {
    Phase::new(id, name, format!("{name} phase"))
        .with_tasks(vec![format!("do the {name} work")])
        .with_dependencies(deps.iter().map(|d| (*d).to_string()).collect())
}

/// Build a harness over the given phases and scripted runs.
pub fn harness(
    config: BuildConfig,
    phases: Vec<Phase>,
    scripts: Vec<ScriptedRun>,
    output_dir: &std::path::Path,
) -> Harness {
    let spec = Specification::new("Create a TODO CLI in Go");
    let plan = BuildPlan::from_phases(phases);

    let mut store = MemoryStore::new("demo", &spec.content_hash)
        .with_snapshot_dir(output_dir.join(".memory"))
        .with_retention(config.checkpoint_retention);
    store.install_plan(&plan);

    let ledger = Arc::new(RwLock::new(CostLedger::new()));
    let registry = Arc::new(RwLock::new(ToolRegistry::default()));
    let memory = Arc::new(RwLock::new(store));

    let scheduler = BuildScheduler::new(
        config,
        spec,
        ProjectProfile::default(),
        Arc::new(ScriptedInvoker::new(scripts)),
        ledger.clone(),
        registry.clone(),
        memory.clone(),
        output_dir.to_path_buf(),
    );

    Harness {
        scheduler,
        ledger,
        registry,
        memory,
    }
}

/// A scheduler resuming from the snapshot directory of a prior harness.
pub fn resumed_harness(
    config: BuildConfig,
    scripts: Vec<ScriptedRun>,
    output_dir: &std::path::Path,
) -> Harness {
    let spec = Specification::new("Create a TODO CLI in Go");
    let store = MemoryStore::load_latest(output_dir.join(".memory"))
        .expect("resumable snapshot")
        .with_retention(config.checkpoint_retention);
    assert_eq!(
        store.memory().specification_hash, spec.content_hash,
        "resume is keyed on the spec hash"
    );

    let ledger = Arc::new(RwLock::new(CostLedger::new()));
    let registry = Arc::new(RwLock::new(ToolRegistry::default()));
    let memory = Arc::new(RwLock::new(store));

    let scheduler = BuildScheduler::new(
        config,
        spec,
        ProjectProfile::default(),
        Arc::new(ScriptedInvoker::new(scripts)),
        ledger.clone(),
        registry.clone(),
        memory.clone(),
        output_dir.to_path_buf(),
    );

    Harness {
        scheduler,
        ledger,
        registry,
        memory,
    }
}

/// Checkpoint snapshot base names present in the memory directory.
pub fn snapshot_names(output_dir: &std::path::Path) -> Vec<String> {
    let dir = output_dir.join(".memory");
    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter_map(|e| {
                    let name = e.file_name().to_string_lossy().to_string();
                    // Strip the `_<epoch>.json` suffix.
                    name.strip_suffix(".json")
                        .and_then(|s| s.rsplit_once('_').map(|(base, _)| base.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Quiet config suitable for tests: no spinner, no sleeps worth noticing.
pub fn test_config() -> BuildConfig {
    BuildConfig {
        max_retries: 0,
        base_retry_delay_secs: 0,
        stream_output: false,
        research_enabled: false,
        mcp_discovery_enabled: false,
        save_prompts: false,
        phase_timeout_secs: 30,
        ..BuildConfig::default()
    }
}
