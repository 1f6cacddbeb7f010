//! Phase scheduler and runner.
//!
//! Executes the plan strictly sequentially. Within a phase, the subprocess
//! driver, the event classifier, and a progress ticker cooperate over
//! channels; the classifier is the only writer of the ledger and registry.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use regex::Regex;
use serde_json::json;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{error, info, warn};

use crate::domain::errors::{BuildError, BuildResult};
use crate::domain::models::{
    AgentExit, AgentRequest, BuildConfig, McpServerInfo, OutputFormat, PhaseStatus,
    ProjectProfile, Specification,
};
use crate::domain::ports::AgentInvoker;
use crate::services::build_memory::MemoryStore;
use crate::services::cost_ledger::CostLedger;
use crate::services::event_classifier::{ClassifiedRun, EventClassifier};
use crate::services::instructions::InstructionSet;
use crate::services::prompt_composer::{PromptComposer, PromptInputs};
use crate::services::tool_gate::ToolGate;
use crate::services::tool_registry::ToolRegistry;

/// POSIX convention for SIGINT.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Phases whose name matches get 1.5x the configured timeout.
const EXTENDED_TIMEOUT_PATTERN: &str = r"(?i)test|deploy|optimization";

/// Outcome of a full scheduler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    pub exit_code: i32,
    pub phases_run: usize,
    pub phases_failed: usize,
    pub phases_skipped: usize,
    pub interrupted: bool,
}

/// Terminal outcome of one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PhaseOutcome {
    Success,
    Failed,
    Cancelled,
}

/// Drives phases through their state machine.
pub struct BuildScheduler {
    config: BuildConfig,
    spec: Specification,
    profile: ProjectProfile,
    invoker: Arc<dyn AgentInvoker>,
    ledger: Arc<RwLock<CostLedger>>,
    registry: Arc<RwLock<ToolRegistry>>,
    memory: Arc<RwLock<MemoryStore>>,
    composer: PromptComposer,
    gate: ToolGate,
    instructions: InstructionSet,
    mcp_servers: Vec<McpServerInfo>,
    output_dir: PathBuf,
    shutdown: watch::Receiver<bool>,
    /// Keeps an internally-created shutdown channel alive.
    _shutdown_tx: Option<watch::Sender<bool>>,
}

impl BuildScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: BuildConfig,
        spec: Specification,
        profile: ProjectProfile,
        invoker: Arc<dyn AgentInvoker>,
        ledger: Arc<RwLock<CostLedger>>,
        registry: Arc<RwLock<ToolRegistry>>,
        memory: Arc<RwLock<MemoryStore>>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            config,
            spec,
            profile,
            invoker,
            ledger,
            registry,
            memory,
            composer: PromptComposer::new(),
            gate: ToolGate::default(),
            instructions: InstructionSet::default(),
            mcp_servers: Vec::new(),
            output_dir: output_dir.into(),
            shutdown: rx,
            _shutdown_tx: Some(tx),
        }
    }

    pub fn with_instructions(mut self, instructions: InstructionSet) -> Self {
        self.instructions = instructions;
        self
    }

    pub fn with_mcp_servers(mut self, servers: Vec<McpServerInfo>) -> Self {
        self.mcp_servers = servers;
        self
    }

    /// Use an external cancellation signal (wired to SIGINT/SIGTERM).
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = shutdown;
        self._shutdown_tx = None;
        self
    }

    fn interrupted(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Execute every incomplete phase in plan order.
    pub async fn run(&self) -> BuildResult<BuildOutcome> {
        let phase_ids: Vec<String> = {
            let memory = self.memory.read().await;
            memory.memory().phases.iter().map(|p| p.id.clone()).collect()
        };
        let total = phase_ids.len();

        let mut phases_run = 0;
        let mut phases_failed = 0;
        let mut phases_skipped = 0;

        for (index, phase_id) in phase_ids.iter().enumerate() {
            if self.interrupted() {
                return Ok(self.finish_interrupted(phases_run, phases_failed, phases_skipped).await);
            }

            if self.memory.read().await.memory().completed_phases.iter().any(|c| c == phase_id) {
                info!(phase = %phase_id, "already complete; skipping (resume)");
                continue;
            }

            // Dependency check.
            if let Some(unsatisfied) = self.unsatisfied_dependency(phase_id).await {
                if self.config.continue_on_error {
                    warn!(phase = %phase_id, dependency = %unsatisfied, "dependency not satisfied; skipping phase");
                    let mut memory = self.memory.write().await;
                    if let Some(phase) = memory.phase_mut(phase_id) {
                        phase.skip(format!("dependency {unsatisfied} did not succeed"));
                    }
                    memory.checkpoint(&format!("completed_{phase_id}"));
                    phases_skipped += 1;
                    continue;
                }
                let err = BuildError::DependencyNotSatisfied {
                    phase: phase_id.clone(),
                    dependency: unsatisfied,
                };
                self.fail_build(&err.to_string(), Some(phase_id)).await;
                return Ok(BuildOutcome {
                    success: false,
                    exit_code: 1,
                    phases_run,
                    phases_failed: phases_failed + 1,
                    phases_skipped,
                    interrupted: false,
                });
            }

            phases_run += 1;
            match self.run_phase(index, total, phase_id).await? {
                PhaseOutcome::Success => {}
                PhaseOutcome::Failed => {
                    phases_failed += 1;
                    if !self.config.continue_on_error {
                        let reason = self
                            .memory
                            .read()
                            .await
                            .phase(phase_id)
                            .and_then(|p| p.error.clone())
                            .unwrap_or_else(|| "phase failed".to_string());
                        self.fail_build(&reason, Some(phase_id)).await;
                        return Ok(BuildOutcome {
                            success: false,
                            exit_code: 1,
                            phases_run,
                            phases_failed,
                            phases_skipped,
                            interrupted: false,
                        });
                    }
                }
                PhaseOutcome::Cancelled => {
                    return Ok(self.finish_interrupted(phases_run, phases_failed, phases_skipped).await);
                }
            }
        }

        {
            let mut memory = self.memory.write().await;
            memory.set_current_phase(None);
            memory.checkpoint("final");
        }
        info!(phases = total, failed = phases_failed, "build complete");

        Ok(BuildOutcome {
            success: phases_failed == 0,
            exit_code: 0,
            phases_run,
            phases_failed,
            phases_skipped,
            interrupted: false,
        })
    }

    /// One phase through its retry state machine.
    async fn run_phase(
        &self,
        index: usize,
        total: usize,
        phase_id: &str,
    ) -> BuildResult<PhaseOutcome> {
        loop {
            let (attempt, phase_name) = {
                let mut memory = self.memory.write().await;
                memory.set_current_phase(Some(phase_id.to_string()));
                let phase = memory
                    .phase_mut(phase_id)
                    .ok_or_else(|| BuildError::PhaseNotFound(phase_id.to_string()))?;
                phase.begin();
                (phase.retry_count, phase.name.clone())
            };

            info!(phase = %phase_id, name = %phase_name, attempt, "phase running");
            let attempt_result = self.run_attempt(index, total, phase_id, attempt).await?;

            match attempt_result {
                AttemptResult::Success => {
                    let phase_cost = self
                        .ledger
                        .read()
                        .await
                        .summary()
                        .cost_by_phase
                        .get(phase_id)
                        .copied()
                        .unwrap_or(0.0);
                    let mut memory = self.memory.write().await;
                    if let Some(phase) = memory.phase(phase_id) {
                        info!(
                            phase = %phase_id,
                            "commit message:\n{}",
                            crate::services::report::phase_commit_message(phase, phase_cost)
                        );
                    }
                    memory.checkpoint(&format!("completed_{phase_id}"));
                    return Ok(PhaseOutcome::Success);
                }
                AttemptResult::Cancelled => {
                    let mut memory = self.memory.write().await;
                    if let Some(phase) = memory.phase_mut(phase_id) {
                        phase.cancel();
                    }
                    return Ok(PhaseOutcome::Cancelled);
                }
                AttemptResult::Failed(reason) => {
                    let retry_count = {
                        let mut memory = self.memory.write().await;
                        memory.log_error(&reason, Some(phase_id), None);
                        let phase = memory
                            .phase_mut(phase_id)
                            .ok_or_else(|| BuildError::PhaseNotFound(phase_id.to_string()))?;
                        phase.fail(reason.clone());
                        phase.retry_count
                    };

                    if retry_count >= self.config.max_retries {
                        error!(phase = %phase_id, retries = retry_count, "phase failed permanently: {reason}");
                        let mut memory = self.memory.write().await;
                        memory.checkpoint(&format!("completed_{phase_id}"));
                        return Ok(PhaseOutcome::Failed);
                    }

                    // Linear back-off before the next attempt.
                    let retry_count = {
                        let mut memory = self.memory.write().await;
                        let phase = memory
                            .phase_mut(phase_id)
                            .ok_or_else(|| BuildError::PhaseNotFound(phase_id.to_string()))?;
                        phase.status = PhaseStatus::Retrying;
                        phase.retry_count += 1;
                        phase.retry_count
                    };
                    let delay =
                        Duration::from_secs(self.config.base_retry_delay_secs * u64::from(retry_count));
                    warn!(phase = %phase_id, retry = retry_count, delay_secs = delay.as_secs(), "retrying after back-off");
                    tokio::time::sleep(delay).await;

                    if self.interrupted() {
                        let mut memory = self.memory.write().await;
                        if let Some(phase) = memory.phase_mut(phase_id) {
                            phase.cancel();
                        }
                        return Ok(PhaseOutcome::Cancelled);
                    }
                }
            }
        }
    }

    /// One subprocess invocation for one phase attempt.
    async fn run_attempt(
        &self,
        index: usize,
        total: usize,
        phase_id: &str,
        attempt: u32,
    ) -> BuildResult<AttemptResult> {
        let known_files: HashSet<String> = {
            let memory = self.memory.read().await;
            memory.memory().created_files.iter().cloned().collect()
        };

        let (prompt, phase_name, allowed_tools) = self.prepare_invocation(index, total, phase_id, attempt).await?;

        if self.config.save_prompts {
            self.save_prompt(phase_id, &prompt);
        }

        let request = AgentRequest {
            prompt,
            model: self.config.model_executor.clone(),
            max_turns: self.config.max_turns,
            allowed_tools,
            mcp_config_path: {
                let path = self.output_dir.join(".mcp.json");
                path.exists().then_some(path)
            },
            output_format: if self.config.stream_output {
                OutputFormat::StreamJson
            } else {
                OutputFormat::Json
            },
            working_dir: self.output_dir.clone(),
            timeout: self.phase_timeout(&phase_name),
        };
        let timeout_secs = request.timeout.as_secs();

        let spinner = self.config.stream_output.then(|| {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{spinner} {msg}").expect("static template"),
            );
            bar.set_message(format!("phase {}/{}: {phase_name}", index + 1, total));
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        });

        let (tx, mut rx) = mpsc::channel::<String>(256);
        let classifier = EventClassifier::new(self.ledger.clone(), self.registry.clone());
        let invoke = self.invoker.invoke(request, tx, self.shutdown.clone());
        let consume = classifier.consume(phase_id, &mut rx);
        let (exit, run) = tokio::join!(invoke, consume);

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        let exit = exit?;
        Ok(self
            .evaluate_attempt(phase_id, timeout_secs, &known_files, exit, run)
            .await)
    }

    /// Compose the prompt and tool list under one memory read lock.
    async fn prepare_invocation(
        &self,
        index: usize,
        total: usize,
        phase_id: &str,
        attempt: u32,
    ) -> BuildResult<(String, String, Vec<String>)> {
        let memory = self.memory.read().await;
        let phase = memory
            .phase(phase_id)
            .ok_or_else(|| BuildError::PhaseNotFound(phase_id.to_string()))?;

        let mut selection_context: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        selection_context.insert("phase_id".to_string(), json!(phase.id));
        selection_context.insert("phase_name".to_string(), json!(phase.name));
        selection_context.insert("project_type".to_string(), json!(self.profile.project_type));
        selection_context.insert(
            "complexity".to_string(),
            json!(self.profile.complexity.to_string()),
        );
        let selected = self.instructions.select(&selection_context);

        let summary = memory.summary();
        let accumulated = memory.accumulated_context(phase_id);
        let prompt = self.composer.compose(&PromptInputs {
            phase,
            phase_index: index,
            total_phases: total,
            retry_attempt: attempt,
            specification: &self.spec,
            memory_summary: &summary,
            accumulated_context: &accumulated,
            created_files: &memory.memory().created_files,
            mcp_servers: &self.mcp_servers,
            instructions: &selected,
        });

        let registry = self.registry.read().await;
        let allowed_tools =
            self.gate
                .allowed_tools(&self.profile, phase, &selected, &registry, &self.mcp_servers);

        Ok((prompt, phase.name.clone(), allowed_tools))
    }

    /// Map the subprocess exit and classified run to an attempt result.
    async fn evaluate_attempt(
        &self,
        phase_id: &str,
        timeout_secs: u64,
        known_files: &HashSet<String>,
        exit: AgentExit,
        run: ClassifiedRun,
    ) -> AttemptResult {
        // Files already on disk are retained and listed even on failure.
        let mut files = run.files_created.clone();
        for file in scan_new_files(&self.output_dir, known_files) {
            if !files.contains(&file) {
                files.push(file);
            }
        }

        {
            let mut memory = self.memory.write().await;
            if let Some(phase) = memory.phase_mut(phase_id) {
                phase.files_created = files.clone();
                phase.tool_call_ids = run.tool_call_ids.clone();
                if let Some(summary) = &run.phase_summary {
                    phase.output_summary = Some(summary.clone());
                }
            }
        }

        match exit {
            AgentExit::Cancelled => AttemptResult::Cancelled,
            AgentExit::TimedOut => AttemptResult::Failed(format!(
                "phase timed out after {timeout_secs}s; partial files retained: {}",
                files.len()
            )),
            AgentExit::Completed { exit_code, stderr } if exit_code != 0 => {
                AttemptResult::Failed(format!(
                    "agent exited with code {exit_code}: {}",
                    stderr.trim()
                ))
            }
            AgentExit::Completed { .. } => {
                if let Some(error) = run.phase_error {
                    return AttemptResult::Failed(error);
                }

                // Success postconditions.
                if files.is_empty() {
                    return AttemptResult::Failed(
                        "phase produced no files".to_string(),
                    );
                }
                let Some(summary) = run.phase_summary else {
                    return AttemptResult::Failed(
                        "phase ended without a result summary".to_string(),
                    );
                };

                let mut memory = self.memory.write().await;
                if let Some(phase) = memory.phase_mut(phase_id) {
                    phase.succeed(summary.clone());
                }
                let mut exported: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                exported.insert(format!("{phase_id}_summary"), json!(summary));
                if !files.is_empty() {
                    exported.insert(format!("{phase_id}_files"), json!(files));
                }
                if let Err(e) = memory.mark_completed(phase_id, exported) {
                    warn!(phase = %phase_id, error = %e, "failed to record completion");
                }
                AttemptResult::Success
            }
        }
    }

    async fn unsatisfied_dependency(&self, phase_id: &str) -> Option<String> {
        let memory = self.memory.read().await;
        let phase = memory.phase(phase_id)?;
        for dep in &phase.dependencies {
            let ok = memory
                .phase(dep)
                .is_some_and(|d| d.status == PhaseStatus::Success);
            if !ok {
                return Some(dep.clone());
            }
        }
        None
    }

    async fn finish_interrupted(
        &self,
        phases_run: usize,
        phases_failed: usize,
        phases_skipped: usize,
    ) -> BuildOutcome {
        warn!("interrupt received; writing checkpoint and stopping");
        let mut memory = self.memory.write().await;
        memory.log_error("build interrupted", None, None);
        memory.checkpoint("interrupted");
        BuildOutcome {
            success: false,
            exit_code: EXIT_INTERRUPTED,
            phases_run,
            phases_failed,
            phases_skipped,
            interrupted: true,
        }
    }

    async fn fail_build(&self, reason: &str, phase_id: Option<&str>) {
        error!(phase = ?phase_id, "build failed: {reason}");
        let mut memory = self.memory.write().await;
        memory.log_error(reason, phase_id, None);
        memory.checkpoint("failed");
    }

    fn phase_timeout(&self, phase_name: &str) -> Duration {
        let base = self.config.phase_timeout_secs;
        let pattern = Regex::new(EXTENDED_TIMEOUT_PATTERN).expect("static pattern");
        if pattern.is_match(phase_name) {
            Duration::from_secs_f64(base as f64 * 1.5)
        } else {
            Duration::from_secs(base)
        }
    }

    fn save_prompt(&self, phase_id: &str, prompt: &str) {
        let dir = self.output_dir.join(".prompts");
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(error = %e, "failed to create prompts directory");
            return;
        }
        let path = dir.join(format!("{phase_id}_{}.md", Utc::now().timestamp()));
        if let Err(e) = std::fs::write(&path, prompt) {
            warn!(error = %e, path = %path.display(), "failed to save prompt");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttemptResult {
    Success,
    Failed(String),
    Cancelled,
}

/// Files under the project dir (relative paths) that are not yet known.
/// Dot-directories (.memory, .prompts, .git, ...) are ignored.
fn scan_new_files(root: &Path, known: &HashSet<String>) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            if path.is_dir() {
                stack.push(path);
            } else if let Ok(relative) = path.strip_prefix(root) {
                let relative = relative.display().to_string();
                if !known.contains(&relative) {
                    found.push(relative);
                }
            }
        }
    }
    found.sort();
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_new_files_skips_dot_dirs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::create_dir_all(dir.path().join(".memory")).unwrap();
        std::fs::write(dir.path().join("src/main.go"), "package main").unwrap();
        std::fs::write(dir.path().join(".memory/x.json"), "{}").unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();

        let known: HashSet<String> = ["README.md".to_string()].into_iter().collect();
        let found = scan_new_files(dir.path(), &known);
        assert_eq!(found, vec!["src/main.go".to_string()]);
    }

    #[test]
    fn test_phase_timeout_multiplier() {
        let config = BuildConfig {
            phase_timeout_secs: 600,
            ..BuildConfig::default()
        };
        let scheduler = scheduler_with(config);
        assert_eq!(scheduler.phase_timeout("Foundation"), Duration::from_secs(600));
        assert_eq!(scheduler.phase_timeout("Integration Testing"), Duration::from_secs(900));
        assert_eq!(scheduler.phase_timeout("Deployment"), Duration::from_secs(900));
        assert_eq!(scheduler.phase_timeout("Performance optimization"), Duration::from_secs(900));
    }

    fn scheduler_with(config: BuildConfig) -> BuildScheduler {
        struct NoopInvoker;
        #[async_trait::async_trait]
        impl AgentInvoker for NoopInvoker {
            async fn invoke(
                &self,
                _request: AgentRequest,
                _lines: mpsc::Sender<String>,
                _shutdown: watch::Receiver<bool>,
            ) -> BuildResult<AgentExit> {
                Ok(AgentExit::Completed {
                    exit_code: 0,
                    stderr: String::new(),
                })
            }
        }

        let spec = Specification::new("spec");
        BuildScheduler::new(
            config,
            spec.clone(),
            ProjectProfile::default(),
            Arc::new(NoopInvoker),
            Arc::new(RwLock::new(CostLedger::new())),
            Arc::new(RwLock::new(ToolRegistry::default())),
            Arc::new(RwLock::new(MemoryStore::new("demo", spec.content_hash))),
            std::env::temp_dir(),
        )
    }
}
