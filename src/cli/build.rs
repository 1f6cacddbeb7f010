//! The `build`, `plan`, and `research` command handlers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};

use crate::cli::display;
use crate::domain::models::{BuildConfig, Instruction, ResearchResults, Specification};
use crate::domain::ports::LlmClient;
use crate::infrastructure::agent::AgentCliDriver;
use crate::infrastructure::llm::{AnthropicClient, AnthropicClientConfig};
use crate::infrastructure::mcp;
use crate::services::report::{write_analytics, BuildReport};
use crate::services::scheduler::EXIT_INTERRUPTED;
use crate::services::{
    mcp_recommender, spec_analyzer, BuildScheduler, CostLedger, InstructionSet, MemoryStore,
    PhasePlanner, ResearchCoordinator, ToolRegistry,
};

/// Run a full build. Returns the process exit code.
pub async fn handle_build(
    config: BuildConfig,
    spec_path: &Path,
    output_dir: PathBuf,
    fresh: bool,
    json_output: bool,
) -> Result<i32> {
    let spec = Specification::load(spec_path)
        .with_context(|| format!("failed to load specification {}", spec_path.display()))?;
    let profile = spec_analyzer::analyze(&spec);
    info!(
        project_type = %profile.project_type,
        complexity = %profile.complexity,
        "specification analyzed"
    );

    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("failed to create {}", output_dir.display()))?;
    let memory_dir = output_dir.join(".memory");

    let project_name = output_dir
        .file_name()
        .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().to_string());

    // Resume only from a snapshot of the same specification.
    let mut store = if fresh {
        MemoryStore::new(&project_name, &spec.content_hash)
    } else {
        match MemoryStore::load_latest(&memory_dir) {
            Ok(loaded) if loaded.memory().specification_hash == spec.content_hash => {
                info!(
                    completed = loaded.memory().completed_phases.len(),
                    "resuming from snapshot"
                );
                loaded
            }
            Ok(_) => {
                warn!("snapshot belongs to a different specification; starting fresh");
                MemoryStore::new(&project_name, &spec.content_hash)
            }
            Err(_) => MemoryStore::new(&project_name, &spec.content_hash),
        }
    };
    store = store
        .with_snapshot_dir(&memory_dir)
        .with_retention(config.checkpoint_retention);

    let ledger = Arc::new(RwLock::new(CostLedger::new()));
    let registry = Arc::new(RwLock::new(ToolRegistry::default()));

    let llm: Option<Arc<dyn LlmClient>> = match AnthropicClientConfig::from_env() {
        Ok(llm_config) => Some(Arc::new(AnthropicClient::new(llm_config)?)),
        Err(e) => {
            warn!(error = %e, "LLM API unavailable; planner falls back to the default template");
            None
        }
    };

    // Research pass, unless a prior run already produced findings.
    let research: Option<ResearchResults> =
        if config.research_enabled && !store.memory().context.contains_key("research_results") {
            if let Some(llm) = &llm {
                let coordinator = ResearchCoordinator::new(
                    llm.clone(),
                    config.model_research.clone(),
                    ledger.clone(),
                )
                .with_dump_dir(output_dir.join(".research"));
                let results = coordinator.run(&profile).await;
                store.set_context_value("research_results", json!(results));
                store.record_decision(
                    format!(
                        "research completed: {} findings across {} queries",
                        results.findings.len(),
                        results.queries.len()
                    ),
                    None,
                    None,
                );
                Some(results)
            } else {
                None
            }
        } else {
            store
                .memory()
                .context
                .get("research_results")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
        };

    // Plan, unless resuming an already-planned build.
    if store.memory().phases.is_empty() {
        let planner = PhasePlanner::new(llm.clone(), config.clone(), ledger.clone());
        let plan = planner.plan(&spec, &profile, research.as_ref()).await?;
        store.install_plan(&plan);
        store.record_decision(
            format!("plan created with {} phases", plan.len()),
            None,
            None,
        );
    }

    // MCP discovery and configuration.
    let mcp_servers = if config.mcp_discovery_enabled {
        let installed = mcp::installed_server_names(&output_dir);
        let recommended = mcp_recommender::recommend(&profile, &installed, 10);
        if let Err(e) = mcp::write_config(&recommended, &output_dir) {
            warn!(error = %e, "failed to write .mcp.json");
        }
        recommended
    } else {
        Vec::new()
    };

    let phase_count = store.memory().phases.len();
    let question = format!(
        "Execute {phase_count} phases with agent '{}'?",
        config.agent_binary
    );
    if !confirm(&config, &question) {
        println!("aborted");
        return Ok(1);
    }

    let memory = Arc::new(RwLock::new(store));
    let shutdown = spawn_signal_handler(memory.clone());

    let invoker = Arc::new(AgentCliDriver::new(config.agent_binary.clone()));
    let scheduler = BuildScheduler::new(
        config,
        spec,
        profile,
        invoker,
        ledger.clone(),
        registry.clone(),
        memory.clone(),
        output_dir.clone(),
    )
    .with_instructions(load_instructions())
    .with_mcp_servers(mcp_servers)
    .with_shutdown(shutdown);

    let outcome = scheduler.run().await?;

    // Final report and analytics.
    let report = {
        let memory = memory.read().await;
        let ledger = ledger.read().await;
        let registry = registry.read().await;
        BuildReport::assemble(
            memory.memory(),
            ledger.summary(),
            registry.statistics(),
            outcome.success,
        )
    };
    if let Err(e) = write_analytics(&report, &output_dir.join(".analytics")) {
        warn!(error = %e, "failed to write analytics");
    }
    if let Err(e) = std::fs::write(output_dir.join("BUILD_REPORT.md"), report.to_markdown()) {
        warn!(error = %e, "failed to write markdown report");
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", display::phase_table(&report));
        println!("{}", display::cost_breakdown_table(&*ledger.read().await));
        println!("{}", display::verdict_line(&report));
    }

    Ok(outcome.exit_code)
}

/// Print the plan without building.
pub async fn handle_plan(config: BuildConfig, spec_path: &Path, json_output: bool) -> Result<i32> {
    let spec = Specification::load(spec_path)?;
    let profile = spec_analyzer::analyze(&spec);
    let ledger = Arc::new(RwLock::new(CostLedger::new()));

    let llm: Option<Arc<dyn LlmClient>> = AnthropicClientConfig::from_env()
        .ok()
        .and_then(|c| AnthropicClient::new(c).ok().map(|c| Arc::new(c) as Arc<dyn LlmClient>));
    let planner = PhasePlanner::new(llm, config, ledger);
    let plan = planner.plan(&spec, &profile, None).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        for (i, phase) in plan.phases.iter().enumerate() {
            println!("{}. {} [{}]", i + 1, phase.name, phase.id);
            for task in &phase.tasks {
                println!("   - {task}");
            }
            if !phase.dependencies.is_empty() {
                println!("   depends on: {}", phase.dependencies.join(", "));
            }
        }
    }
    Ok(0)
}

/// Run only the research pass.
pub async fn handle_research(
    config: BuildConfig,
    spec_path: &Path,
    output_dir: PathBuf,
    json_output: bool,
) -> Result<i32> {
    let spec = Specification::load(spec_path)?;
    let profile = spec_analyzer::analyze(&spec);
    let ledger = Arc::new(RwLock::new(CostLedger::new()));

    let llm_config = AnthropicClientConfig::from_env()
        .context("research requires ANTHROPIC_API_KEY")?;
    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(llm_config)?);
    let coordinator = ResearchCoordinator::new(llm, config.model_research.clone(), ledger)
        .with_dump_dir(output_dir.join(".research"));

    let results = coordinator.run(&profile).await;
    if json_output {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        println!("{}", results.synthesis.executive_summary);
        for rec in &results.synthesis.prioritized_recommendations {
            println!("- {rec}");
        }
    }
    Ok(0)
}

/// Operator instructions from `.specforge/instructions.yaml`, if present.
fn load_instructions() -> InstructionSet {
    let path = Path::new(".specforge/instructions.yaml");
    let Ok(contents) = std::fs::read_to_string(path) else {
        return InstructionSet::default();
    };
    match serde_yaml::from_str::<Vec<Instruction>>(&contents) {
        Ok(instructions) => {
            info!(count = instructions.len(), "loaded operator instructions");
            InstructionSet::new(instructions)
        }
        Err(e) => {
            warn!(error = %e, "ignoring malformed instructions file");
            InstructionSet::default()
        }
    }
}

/// First signal requests a graceful stop; the second forces an emergency
/// checkpoint and immediate exit.
fn spawn_signal_handler(memory: Arc<RwLock<MemoryStore>>) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let mut signals_seen = 0u32;
        loop {
            wait_for_signal().await;
            signals_seen += 1;
            if signals_seen == 1 {
                warn!("interrupt received; finishing at the next safe point (again to force)");
                let _ = tx.send(true);
            } else {
                warn!("second interrupt; writing emergency checkpoint and exiting");
                memory.write().await.checkpoint("emergency_shutdown");
                std::process::exit(EXIT_INTERRUPTED);
            }
        }
    });

    rx
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");
    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

/// Non-interactive confirmation gate.
///
/// With `auto_confirm` the question is logged and accepted.
pub fn confirm(config: &BuildConfig, question: &str) -> bool {
    if config.auto_confirm {
        info!(question, "auto-confirmed");
        return true;
    }
    use std::io::Write;
    print!("{question} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
