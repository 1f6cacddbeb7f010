//! Build report assembly for external collaborators.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::BuildResult;
use crate::domain::models::{round_display, BuildMemory, Phase};
use crate::services::cost_ledger::CostSummary;
use crate::services::tool_registry::RegistryStatistics;

/// Per-phase row of the final report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseReport {
    pub id: String,
    pub name: String,
    pub status: String,
    pub duration_secs: Option<f64>,
    pub retry_count: u32,
    pub files_created: usize,
    pub summary: Option<String>,
    pub error: Option<String>,
}

/// The final build report, serialized as JSON and rendered as markdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildReport {
    pub project_name: String,
    pub build_id: String,
    pub generated_at: DateTime<Utc>,
    pub success: bool,
    pub phases: Vec<PhaseReport>,
    pub created_files: Vec<String>,
    pub cost: CostSummary,
    pub tools: RegistryStatistics,
}

impl BuildReport {
    pub fn assemble(
        memory: &BuildMemory,
        cost: CostSummary,
        tools: RegistryStatistics,
        success: bool,
    ) -> Self {
        let phases = memory
            .phases
            .iter()
            .map(|p| PhaseReport {
                id: p.id.clone(),
                name: p.name.clone(),
                status: p.status.to_string(),
                duration_secs: p.duration_secs(),
                retry_count: p.retry_count,
                files_created: p.files_created.len(),
                summary: p.output_summary.clone(),
                error: p.error.clone(),
            })
            .collect();

        Self {
            project_name: memory.project_name.clone(),
            build_id: memory.build_id.clone(),
            generated_at: Utc::now(),
            success,
            phases,
            created_files: memory.created_files.clone(),
            cost,
            tools,
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# Build Report: {}", self.project_name);
        let _ = writeln!(out, "\n- Build id: {}", self.build_id);
        let _ = writeln!(
            out,
            "- Outcome: {}",
            if self.success { "success" } else { "failure" }
        );
        let _ = writeln!(out, "- Total cost: ${:.4}", self.cost.display_total());
        let _ = writeln!(out, "- Files created: {}", self.created_files.len());

        out.push_str("\n## Phases\n\n");
        out.push_str("| Phase | Status | Duration | Retries | Files |\n");
        out.push_str("|---|---|---|---|---|\n");
        for phase in &self.phases {
            let duration = phase
                .duration_secs
                .map_or_else(|| "-".to_string(), |d| format!("{d:.1}s"));
            let _ = writeln!(
                out,
                "| {} | {} | {} | {} | {} |",
                phase.name, phase.status, duration, phase.retry_count, phase.files_created
            );
        }

        if !self.cost.cost_by_phase.is_empty() {
            out.push_str("\n## Cost by phase\n\n");
            for (phase, cost) in &self.cost.cost_by_phase {
                let _ = writeln!(out, "- {phase}: ${:.4}", round_display(*cost));
            }
        }

        if !self.tools.problem_tools.is_empty() {
            out.push_str("\n## Problem tools\n\n");
            for tool in &self.tools.problem_tools {
                let _ = writeln!(out, "- {tool}");
            }
        }

        out
    }
}

/// The commit message handed to the git collaborator for one phase.
pub fn phase_commit_message(phase: &Phase, phase_cost: f64) -> String {
    format!(
        "Phase {}: {}\n\nStatus: {}\nDuration: {:.1}s\nFiles: {}\nCost: ${:.4}",
        phase.id,
        phase.name,
        phase.status,
        phase.duration_secs().unwrap_or(0.0),
        phase.files_created.len(),
        round_display(phase_cost),
    )
}

/// Write the per-build analytics dump to `<dir>/build_stats_<ts>.json`.
pub fn write_analytics(report: &BuildReport, dir: &Path) -> BuildResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("build_stats_{}.json", Utc::now().timestamp()));
    std::fs::write(&path, serde_json::to_string_pretty(report)?)?;
    Ok(path)
}
