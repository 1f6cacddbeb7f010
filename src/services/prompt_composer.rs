//! Prompt composition for agent phase invocations.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde_json::Value;

use crate::domain::models::{Instruction, McpServerInfo, Phase, Specification};
use crate::services::build_memory::MemorySummary;

/// Maximum characters of specification text included after the first phase.
const SPEC_SUMMARY_LIMIT: usize = 2_000;

/// Context keys elided from the accumulated-context section to bound size.
const ELIDED_CONTEXT_KEYS: &[&str] = &["specification", "research_results"];

/// Behavioral constraints appended to every phase prompt.
const HARD_REQUIREMENTS: &[&str] = &[
    "Produce production-quality code; no placeholders, stubs, or TODO-only bodies.",
    "Every file you reference must actually be created or modified on disk.",
    "Use the memory and planning tools when they are available.",
    "Prefer validating against real data and real invocations over synthetic unit scaffolding.",
    "Keep changes consistent with files created in earlier phases.",
    "Report errors honestly; do not claim success for work you did not do.",
];

/// Inputs for composing one phase prompt.
pub struct PromptInputs<'a> {
    pub phase: &'a Phase,
    /// Zero-based position in the plan.
    pub phase_index: usize,
    pub total_phases: usize,
    pub retry_attempt: u32,
    pub specification: &'a Specification,
    pub memory_summary: &'a MemorySummary,
    pub accumulated_context: &'a BTreeMap<String, Value>,
    pub created_files: &'a [String],
    pub mcp_servers: &'a [McpServerInfo],
    pub instructions: &'a [&'a Instruction],
}

/// Builds the full prompt for a phase invocation.
#[derive(Debug, Default)]
pub struct PromptComposer;

impl PromptComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, inputs: &PromptInputs<'_>) -> String {
        let mut prompt = String::new();

        // 1. Header
        let _ = writeln!(
            prompt,
            "# Phase {}/{}: {}",
            inputs.phase_index + 1,
            inputs.total_phases,
            inputs.phase.name
        );
        let _ = writeln!(prompt, "\n{}", inputs.phase.description);
        if inputs.retry_attempt > 0 {
            let _ = writeln!(
                prompt,
                "\nThis is retry attempt {} for this phase. Review prior errors and correct course.",
                inputs.retry_attempt
            );
        }

        // 2. Project memory
        prompt.push_str("\n## Project Memory\n\n");
        prompt.push_str(&render_memory(inputs.memory_summary));

        // 3. MCP summary
        if !inputs.mcp_servers.is_empty() {
            prompt.push_str("\n## Available MCP Servers\n\n");
            prompt.push_str(&render_mcp_servers(inputs.mcp_servers));
        }

        // 4. Applicable instructions
        if !inputs.instructions.is_empty() {
            prompt.push_str("\n## Instructions\n\n");
            for instruction in inputs.instructions {
                prompt.push_str(&instruction.body);
                prompt.push_str("\n\n");
            }
        }

        // 5. Specification
        prompt.push_str("\n## Specification\n\n");
        if inputs.phase_index == 0 {
            prompt.push_str(&inputs.specification.text);
            prompt.push('\n');
        } else {
            prompt.push_str(&inputs.specification.summary(SPEC_SUMMARY_LIMIT));
            let _ = writeln!(
                prompt,
                "\n\n(The full specification was provided in phase 1; consult the accumulated context.)"
            );
        }

        // 6. Phase tasks
        prompt.push_str("\n## Tasks\n\n");
        for (i, task) in inputs.phase.tasks.iter().enumerate() {
            let _ = writeln!(prompt, "{}. {}", i + 1, task);
        }

        // 7. Accumulated context
        prompt.push_str("\n## Context From Earlier Phases\n\n");
        prompt.push_str(&render_context(inputs.accumulated_context));
        if !inputs.created_files.is_empty() {
            prompt.push_str("\nFiles created so far, by directory:\n");
            prompt.push_str(&render_files_by_directory(inputs.created_files));
        }

        // 8. Hard requirements
        prompt.push_str("\n## Hard Requirements\n\n");
        for requirement in HARD_REQUIREMENTS {
            let _ = writeln!(prompt, "- {requirement}");
        }

        prompt
    }
}

fn render_memory(summary: &MemorySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "- Progress: {}/{} phases complete ({:.0}%)",
        summary.completed_phases,
        summary.total_phases,
        summary.completion_ratio * 100.0
    );
    if !summary.technology_stack.is_empty() {
        let _ = writeln!(out, "- Technology stack: {}", summary.technology_stack.join(", "));
    }
    if !summary.recent_decisions.is_empty() {
        out.push_str("- Recent decisions:\n");
        for decision in &summary.recent_decisions {
            let _ = writeln!(out, "  - {decision}");
        }
    }
    if !summary.file_type_histogram.is_empty() {
        let histogram: Vec<String> = summary
            .file_type_histogram
            .iter()
            .map(|(ext, count)| format!("{ext}: {count}"))
            .collect();
        let _ = writeln!(out, "- Files by type: {}", histogram.join(", "));
    }
    let _ = writeln!(
        out,
        "- Research findings available: {}",
        if summary.research_available { "yes" } else { "no" }
    );
    out
}

fn render_mcp_servers(servers: &[McpServerInfo]) -> String {
    let mut by_category: BTreeMap<&str, Vec<&McpServerInfo>> = BTreeMap::new();
    for server in servers {
        let category = if server.category.is_empty() {
            "general"
        } else {
            server.category.as_str()
        };
        by_category.entry(category).or_default().push(server);
    }

    let mut out = String::new();
    for (category, group) in by_category {
        let _ = writeln!(out, "### {category}");
        for server in group {
            let _ = writeln!(out, "- {} ({})", server.name, server.tool_pattern());
        }
    }
    out
}

fn render_context(context: &BTreeMap<String, Value>) -> String {
    let mut out = String::new();
    let mut rendered_any = false;
    for (key, value) in context {
        if ELIDED_CONTEXT_KEYS.contains(&key.as_str()) {
            continue;
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let _ = writeln!(out, "- {key}: {rendered}");
        rendered_any = true;
    }
    if !rendered_any {
        out.push_str("(none yet)\n");
    }
    out
}

fn render_files_by_directory(files: &[String]) -> String {
    let mut by_dir: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in files {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or_else(|| ".".to_string(), |p| p.display().to_string());
        let name = path
            .file_name()
            .map_or_else(|| file.clone(), |n| n.to_string_lossy().to_string());
        by_dir.entry(dir).or_default().push(name);
    }

    let mut out = String::new();
    for (dir, names) in by_dir {
        let _ = writeln!(out, "- {dir}/: {}", names.join(", "));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> MemorySummary {
        MemorySummary {
            project_name: "demo".to_string(),
            total_phases: 2,
            completed_phases: 1,
            completion_ratio: 0.5,
            ..MemorySummary::default()
        }
    }

    fn inputs<'a>(
        phase: &'a Phase,
        spec: &'a Specification,
        mem: &'a MemorySummary,
        ctx: &'a BTreeMap<String, Value>,
        index: usize,
    ) -> PromptInputs<'a> {
        PromptInputs {
            phase,
            phase_index: index,
            total_phases: 2,
            retry_attempt: 0,
            specification: spec,
            memory_summary: mem,
            accumulated_context: ctx,
            created_files: &[],
            mcp_servers: &[],
            instructions: &[],
        }
    }

    #[test]
    fn test_first_phase_gets_full_spec() {
        let spec = Specification::new("FULL SPEC ".repeat(500));
        let phase = Phase::new("phase_1", "Foundation", "set up")
            .with_tasks(vec!["init module".to_string()]);
        let mem = summary();
        let ctx = BTreeMap::new();

        let prompt = PromptComposer::new().compose(&inputs(&phase, &spec, &mem, &ctx, 0));
        assert!(prompt.contains(&spec.text));
        assert!(prompt.contains("1. init module"));
    }

    #[test]
    fn test_later_phase_gets_bounded_summary() {
        let spec = Specification::new("FULL SPEC ".repeat(500));
        let phase = Phase::new("phase_2", "Data", "models");
        let mem = summary();
        let ctx = BTreeMap::new();

        let prompt = PromptComposer::new().compose(&inputs(&phase, &spec, &mem, &ctx, 1));
        assert!(!prompt.contains(&spec.text), "full spec elided");
        assert!(prompt.contains("provided in phase 1"));
    }

    #[test]
    fn test_context_elides_oversized_keys() {
        let spec = Specification::new("spec");
        let phase = Phase::new("phase_2", "Data", "");
        let mem = summary();
        let mut ctx = BTreeMap::new();
        ctx.insert("specification".to_string(), Value::String("huge".to_string()));
        ctx.insert("research_results".to_string(), Value::String("huge".to_string()));
        ctx.insert("api_port".to_string(), Value::from(8080));

        let prompt = PromptComposer::new().compose(&inputs(&phase, &spec, &mem, &ctx, 1));
        assert!(prompt.contains("api_port: 8080"));
        assert!(!prompt.contains("- specification:"));
        assert!(!prompt.contains("- research_results:"));
    }

    #[test]
    fn test_retry_header() {
        let spec = Specification::new("spec");
        let phase = Phase::new("phase_1", "Foundation", "");
        let mem = summary();
        let ctx = BTreeMap::new();
        let mut i = inputs(&phase, &spec, &mem, &ctx, 0);
        i.retry_attempt = 2;

        let prompt = PromptComposer::new().compose(&i);
        assert!(prompt.contains("retry attempt 2"));
    }

    #[test]
    fn test_files_grouped_by_directory() {
        let files = vec![
            "src/main.go".to_string(),
            "src/util.go".to_string(),
            "README.md".to_string(),
        ];
        let rendered = render_files_by_directory(&files);
        assert!(rendered.contains("- src/: main.go, util.go"));
        assert!(rendered.contains("- ./: README.md"));
    }

    #[test]
    fn test_hard_requirements_present() {
        let spec = Specification::new("spec");
        let phase = Phase::new("phase_1", "Foundation", "");
        let mem = summary();
        let ctx = BTreeMap::new();
        let prompt = PromptComposer::new().compose(&inputs(&phase, &spec, &mem, &ctx, 0));
        assert!(prompt.contains("## Hard Requirements"));
        assert!(prompt.contains("production-quality"));
    }
}
