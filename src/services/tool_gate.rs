//! Tool gate: computes the tools the agent may invoke for a phase.
//!
//! The output is deterministic for a fixed (profile, phase, registry
//! state) triple.

use regex::Regex;

use crate::domain::models::{Instruction, McpServerInfo, Phase, ProjectProfile};
use crate::services::tool_registry::ToolRegistry;

/// Always-available editor, file, and directory primitives.
const CORE_TOOLS: &[&str] = &["Read", "Write", "Edit", "MultiEdit", "Glob", "Grep", "LS"];

/// Shell primitives enabled for phases whose name suggests command work.
const SHELL_TOOLS: &[&str] = &["Bash"];

const SHELL_PHASE_PATTERN: &str = r"(?i)deploy|test|build|setup|install|run";

/// Per-technology toolchains added for matching profile tags.
const TECH_TOOLCHAINS: &[(&str, &[&str])] = &[
    ("python", &["python", "pip", "pytest", "black", "mypy"]),
    ("rust", &["cargo", "rustc", "clippy", "rustfmt"]),
    ("go", &["go", "gofmt", "golangci-lint"]),
    ("javascript", &["node", "npm", "npx", "eslint", "jest"]),
    ("typescript", &["node", "npm", "npx", "tsc", "eslint"]),
    ("docker", &["docker", "docker-compose"]),
    ("postgres", &["psql"]),
    ("mysql", &["mysql"]),
    ("redis", &["redis-cli"]),
];

/// Names never dropped for poor historical success.
const PROTECTED_NAME_MARKERS: &[&str] = &["create", "write", "edit", "mcp__memory"];

/// Gate behavior knobs.
#[derive(Debug, Clone)]
pub struct ToolGateConfig {
    /// Drop tools whose historical success rate is below the floor.
    pub drop_low_success_tools: bool,
    pub success_rate_floor: f64,
}

impl Default for ToolGateConfig {
    fn default() -> Self {
        Self {
            drop_low_success_tools: false,
            success_rate_floor: 0.3,
        }
    }
}

/// Computes allowed-tool lists.
#[derive(Debug, Default)]
pub struct ToolGate {
    config: ToolGateConfig,
}

impl ToolGate {
    pub fn new(config: ToolGateConfig) -> Self {
        Self { config }
    }

    /// The ordered list of tool names the agent may use for this phase.
    pub fn allowed_tools(
        &self,
        profile: &ProjectProfile,
        phase: &Phase,
        instructions: &[&Instruction],
        registry: &ToolRegistry,
        mcp_servers: &[McpServerInfo],
    ) -> Vec<String> {
        let mut tools: Vec<String> = Vec::new();
        let mut push = |name: String, tools: &mut Vec<String>| {
            if !tools.contains(&name) {
                tools.push(name);
            }
        };

        for name in CORE_TOOLS {
            push((*name).to_string(), &mut tools);
        }

        let shell_pattern = Regex::new(SHELL_PHASE_PATTERN).expect("static pattern");
        if shell_pattern.is_match(&phase.name) {
            for name in SHELL_TOOLS {
                push((*name).to_string(), &mut tools);
            }
        }

        for (tag, toolchain) in TECH_TOOLCHAINS {
            if profile.has_technology(tag) {
                for name in *toolchain {
                    push((*name).to_string(), &mut tools);
                }
            }
        }

        for server in mcp_servers {
            push(server.tool_pattern(), &mut tools);
            for tool in server.qualified_tools() {
                push(tool, &mut tools);
            }
        }

        for instruction in instructions {
            for name in &instruction.required_tools {
                push(name.clone(), &mut tools);
            }
        }
        for instruction in instructions {
            for name in &instruction.restricted_tools {
                tools.retain(|t| t != name);
            }
        }

        tools.retain(|name| !registry.is_disabled(name));

        // Stable sort keeps the construction order for tools never used.
        tools.sort_by_key(|name| std::cmp::Reverse(registry.usage_count(name)));

        if self.config.drop_low_success_tools {
            tools.retain(|name| {
                if is_protected(name) {
                    return true;
                }
                registry
                    .success_rate(name)
                    .is_none_or(|rate| rate >= self.config.success_rate_floor)
            });
        }

        tools
    }
}

fn is_protected(name: &str) -> bool {
    let lower = name.to_lowercase();
    PROTECTED_NAME_MARKERS.iter().any(|m| lower.contains(m))
}
