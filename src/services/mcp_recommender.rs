//! MCP server discovery and recommendation.
//!
//! Matches the catalog of known helper servers against the project
//! profile, preferring servers that are already installed.

use std::collections::BTreeMap;

use tracing::debug;

use crate::domain::models::{ComplexityTier, McpServerInfo, ProjectProfile};

/// Predicate deciding whether a catalog entry fits a profile.
type ProfilePredicate = fn(&ProjectProfile) -> bool;

struct CatalogEntry {
    name: &'static str,
    command: &'static str,
    args: &'static [&'static str],
    category: &'static str,
    tools: &'static [&'static str],
    fits: ProfilePredicate,
}

/// Known helper servers, most broadly useful first.
const CATALOG: &[CatalogEntry] = &[
    CatalogEntry {
        name: "memory",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-memory"],
        category: "memory",
        tools: &["create_entities", "search_nodes", "read_graph"],
        fits: |_| true,
    },
    CatalogEntry {
        name: "filesystem",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-filesystem", "${workspace}"],
        category: "files",
        tools: &["read_file", "write_file", "list_directory"],
        fits: |_| true,
    },
    CatalogEntry {
        name: "sequential-thinking",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-sequential-thinking"],
        category: "planning",
        tools: &["sequentialthinking"],
        fits: |p| p.complexity >= ComplexityTier::Medium,
    },
    CatalogEntry {
        name: "github",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-github"],
        category: "source-control",
        tools: &["create_repository", "push_files", "create_pull_request"],
        fits: |p| p.has_requirement("deployment"),
    },
    CatalogEntry {
        name: "postgres",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-postgres", "${DATABASE_URL}"],
        category: "database",
        tools: &["query"],
        fits: |p| p.has_technology("postgres"),
    },
    CatalogEntry {
        name: "sqlite",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-sqlite", "${workspace}/data.db"],
        category: "database",
        tools: &["query", "list_tables"],
        fits: |p| p.has_technology("sqlite"),
    },
    CatalogEntry {
        name: "fetch",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-fetch"],
        category: "web",
        tools: &["fetch"],
        fits: |p| p.has_requirement("api") || p.project_type == "web_app",
    },
    CatalogEntry {
        name: "puppeteer",
        command: "npx",
        args: &["-y", "@modelcontextprotocol/server-puppeteer"],
        category: "web",
        tools: &["navigate", "screenshot"],
        fits: |p| p.project_type == "web_app" && p.has_requirement("ui"),
    },
];

/// Recommend servers for a profile.
///
/// Already-installed servers that fit come first, then the remaining
/// fitting catalog entries, capped at `max_servers`.
pub fn recommend(
    profile: &ProjectProfile,
    installed: &[String],
    max_servers: usize,
) -> Vec<McpServerInfo> {
    let fitting: Vec<&CatalogEntry> = CATALOG.iter().filter(|e| (e.fits)(profile)).collect();

    let mut ordered: Vec<&CatalogEntry> = Vec::new();
    for entry in &fitting {
        if installed.iter().any(|i| i == entry.name) {
            ordered.push(entry);
        }
    }
    for entry in &fitting {
        if !ordered.iter().any(|e| e.name == entry.name) {
            ordered.push(entry);
        }
    }

    let selected: Vec<McpServerInfo> = ordered
        .into_iter()
        .take(max_servers)
        .map(|entry| McpServerInfo {
            name: entry.name.to_string(),
            command: entry.command.to_string(),
            args: entry.args.iter().map(|s| (*s).to_string()).collect(),
            env: BTreeMap::new(),
            category: entry.category.to_string(),
            tools: entry.tools.iter().map(|s| (*s).to_string()).collect(),
        })
        .collect();

    debug!(
        recommended = selected.len(),
        installed = installed.len(),
        "MCP recommendation complete"
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(complexity: ComplexityTier, techs: &[&str], reqs: &[&str]) -> ProjectProfile {
        let mut profile = ProjectProfile {
            complexity,
            ..ProjectProfile::default()
        };
        for t in techs {
            profile.technologies.insert((*t).to_string());
        }
        for r in reqs {
            profile.requirements.insert((*r).to_string());
        }
        profile
    }

    #[test]
    fn test_baseline_servers_always_recommended() {
        let servers = recommend(&profile(ComplexityTier::Low, &[], &[]), &[], 10);
        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"memory"));
        assert!(names.contains(&"filesystem"));
        assert!(!names.contains(&"postgres"));
        assert!(!names.contains(&"sequential-thinking"));
    }

    #[test]
    fn test_profile_gated_servers() {
        let servers = recommend(
            &profile(ComplexityTier::High, &["postgres"], &["deployment"]),
            &[],
            10,
        );
        let names: Vec<&str> = servers.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"postgres"));
        assert!(names.contains(&"github"));
        assert!(names.contains(&"sequential-thinking"));
    }

    #[test]
    fn test_installed_servers_rank_first() {
        let servers = recommend(
            &profile(ComplexityTier::Medium, &[], &[]),
            &["sequential-thinking".to_string()],
            10,
        );
        assert_eq!(servers[0].name, "sequential-thinking");
    }

    #[test]
    fn test_max_servers_cap() {
        let servers = recommend(
            &profile(ComplexityTier::High, &["postgres", "sqlite"], &["deployment", "api"]),
            &[],
            2,
        );
        assert_eq!(servers.len(), 2);
    }
}
