//! `.mcp.json` reading and writing with template substitution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::domain::errors::BuildResult;
use crate::domain::models::McpServerInfo;

/// One server entry in `.mcp.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct McpServerSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// The `.mcp.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfigFile {
    #[serde(rename = "mcpServers")]
    pub mcp_servers: BTreeMap<String, McpServerSpec>,
    pub version: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Write `.mcp.json` for the project, substituting `${workspace}` and
/// `${project_name}`. Unresolved `${FOO}` placeholders are left in place
/// for the user.
pub fn write_config(servers: &[McpServerInfo], project_dir: &Path) -> BuildResult<PathBuf> {
    let workspace = project_dir
        .canonicalize()
        .unwrap_or_else(|_| project_dir.to_path_buf())
        .display()
        .to_string();
    let project_name = project_dir
        .file_name()
        .map_or_else(|| "project".to_string(), |n| n.to_string_lossy().to_string());

    let mut entries = BTreeMap::new();
    for server in servers {
        entries.insert(
            server.name.clone(),
            McpServerSpec {
                command: substitute(&server.command, &workspace, &project_name),
                args: server
                    .args
                    .iter()
                    .map(|a| substitute(a, &workspace, &project_name))
                    .collect(),
                env: server
                    .env
                    .iter()
                    .map(|(k, v)| (k.clone(), substitute(v, &workspace, &project_name)))
                    .collect(),
            },
        );
    }

    let mut metadata = BTreeMap::new();
    metadata.insert(
        "generated_by".to_string(),
        serde_json::json!(format!("specforge {}", env!("CARGO_PKG_VERSION"))),
    );

    let config = McpConfigFile {
        mcp_servers: entries,
        version: "1.0".to_string(),
        metadata,
    };

    std::fs::create_dir_all(project_dir)?;
    let path = project_dir.join(".mcp.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config)?)?;
    Ok(path)
}

/// Read the project's `.mcp.json` if present and parseable.
pub fn read_config(project_dir: &Path) -> Option<McpConfigFile> {
    let path = project_dir.join(".mcp.json");
    let contents = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&contents) {
        Ok(config) => Some(config),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring malformed .mcp.json");
            None
        }
    }
}

/// Probe: the server names already configured for this project.
pub fn installed_server_names(project_dir: &Path) -> Vec<String> {
    read_config(project_dir)
        .map(|c| c.mcp_servers.keys().cloned().collect())
        .unwrap_or_default()
}

fn substitute(value: &str, workspace: &str, project_name: &str) -> String {
    value
        .replace("${workspace}", workspace)
        .replace("${project_name}", project_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str, args: Vec<&str>) -> McpServerInfo {
        McpServerInfo {
            name: name.to_string(),
            command: "npx".to_string(),
            args: args.into_iter().map(String::from).collect(),
            env: BTreeMap::new(),
            category: String::new(),
            tools: vec![],
        }
    }

    #[test]
    fn test_write_and_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let servers = vec![server("memory", vec!["-y", "@modelcontextprotocol/server-memory"])];
        let path = write_config(&servers, dir.path()).unwrap();
        assert!(path.ends_with(".mcp.json"));

        let config = read_config(dir.path()).unwrap();
        assert_eq!(config.version, "1.0");
        assert!(config.mcp_servers.contains_key("memory"));
        assert_eq!(installed_server_names(dir.path()), vec!["memory"]);
    }

    #[test]
    fn test_template_substitution() {
        let dir = tempfile::tempdir().unwrap();
        let servers = vec![server(
            "filesystem",
            vec!["--root", "${workspace}", "--label", "${project_name}", "--keep", "${UNSET}"],
        )];
        write_config(&servers, dir.path()).unwrap();

        let config = read_config(dir.path()).unwrap();
        let args = &config.mcp_servers["filesystem"].args;
        let workspace = dir.path().canonicalize().unwrap().display().to_string();
        assert!(args.contains(&workspace));
        assert!(!args.iter().any(|a| a.contains("${workspace}")));
        assert!(!args.iter().any(|a| a.contains("${project_name}")));
        // Unknown placeholders stay for the user to resolve.
        assert!(args.contains(&"${UNSET}".to_string()));
    }

    #[test]
    fn test_malformed_config_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".mcp.json"), "{broken").unwrap();
        assert!(read_config(dir.path()).is_none());
        assert!(installed_server_names(dir.path()).is_empty());
    }
}
