//! MCP configuration file handling and discovery.

mod config;

pub use config::{
    installed_server_names, read_config, write_config, McpConfigFile, McpServerSpec,
};
