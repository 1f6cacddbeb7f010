//! Hierarchical configuration loading.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::BuildConfig;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid phase_timeout_secs: {0}. Must be positive")]
    InvalidPhaseTimeout(u64),

    #[error("Invalid min_phases: {0}. Must be at least 1")]
    InvalidMinPhases(usize),

    #[error("Invalid checkpoint_retention: {0}. Must be at least 1")]
    InvalidCheckpointRetention(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Agent binary cannot be empty")]
    EmptyAgentBinary,

    #[error("Model name cannot be empty: {0}")]
    EmptyModel(&'static str),
}

/// Loads `BuildConfig` with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.specforge/config.yaml`
    /// 3. `.specforge/local.yaml` (optional overrides)
    /// 4. `SPECFORGE_*` environment variables (`__` separates nesting)
    pub fn load() -> Result<BuildConfig> {
        let config: BuildConfig = Figment::new()
            .merge(Serialized::defaults(BuildConfig::default()))
            .merge(Yaml::file(".specforge/config.yaml"))
            .merge(Yaml::file(".specforge/local.yaml"))
            .merge(Env::prefixed("SPECFORGE_").split("__"))
            .extract()
            .context("Failed to extract configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<BuildConfig> {
        let config: BuildConfig = Figment::new()
            .merge(Serialized::defaults(BuildConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &BuildConfig) -> Result<(), ConfigError> {
        if config.phase_timeout_secs == 0 {
            return Err(ConfigError::InvalidPhaseTimeout(config.phase_timeout_secs));
        }
        if config.min_phases == 0 {
            return Err(ConfigError::InvalidMinPhases(config.min_phases));
        }
        if config.checkpoint_retention == 0 {
            return Err(ConfigError::InvalidCheckpointRetention(
                config.checkpoint_retention,
            ));
        }
        if config.agent_binary.trim().is_empty() {
            return Err(ConfigError::EmptyAgentBinary);
        }
        for (name, model) in [
            ("model_analyzer", &config.model_analyzer),
            ("model_executor", &config.model_executor),
            ("model_research", &config.model_research),
        ] {
            if model.trim().is_empty() {
                return Err(ConfigError::EmptyModel(name));
            }
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        Ok(())
    }
}
