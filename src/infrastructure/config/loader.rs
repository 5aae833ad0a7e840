//! Configuration loader with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::llm::LlmSettings;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Deploy root cannot be empty")]
    EmptyDeployRoot,

    #[error("Invalid poll interval: {0}s. Must be between 1 and 10")]
    InvalidPollInterval(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite file path
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: ".clawdeck/clawdeck.db".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Project root holding `docker-compose.yml` and `deployments/`
    pub root_dir: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self { root_dir: ".".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Model requested for planning/review/synthesis (providers with a
    /// model override ignore it)
    pub model: String,
    /// Chat-history poll cadence for the completion monitor, seconds
    pub monitor_poll_secs: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { model: "openrouter/auto".to_string(), monitor_poll_secs: 5 }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub deploy: DeployConfig,
    pub orchestrator: OrchestratorConfig,
    pub llm: LlmSettings,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults
    /// 2. `.clawdeck/config.yaml` (project config)
    /// 3. `.clawdeck/local.yaml` (local overrides, optional)
    /// 4. Environment variables (`CLAWDECK_*` prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".clawdeck/config.yaml"))
            .merge(Yaml::file(".clawdeck/local.yaml"))
            .merge(Env::prefixed("CLAWDECK_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.deploy.root_dir.is_empty() {
            return Err(ConfigError::EmptyDeployRoot);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if !(1..=10).contains(&config.orchestrator.monitor_poll_secs) {
            return Err(ConfigError::InvalidPollInterval(config.orchestrator.monitor_poll_secs));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(ConfigLoader::validate(&config).is_ok());
        assert_eq!(config.database.path, ".clawdeck/clawdeck.db");
        assert_eq!(config.orchestrator.monitor_poll_secs, 5);
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validation_rejects_empty_db_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "database:\n  path: /tmp/test.db\nlogging:\n  level: debug\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(&path).unwrap();
        assert_eq!(config.database.path, "/tmp/test.db");
        assert_eq!(config.logging.level, "debug");
        // Untouched sections keep defaults
        assert_eq!(config.logging.format, "pretty");
    }
}
