//! Configuration loading.

pub mod loader;

pub use loader::{Config, ConfigLoader, DatabaseConfig, DeployConfig, LoggingConfig, OrchestratorConfig};
