//! Deployment domain model.
//!
//! A deployment is one gateway container runtime managed by this control
//! plane. The on-disk `.env` file is the source of truth; this descriptor
//! mirrors it in memory and is rebuilt by the startup scan.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Directory and .env written, containers never launched
    Configured,
    /// Containers are up
    Running,
    /// Containers are down
    Stopped,
    /// Last compose operation failed
    Failed,
}

impl Default for DeploymentStatus {
    fn default() -> Self {
        Self::Configured
    }
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "configured" => Some(Self::Configured),
            "running" => Some(Self::Running),
            "stopped" => Some(Self::Stopped),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// In-memory descriptor for one managed deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// 10-hex-char identifier, stable for the lifetime of the directory
    pub id: String,
    /// Human-readable name drawn from the adjective+noun pool
    pub name: String,
    /// Host port the gateway listens on
    pub port: u16,
    /// 128-bit hex secret the gateway authenticates with
    pub gateway_token: String,
    /// Lifecycle status
    pub status: DeploymentStatus,
    /// Parsed .env contents (mirror of disk)
    pub env_config: HashMap<String, String>,
    /// When configured
    pub created_at: DateTime<Utc>,
    /// Deployment directory
    pub deploy_dir: PathBuf,
    /// Error from the last failed operation, if any
    pub last_error: Option<String>,
}

impl Deployment {
    /// Path to the deployment's `.env` file.
    pub fn env_path(&self) -> PathBuf {
        self.deploy_dir.join(".env")
    }

    /// Path to the deployment's compose file.
    pub fn compose_path(&self) -> PathBuf {
        self.deploy_dir.join("docker-compose.yml")
    }

    /// WebSocket URL of this deployment's gateway.
    pub fn gateway_url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            DeploymentStatus::Configured,
            DeploymentStatus::Running,
            DeploymentStatus::Stopped,
            DeploymentStatus::Failed,
        ] {
            assert_eq!(DeploymentStatus::parse_str(status.as_str()), Some(status));
        }
        assert_eq!(DeploymentStatus::parse_str("exploded"), None);
    }

    #[test]
    fn test_paths() {
        let dep = Deployment {
            id: "a1b2c3d4e5".to_string(),
            name: "brave-falcon".to_string(),
            port: 18000,
            gateway_token: "0123456789abcdef0123456789abcdef".to_string(),
            status: DeploymentStatus::Configured,
            env_config: HashMap::new(),
            created_at: Utc::now(),
            deploy_dir: PathBuf::from("deployments/a1b2c3d4e5"),
            last_error: None,
        };
        assert!(dep.env_path().ends_with(".env"));
        assert!(dep.compose_path().ends_with("docker-compose.yml"));
        assert_eq!(dep.gateway_url(), "ws://127.0.0.1:18000");
    }
}
