//! Deployment lifecycle manager.
//!
//! Owns the `deployments/<id>/` directory layout and the in-memory mirror of
//! every tracked deployment. All mutations go through this manager; the
//! on-disk `.env` stays the source of truth and `restore()` rebuilds the
//! mirror from disk on startup.

use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::{Mutex, OnceCell, RwLock};
use tracing::{info, warn};

use crate::domain::error::DeployError;
use crate::domain::models::{deployment_id, Deployment, DeploymentStatus};

use super::compose::{self, ComposeFlavor};
use super::env_file;
use super::names;

/// Valid port range for gateway deployments.
const PORT_RANGE: RangeInclusive<u16> = 10000..=65000;

/// Retry budget for port allocation.
const MAX_PORT_ATTEMPTS: u32 = 50;

/// Timeout for `compose ps` during the startup scan.
const PS_TIMEOUT: Duration = Duration::from_secs(10);

/// Draw a random port from `range` avoiding `used`.
fn allocate_port_in<R: Rng + ?Sized>(
    rng: &mut R,
    range: RangeInclusive<u16>,
    used: &HashSet<u16>,
) -> Result<u16, DeployError> {
    for _ in 0..MAX_PORT_ATTEMPTS {
        let port = rng.gen_range(range.clone());
        if !used.contains(&port) {
            return Ok(port);
        }
    }
    Err(DeployError::PortExhausted(MAX_PORT_ATTEMPTS))
}

/// Generate a random 128-bit gateway token as 32 hex chars.
fn generate_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:032x}", rng.gen::<u128>())
}

/// Descriptor plus the env views returned by `info()`.
#[derive(Debug, Clone)]
pub struct DeploymentInfo {
    pub deployment: Deployment,
    /// Env map with secrets masked
    pub env_config: HashMap<String, String>,
    /// Raw env map for authorized callers
    pub env_config_full: HashMap<String, String>,
}

pub struct DeploymentManager {
    /// Project root holding the compose template and `deployments/`
    root_dir: PathBuf,
    deployments: RwLock<HashMap<String, Deployment>>,
    master_id: RwLock<Option<String>>,
    restored: AtomicBool,
    compose_flavor: OnceCell<ComposeFlavor>,
    /// Per-deployment serialization of .env reads/writes
    env_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DeploymentManager {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            deployments: RwLock::new(HashMap::new()),
            master_id: RwLock::new(None),
            restored: AtomicBool::new(false),
            compose_flavor: OnceCell::new(),
            env_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding all deployments.
    pub fn deployments_dir(&self) -> PathBuf {
        self.root_dir.join("deployments")
    }

    /// The standard compose file copied into every deployment.
    pub fn compose_template(&self) -> PathBuf {
        self.root_dir.join("docker-compose.yml")
    }

    async fn flavor(&self) -> Result<ComposeFlavor, DeployError> {
        self.compose_flavor
            .get_or_try_init(compose::detect)
            .await
            .map(|f| *f)
            .map_err(DeployError::from)
    }

    async fn env_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.env_locks.lock().await;
        locks.entry(id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Allocate a directory, `.env` and compose copy for a new deployment.
    ///
    /// `overrides` carries provider keys (OPENROUTER_API_KEY and friends)
    /// merged into the generated env.
    pub async fn configure(
        &self,
        overrides: HashMap<String, String>,
    ) -> Result<Deployment, DeployError> {
        let (id, port, token, name) = {
            let deployments = self.deployments.read().await;
            let used_ports: HashSet<u16> = deployments.values().map(|d| d.port).collect();
            let used_names: HashSet<String> =
                deployments.values().map(|d| d.name.clone()).collect();

            let mut rng = rand::thread_rng();
            let port = allocate_port_in(&mut rng, PORT_RANGE, &used_ports)?;
            let token = generate_token(&mut rng);
            let name = names::unique_name(&mut rng, &used_names);
            (deployment_id(), port, token, name)
        };

        let deploy_dir = self.deployments_dir().join(&id);
        tokio::fs::create_dir_all(deploy_dir.join("config")).await?;
        tokio::fs::create_dir_all(deploy_dir.join("workspace")).await?;

        let mut env: HashMap<String, String> = overrides;
        env.insert("PORT".to_string(), port.to_string());
        env.insert("OPENCLAW_GATEWAY_TOKEN".to_string(), token.clone());
        env.insert("DEPLOY_NAME".to_string(), name.clone());

        let env_path = deploy_dir.join(".env");
        tokio::fs::write(&env_path, env_file::render_env(&env)).await?;

        let template = self.compose_template();
        if !template.exists() {
            return Err(DeployError::InvalidDirectory(format!(
                "compose template missing at {}",
                template.display()
            )));
        }
        tokio::fs::copy(&template, deploy_dir.join("docker-compose.yml")).await?;

        let deployment = Deployment {
            id: id.clone(),
            name,
            port,
            gateway_token: token,
            status: DeploymentStatus::Configured,
            env_config: env,
            created_at: Utc::now(),
            deploy_dir,
            last_error: None,
        };

        info!(id = %id, port, name = %deployment.name, "configured deployment");
        self.deployments.write().await.insert(id, deployment.clone());
        Ok(deployment)
    }

    async fn get_or_not_found(&self, id: &str) -> Result<Deployment, DeployError> {
        self.deployments
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DeployError::NotFound(id.to_string()))
    }

    async fn set_status(&self, id: &str, status: DeploymentStatus, error: Option<String>) {
        if let Some(dep) = self.deployments.write().await.get_mut(id) {
            dep.status = status;
            dep.last_error = error;
        }
    }

    /// Start (or recreate) a deployment's containers.
    pub async fn launch(&self, id: &str) -> Result<(), DeployError> {
        let dep = self.get_or_not_found(id).await?;
        let flavor = self.flavor().await?;

        // Clear stale containers first; failure here is not fatal.
        if let Err(e) = compose::run(
            flavor,
            &dep.compose_path(),
            &dep.env_path(),
            &["down", "--remove-orphans"],
            None,
        )
        .await
        {
            warn!(id = %id, error = %e, "pre-launch compose down failed");
        }

        // Re-copy the template in case it changed since configure().
        let template = self.compose_template();
        if template.exists() {
            tokio::fs::copy(&template, dep.compose_path()).await?;
        }

        let result = compose::run(
            flavor,
            &dep.compose_path(),
            &dep.env_path(),
            &["up", "-d", "--force-recreate", "--remove-orphans"],
            None,
        )
        .await;

        match result {
            Ok(_) => {
                self.set_status(id, DeploymentStatus::Running, None).await;
                info!(id = %id, "deployment running");
                Ok(())
            }
            Err(e) => {
                self.set_status(id, DeploymentStatus::Failed, Some(e.to_string())).await;
                Err(e.into())
            }
        }
    }

    /// Stop a deployment's containers.
    pub async fn stop(&self, id: &str) -> Result<(), DeployError> {
        let dep = self.get_or_not_found(id).await?;
        let flavor = self.flavor().await?;

        match compose::run(
            flavor,
            &dep.compose_path(),
            &dep.env_path(),
            &["down", "--remove-orphans"],
            None,
        )
        .await
        {
            Ok(_) => {
                self.set_status(id, DeploymentStatus::Stopped, None).await;
                Ok(())
            }
            Err(e) => {
                self.set_status(id, DeploymentStatus::Failed, Some(e.to_string())).await;
                Err(e.into())
            }
        }
    }

    /// Recreate containers so env changes take effect.
    ///
    /// Deliberately `up --force-recreate`, not `compose restart`: restart
    /// would keep the old environment.
    pub async fn restart(&self, id: &str) -> Result<(), DeployError> {
        let dep = self.get_or_not_found(id).await?;
        let flavor = self.flavor().await?;

        match compose::run(
            flavor,
            &dep.compose_path(),
            &dep.env_path(),
            &["up", "-d", "--force-recreate"],
            None,
        )
        .await
        {
            Ok(_) => {
                self.set_status(id, DeploymentStatus::Running, None).await;
                Ok(())
            }
            Err(e) => {
                self.set_status(id, DeploymentStatus::Failed, Some(e.to_string())).await;
                Err(e.into())
            }
        }
    }

    /// Tear down a deployment and delete its directory.
    pub async fn remove(&self, id: &str) -> Result<(), DeployError> {
        let dep = self.get_or_not_found(id).await?;

        // Nothing to tear down if the containers were never launched.
        if dep.status != DeploymentStatus::Configured {
            if let Ok(flavor) = self.flavor().await {
                if let Err(e) = compose::run(
                    flavor,
                    &dep.compose_path(),
                    &dep.env_path(),
                    &["down", "--remove-orphans"],
                    None,
                )
                .await
                {
                    warn!(id = %id, error = %e, "compose down during remove failed");
                }
            }
        }

        if dep.deploy_dir.exists() {
            tokio::fs::remove_dir_all(&dep.deploy_dir).await?;
        }
        self.deployments.write().await.remove(id);

        let mut master = self.master_id.write().await;
        if master.as_deref() == Some(id) {
            *master = None;
        }
        info!(id = %id, "removed deployment");
        Ok(())
    }

    /// Rewrite `.env` keys in place. Does not restart; call `restart` to
    /// apply.
    pub async fn update_env(
        &self,
        id: &str,
        updates: HashMap<String, String>,
    ) -> Result<(), DeployError> {
        let dep = self.get_or_not_found(id).await?;
        let lock = self.env_lock(id).await;
        let _guard = lock.lock().await;

        let env_path = dep.env_path();
        if !env_path.exists() {
            return Err(DeployError::NotFound(id.to_string()));
        }

        let content = tokio::fs::read_to_string(&env_path).await?;
        let updated = env_file::apply_updates(&content, &updates);
        tokio::fs::write(&env_path, &updated).await?;

        // Keep the in-memory mirror in sync with disk.
        let env = env_file::parse_env(&updated);
        let mut deployments = self.deployments.write().await;
        if let Some(dep) = deployments.get_mut(id) {
            if let Some(port) = env.get("PORT").and_then(|p| p.parse().ok()) {
                dep.port = port;
            }
            if let Some(token) = env.get("OPENCLAW_GATEWAY_TOKEN") {
                dep.gateway_token = token.clone();
            }
            if let Some(name) = env.get("DEPLOY_NAME") {
                dep.name = name.clone();
            }
            dep.env_config = env;
        }
        Ok(())
    }

    /// Descriptor plus masked and raw env views.
    pub async fn info(&self, id: &str) -> Result<DeploymentInfo, DeployError> {
        let dep = self.get_or_not_found(id).await?;
        let env_path = dep.env_path();
        if !env_path.exists() {
            return Err(DeployError::NotFound(id.to_string()));
        }

        let env_config_full = env_file::read_env(&env_path).await?;
        let env_config = env_file::mask_env(&env_config_full);

        Ok(DeploymentInfo { deployment: dep, env_config, env_config_full })
    }

    /// All tracked deployments.
    pub async fn list(&self) -> Vec<Deployment> {
        let mut deployments: Vec<Deployment> =
            self.deployments.read().await.values().cloned().collect();
        deployments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        deployments
    }

    /// One tracked deployment.
    pub async fn get(&self, id: &str) -> Option<Deployment> {
        self.deployments.read().await.get(id).cloned()
    }

    /// Scan `deployments/*` and rebuild the in-memory map from disk.
    ///
    /// One-shot: repeated invocation is a no-op.
    pub async fn restore(&self) -> Result<(), DeployError> {
        if self.restored.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let dir = self.deployments_dir();
        if !dir.exists() {
            return Ok(());
        }

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let id = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => continue,
            };
            match self.restore_one(&id, &path).await {
                Ok(Some(dep)) => {
                    info!(id = %id, status = dep.status.as_str(), "restored deployment");
                    self.deployments.write().await.insert(id, dep);
                }
                Ok(None) => {
                    warn!(id = %id, "skipping deployment directory without PORT");
                }
                Err(e) => {
                    warn!(id = %id, error = %e, "failed to restore deployment");
                }
            }
        }
        Ok(())
    }

    async fn restore_one(
        &self,
        id: &str,
        deploy_dir: &Path,
    ) -> Result<Option<Deployment>, DeployError> {
        let env_path = deploy_dir.join(".env");
        if !env_path.exists() {
            return Ok(None);
        }
        let mut env = env_file::read_env(&env_path).await?;

        let Some(port) = env.get("PORT").and_then(|p| p.parse::<u16>().ok()) else {
            return Ok(None);
        };
        let token = env.get("OPENCLAW_GATEWAY_TOKEN").cloned().unwrap_or_default();

        // Persist a generated name so restarts keep the identity.
        let name = match env.get("DEPLOY_NAME") {
            Some(name) => name.clone(),
            None => {
                let name = {
                    let mut rng = rand::thread_rng();
                    names::random_name(&mut rng)
                };
                let content = tokio::fs::read_to_string(&env_path).await?;
                let updates = HashMap::from([("DEPLOY_NAME".to_string(), name.clone())]);
                tokio::fs::write(&env_path, env_file::apply_updates(&content, &updates)).await?;
                env.insert("DEPLOY_NAME".to_string(), name.clone());
                name
            }
        };

        let status = match self.probe_running(deploy_dir, &env_path).await {
            Some(true) => DeploymentStatus::Running,
            Some(false) | None => DeploymentStatus::Stopped,
        };

        Ok(Some(Deployment {
            id: id.to_string(),
            name,
            port,
            gateway_token: token,
            status,
            env_config: env,
            created_at: Utc::now(),
            deploy_dir: deploy_dir.to_path_buf(),
            last_error: None,
        }))
    }

    async fn probe_running(&self, deploy_dir: &Path, env_path: &Path) -> Option<bool> {
        let compose_path = deploy_dir.join("docker-compose.yml");
        if !compose_path.exists() {
            return None;
        }
        let flavor = self.flavor().await.ok()?;
        match compose::run(
            flavor,
            &compose_path,
            env_path,
            &["ps", "--format", "json"],
            Some(PS_TIMEOUT),
        )
        .await
        {
            Ok(out) => Some(compose::ps_reports_running(&out.stdout)),
            Err(e) => {
                warn!(error = %e, "compose ps failed during restore");
                None
            }
        }
    }

    /// Tail a deployment's container logs.
    pub async fn logs(&self, id: &str, tail: u32) -> Result<String, DeployError> {
        let dep = self.get_or_not_found(id).await?;
        let flavor = self.flavor().await?;
        let tail = tail.to_string();
        let out = compose::run(
            flavor,
            &dep.compose_path(),
            &dep.env_path(),
            &["logs", "--tail", &tail],
            None,
        )
        .await?;
        Ok(out.stdout)
    }

    /// Designate (or with `""` revoke) the master deployment.
    pub async fn set_master(&self, id: &str) -> Result<(), DeployError> {
        let mut master = self.master_id.write().await;
        if id.is_empty() {
            *master = None;
            return Ok(());
        }
        if !self.deployments.read().await.contains_key(id) {
            return Err(DeployError::NotFound(id.to_string()));
        }
        *master = Some(id.to_string());
        Ok(())
    }

    /// Current master deployment id, auto-cleared if it became unknown.
    pub async fn master(&self) -> Option<String> {
        let current = self.master_id.read().await.clone();
        match current {
            Some(id) if self.deployments.read().await.contains_key(&id) => Some(id),
            Some(_) => {
                *self.master_id.write().await = None;
                None
            }
            None => None,
        }
    }
}
