//! Gateway client pool.
//!
//! Caches one connected client per deployment id. The map lock is held
//! across the lazy connect so concurrent `get()` calls for the same id
//! resolve to a single opener; the rest await the same instance.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::error::{DeployError, GatewayError};
use crate::infrastructure::deploy::DeploymentManager;

use super::client::{ClientIdent, GatewayClient, GatewayClientConfig};

/// Per-client close budget during shutdown.
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(5);

pub struct GatewayClientPool {
    manager: Arc<DeploymentManager>,
    clients: Mutex<HashMap<String, GatewayClient>>,
}

impl GatewayClientPool {
    pub fn new(manager: Arc<DeploymentManager>) -> Self {
        Self { manager, clients: Mutex::new(HashMap::new()) }
    }

    /// Get the cached client for a deployment, connecting lazily.
    pub async fn get(&self, deployment_id: &str) -> Result<GatewayClient, GatewayError> {
        let mut clients = self.clients.lock().await;

        if let Some(client) = clients.get(deployment_id) {
            if client.is_connected() {
                return Ok(client.clone());
            }
            // Stale entry: drop and reopen below.
            clients.remove(deployment_id);
        }

        let deployment = self
            .manager
            .get(deployment_id)
            .await
            .ok_or_else(|| map_not_found(deployment_id))?;

        let config = GatewayClientConfig::new(deployment.gateway_url(), deployment.gateway_token)
            .with_ident(ClientIdent::Cli);
        let client = GatewayClient::connect(config).await?;
        info!(deployment = %deployment_id, "opened gateway client");
        clients.insert(deployment_id.to_string(), client.clone());
        Ok(client)
    }

    /// Close and evict one client.
    pub async fn release(&self, deployment_id: &str) {
        let client = self.clients.lock().await.remove(deployment_id);
        if let Some(client) = client {
            client.close().await;
        }
    }

    /// Close every client in parallel with a 5 s budget each.
    pub async fn shutdown(&self) {
        let clients: Vec<(String, GatewayClient)> =
            self.clients.lock().await.drain().collect();

        let closers = clients.into_iter().map(|(id, client)| async move {
            if tokio::time::timeout(SHUTDOWN_BUDGET, client.close()).await.is_err() {
                warn!(deployment = %id, "gateway client did not close within budget");
            }
        });
        futures::future::join_all(closers).await;
    }

    /// Number of cached clients.
    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn map_not_found(deployment_id: &str) -> GatewayError {
    let err = DeployError::NotFound(deployment_id.to_string());
    GatewayError::Transport(err.to_string())
}
