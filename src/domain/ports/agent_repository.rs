//! Agent persistence port.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::models::{Agent, AgentStatus, AgentType};

/// Repository contract for agent rows.
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Insert a new agent.
    async fn insert(&self, agent: &Agent) -> Result<(), StoreError>;

    /// Get an agent by id.
    async fn get(&self, id: &str) -> Result<Option<Agent>, StoreError>;

    /// Update all mutable fields of an existing agent.
    async fn update(&self, agent: &Agent) -> Result<(), StoreError>;

    /// List agents, optionally filtered by status.
    async fn list(&self, status: Option<AgentStatus>) -> Result<Vec<Agent>, StoreError>;

    /// List agents of a given type. Used to enforce the single-master rule.
    async fn list_by_type(&self, agent_type: AgentType) -> Result<Vec<Agent>, StoreError>;

    /// Delete an agent.
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
