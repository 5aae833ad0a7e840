//! SQLite implementation of `AgentRepository`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::error::StoreError;
use crate::domain::models::{Agent, AgentStatus, AgentType};
use crate::domain::ports::AgentRepository;
use crate::infrastructure::database::utils::parse_datetime;

pub struct AgentRepositoryImpl {
    pool: SqlitePool,
}

impl AgentRepositoryImpl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Helper to convert a database row to an Agent.
    fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> Result<Agent, StoreError> {
        let type_str: String = row.get("agent_type");
        let status_str: String = row.get("status");

        Ok(Agent {
            id: row.get("id"),
            name: row.get("name"),
            agent_type: AgentType::parse_str(&type_str)
                .ok_or_else(|| StoreError::Parse(format!("bad agent type '{type_str}'")))?,
            status: AgentStatus::parse_str(&status_str)
                .ok_or_else(|| StoreError::Parse(format!("bad agent status '{status_str}'")))?,
            parent_id: row.get("parent_id"),
            model: row.get("model"),
            system_prompt: row.get("system_prompt"),
            worktree_path: row.get("worktree_path"),
            git_branch: row.get("git_branch"),
            current_task: row.get("current_task"),
            load: row.get::<i64, _>("load").clamp(0, 100) as u8,
            retry_count: row.get::<i64, _>("retry_count") as u32,
            deployment_id: row.get("deployment_id"),
            agent_template: row.get("agent_template"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            updated_at: parse_datetime(row.get::<String, _>("updated_at").as_str())?,
        })
    }
}

#[async_trait]
impl AgentRepository for AgentRepositoryImpl {
    async fn insert(&self, agent: &Agent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO agents (
                id, name, agent_type, status, parent_id, model, system_prompt,
                worktree_path, git_branch, current_task, load, retry_count,
                deployment_id, agent_template, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&agent.id)
        .bind(&agent.name)
        .bind(agent.agent_type.as_str())
        .bind(agent.status.as_str())
        .bind(&agent.parent_id)
        .bind(&agent.model)
        .bind(&agent.system_prompt)
        .bind(&agent.worktree_path)
        .bind(&agent.git_branch)
        .bind(&agent.current_task)
        .bind(i64::from(agent.load))
        .bind(i64::from(agent.retry_count))
        .bind(&agent.deployment_id)
        .bind(&agent.agent_template)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Agent>, StoreError> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_agent).transpose()
    }

    async fn update(&self, agent: &Agent) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE agents SET
                name = ?, agent_type = ?, status = ?, parent_id = ?, model = ?,
                system_prompt = ?, worktree_path = ?, git_branch = ?,
                current_task = ?, load = ?, retry_count = ?, deployment_id = ?,
                agent_template = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&agent.name)
        .bind(agent.agent_type.as_str())
        .bind(agent.status.as_str())
        .bind(&agent.parent_id)
        .bind(&agent.model)
        .bind(&agent.system_prompt)
        .bind(&agent.worktree_path)
        .bind(&agent.git_branch)
        .bind(&agent.current_task)
        .bind(i64::from(agent.load))
        .bind(i64::from(agent.retry_count))
        .bind(&agent.deployment_id)
        .bind(&agent.agent_template)
        .bind(agent.updated_at.to_rfc3339())
        .bind(&agent.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "agent", id: agent.id.clone() });
        }
        Ok(())
    }

    async fn list(&self, status: Option<AgentStatus>) -> Result<Vec<Agent>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM agents WHERE status = ? ORDER BY created_at, rowid")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM agents ORDER BY created_at, rowid")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_agent).collect()
    }

    async fn list_by_type(&self, agent_type: AgentType) -> Result<Vec<Agent>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM agents WHERE agent_type = ? ORDER BY created_at, rowid")
                .bind(agent_type.as_str())
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(Self::row_to_agent).collect()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "agent", id: id.to_string() });
        }
        Ok(())
    }
}
