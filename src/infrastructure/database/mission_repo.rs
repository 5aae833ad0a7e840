//! SQLite implementation of `MissionRepository`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::error::StoreError;
use crate::domain::models::{
    Mission, MissionPriority, MissionSource, MissionStatus, ReviewStatus,
};
use crate::domain::ports::MissionRepository;
use crate::infrastructure::database::utils::{parse_datetime, parse_datetime_opt, parse_string_list};

pub struct MissionRepositoryImpl {
    pool: SqlitePool,
}

impl MissionRepositoryImpl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Helper to convert a database row to a Mission.
    fn row_to_mission(row: &sqlx::sqlite::SqliteRow) -> Result<Mission, StoreError> {
        let status_str: String = row.get("status");
        let priority_str: String = row.get("priority");
        let source_str: String = row.get("source");

        Ok(Mission {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            status: MissionStatus::parse_str(&status_str)
                .ok_or_else(|| StoreError::Parse(format!("bad mission status '{status_str}'")))?,
            priority: MissionPriority::parse_str(&priority_str)
                .ok_or_else(|| StoreError::Parse(format!("bad priority '{priority_str}'")))?,
            parent_id: row.get("parent_id"),
            agent_id: row.get("agent_id"),
            files_scope: parse_string_list(row.get::<Option<String>, _>("files_scope").as_deref()),
            branch: row.get("branch"),
            plan_json: row
                .get::<Option<String>, _>("plan_json")
                .as_deref()
                .and_then(|s| serde_json::from_str(s).ok()),
            source: MissionSource::parse_str(&source_str)
                .ok_or_else(|| StoreError::Parse(format!("bad mission source '{source_str}'")))?,
            source_message_id: row.get("source_message_id"),
            review_status: row
                .get::<Option<String>, _>("review_status")
                .as_deref()
                .and_then(ReviewStatus::parse_str),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
            started_at: parse_datetime_opt(
                row.get::<Option<String>, _>("started_at").as_deref(),
            )?,
            completed_at: parse_datetime_opt(
                row.get::<Option<String>, _>("completed_at").as_deref(),
            )?,
        })
    }
}

#[async_trait]
impl MissionRepository for MissionRepositoryImpl {
    async fn insert(&self, mission: &Mission) -> Result<(), StoreError> {
        let files_scope = serde_json::to_string(&mission.files_scope)
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        let plan_json = mission
            .plan_json
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok());

        sqlx::query(
            r#"
            INSERT INTO missions (
                id, title, description, status, priority, parent_id, agent_id,
                files_scope, branch, plan_json, source, source_message_id,
                review_status, created_at, started_at, completed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&mission.id)
        .bind(&mission.title)
        .bind(&mission.description)
        .bind(mission.status.as_str())
        .bind(mission.priority.as_str())
        .bind(&mission.parent_id)
        .bind(&mission.agent_id)
        .bind(files_scope)
        .bind(&mission.branch)
        .bind(plan_json)
        .bind(mission.source.as_str())
        .bind(&mission.source_message_id)
        .bind(mission.review_status.map(|r| r.as_str()))
        .bind(mission.created_at.to_rfc3339())
        .bind(mission.started_at.map(|dt| dt.to_rfc3339()))
        .bind(mission.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Mission>, StoreError> {
        let row = sqlx::query("SELECT * FROM missions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_mission).transpose()
    }

    async fn update(&self, mission: &Mission) -> Result<(), StoreError> {
        let files_scope = serde_json::to_string(&mission.files_scope)
            .map_err(|e| StoreError::Parse(e.to_string()))?;
        let plan_json = mission
            .plan_json
            .as_ref()
            .and_then(|v| serde_json::to_string(v).ok());

        let result = sqlx::query(
            r#"
            UPDATE missions SET
                title = ?, description = ?, status = ?, priority = ?,
                parent_id = ?, agent_id = ?, files_scope = ?, branch = ?,
                plan_json = ?, source = ?, source_message_id = ?,
                review_status = ?, started_at = ?, completed_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&mission.title)
        .bind(&mission.description)
        .bind(mission.status.as_str())
        .bind(mission.priority.as_str())
        .bind(&mission.parent_id)
        .bind(&mission.agent_id)
        .bind(files_scope)
        .bind(&mission.branch)
        .bind(plan_json)
        .bind(mission.source.as_str())
        .bind(&mission.source_message_id)
        .bind(mission.review_status.map(|r| r.as_str()))
        .bind(mission.started_at.map(|dt| dt.to_rfc3339()))
        .bind(mission.completed_at.map(|dt| dt.to_rfc3339()))
        .bind(&mission.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "mission", id: mission.id.clone() });
        }
        Ok(())
    }

    async fn list(&self, status: Option<MissionStatus>) -> Result<Vec<Mission>, StoreError> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT * FROM missions WHERE status = ? ORDER BY created_at, rowid")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            None => {
                sqlx::query("SELECT * FROM missions ORDER BY created_at, rowid")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        rows.iter().map(Self::row_to_mission).collect()
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<Mission>, StoreError> {
        let rows =
            sqlx::query("SELECT * FROM missions WHERE parent_id = ? ORDER BY created_at, rowid")
                .bind(parent_id)
                .fetch_all(&self.pool)
                .await?;

        rows.iter().map(Self::row_to_mission).collect()
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM missions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { kind: "mission", id: id.to_string() });
        }
        Ok(())
    }
}
