//! SQLite implementation of `ChatRepository`.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use crate::domain::error::StoreError;
use crate::domain::models::{ChatRole, TeamChatMessage};
use crate::domain::ports::ChatRepository;
use crate::infrastructure::database::utils::parse_datetime;

pub struct ChatRepositoryImpl {
    pool: SqlitePool,
}

impl ChatRepositoryImpl {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<TeamChatMessage, StoreError> {
        let role_str: String = row.get("role");
        Ok(TeamChatMessage {
            id: row.get("id"),
            mission_id: row.get("mission_id"),
            role: ChatRole::parse_str(&role_str)
                .ok_or_else(|| StoreError::Parse(format!("bad chat role '{role_str}'")))?,
            sender: row.get("sender"),
            content: row.get("content"),
            created_at: parse_datetime(row.get::<String, _>("created_at").as_str())?,
        })
    }
}

#[async_trait]
impl ChatRepository for ChatRepositoryImpl {
    async fn append(&self, message: &TeamChatMessage) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO chat_messages (id, mission_id, role, sender, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(&message.mission_id)
        .bind(message.role.as_str())
        .bind(&message.sender)
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list(&self, mission_id: &str) -> Result<Vec<TeamChatMessage>, StoreError> {
        // rowid breaks timestamp ties in insertion order
        let rows = sqlx::query(
            "SELECT * FROM chat_messages WHERE mission_id = ? ORDER BY created_at, rowid",
        )
        .bind(mission_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn count(&self, mission_id: &str) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chat_messages WHERE mission_id = ?")
            .bind(mission_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("n") as u64)
    }
}
