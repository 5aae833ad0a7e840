//! Team chat persistence port.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::models::TeamChatMessage;

/// Repository contract for the append-only team chat stream.
///
/// There is deliberately no update or delete: messages are immutable once
/// appended, and per-mission ordering is by timestamp then insertion order.
#[async_trait]
pub trait ChatRepository: Send + Sync {
    /// Append one message.
    async fn append(&self, message: &TeamChatMessage) -> Result<(), StoreError>;

    /// List a mission's messages in stream order.
    async fn list(&self, mission_id: &str) -> Result<Vec<TeamChatMessage>, StoreError>;

    /// Number of messages on a mission.
    async fn count(&self, mission_id: &str) -> Result<u64, StoreError>;
}
