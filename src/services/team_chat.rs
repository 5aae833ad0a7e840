//! Per-mission team chat stream.

use std::sync::Arc;

use crate::domain::error::StoreError;
use crate::domain::models::{ChatRole, TeamChatMessage};
use crate::domain::ports::ChatRepository;
use crate::services::event_bus::{EventBus, EventPayload};

pub struct TeamChatService {
    chat: Arc<dyn ChatRepository>,
    bus: Arc<EventBus>,
}

impl TeamChatService {
    pub fn new(chat: Arc<dyn ChatRepository>, bus: Arc<EventBus>) -> Self {
        Self { chat, bus }
    }

    /// Append one message and publish `chat:message`.
    pub async fn append(
        &self,
        mission_id: &str,
        role: ChatRole,
        sender: &str,
        content: &str,
    ) -> Result<TeamChatMessage, StoreError> {
        let message = TeamChatMessage::new(mission_id, role, sender, content);
        self.chat.append(&message).await?;
        self.bus.publish(EventPayload::ChatMessage {
            mission_id: mission_id.to_string(),
            message_id: message.id.clone(),
            role: role.as_str().to_string(),
            sender: sender.to_string(),
        });
        Ok(message)
    }

    /// System narration shorthand used by the pipelines.
    pub async fn system(&self, mission_id: &str, content: &str) -> Result<(), StoreError> {
        self.append(mission_id, ChatRole::System, "system", content).await?;
        Ok(())
    }

    /// A mission's messages in stream order.
    pub async fn list(&self, mission_id: &str) -> Result<Vec<TeamChatMessage>, StoreError> {
        self.chat.list(mission_id).await
    }

    pub async fn count(&self, mission_id: &str) -> Result<u64, StoreError> {
        self.chat.count(mission_id).await
    }
}
