//! Team chat message model.
//!
//! Append-only per-mission stream used to narrate progress on the board.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::short_id;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Agent,
    System,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent => "agent",
            Self::System => "system",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "user" => Some(Self::User),
            "agent" => Some(Self::Agent),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

/// One message in a mission's team chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamChatMessage {
    /// Short hex identifier
    pub id: String,
    /// Mission this message belongs to
    pub mission_id: String,
    /// Author role
    pub role: ChatRole,
    /// Display name of the sender
    pub sender: String,
    /// Message body
    pub content: String,
    /// When appended
    pub created_at: DateTime<Utc>,
}

impl TeamChatMessage {
    pub fn new(
        mission_id: impl Into<String>,
        role: ChatRole,
        sender: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: short_id(),
            mission_id: mission_id.into(),
            role,
            sender: sender.into(),
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    /// Convenience constructor for system narration.
    pub fn system(mission_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(mission_id, ChatRole::System, "system", content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = TeamChatMessage::new("ab12cd34", ChatRole::Agent, "Jason", "Planning complete");
        assert_eq!(msg.mission_id, "ab12cd34");
        assert_eq!(msg.role, ChatRole::Agent);
        assert_eq!(msg.id.len(), 8);
    }

    #[test]
    fn test_system_message() {
        let msg = TeamChatMessage::system("ab12cd34", "subtask failed");
        assert_eq!(msg.role, ChatRole::System);
        assert_eq!(msg.sender, "system");
    }

    #[test]
    fn test_role_roundtrip() {
        for role in [ChatRole::User, ChatRole::Agent, ChatRole::System] {
            assert_eq!(ChatRole::parse_str(role.as_str()), Some(role));
        }
    }
}
