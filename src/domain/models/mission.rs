//! Mission domain model.
//!
//! Missions are the Kanban cards of the control plane. A parent mission
//! tracks an orchestration run; its children mirror individual subtasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::short_id;

/// Status of a mission on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    /// Waiting to be picked up
    Queue,
    /// Work in progress
    Active,
    /// Finished successfully
    Completed,
    /// Finished unsuccessfully
    Failed,
}

impl Default for MissionStatus {
    fn default() -> Self {
        Self::Queue
    }
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "queue" => Some(Self::Queue),
            "active" => Some(Self::Active),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Valid transitions from this status. The board only moves forward:
    /// Queue → Active → {Completed, Failed}.
    pub fn valid_transitions(&self) -> &'static [MissionStatus] {
        match self {
            Self::Queue => &[Self::Active, Self::Failed],
            Self::Active => &[Self::Completed, Self::Failed],
            Self::Completed => &[],
            Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }
}

/// Priority level for missions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionPriority {
    General,
    Urgent,
}

impl Default for MissionPriority {
    fn default() -> Self {
        Self::General
    }
}

impl MissionPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "general" => Some(Self::General),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

/// Where a mission originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionSource {
    /// Created by a human on the board
    Manual,
    /// Created from a Telegram mention
    Telegram,
    /// Created by an orchestrator run
    Orchestrate,
}

impl Default for MissionSource {
    fn default() -> Self {
        Self::Manual
    }
}

impl MissionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Telegram => "telegram",
            Self::Orchestrate => "orchestrate",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "telegram" => Some(Self::Telegram),
            "orchestrate" => Some(Self::Orchestrate),
            _ => None,
        }
    }
}

/// Jason's verdict on a sub-mission produced by an orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Approved,
    ChangesRequested,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "approved" => Some(Self::Approved),
            "changes_requested" => Some(Self::ChangesRequested),
            _ => None,
        }
    }
}

/// A unit of work tracked on the mission board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    /// Short hex identifier
    pub id: String,
    /// Card title
    pub title: String,
    /// Longer description of the work
    pub description: String,
    /// Board column
    pub status: MissionStatus,
    /// Priority lane
    pub priority: MissionPriority,
    /// Parent mission id (sub-missions only)
    pub parent_id: Option<String>,
    /// Assigned agent id
    pub agent_id: Option<String>,
    /// Paths this mission is scoped to
    pub files_scope: Vec<String>,
    /// Git branch the work lands on
    pub branch: Option<String>,
    /// Structured plan (parents only)
    pub plan_json: Option<serde_json::Value>,
    /// Where the mission came from
    pub source: MissionSource,
    /// Upstream message id (telegram sources)
    pub source_message_id: Option<String>,
    /// Jason's review verdict (orchestrated sub-missions only)
    pub review_status: Option<ReviewStatus>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When work started
    pub started_at: Option<DateTime<Utc>>,
    /// When work finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl Mission {
    /// Create a new queued mission.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: short_id(),
            title: title.into(),
            description: description.into(),
            status: MissionStatus::Queue,
            priority: MissionPriority::General,
            parent_id: None,
            agent_id: None,
            files_scope: Vec::new(),
            branch: None,
            plan_json: None,
            source: MissionSource::Manual,
            source_message_id: None,
            review_status: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: MissionPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the source.
    pub fn with_source(mut self, source: MissionSource) -> Self {
        self.source = source;
        self
    }

    /// Link to a parent mission.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Assign an agent.
    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Whether this mission is a sub-mission.
    pub fn is_sub_mission(&self) -> bool {
        self.parent_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions_forward_only() {
        assert!(MissionStatus::Queue.can_transition_to(MissionStatus::Active));
        assert!(MissionStatus::Active.can_transition_to(MissionStatus::Completed));
        assert!(MissionStatus::Active.can_transition_to(MissionStatus::Failed));

        assert!(!MissionStatus::Completed.can_transition_to(MissionStatus::Active));
        assert!(!MissionStatus::Failed.can_transition_to(MissionStatus::Queue));
        assert!(!MissionStatus::Active.can_transition_to(MissionStatus::Queue));
    }

    #[test]
    fn test_status_terminal() {
        assert!(MissionStatus::Completed.is_terminal());
        assert!(MissionStatus::Failed.is_terminal());
        assert!(!MissionStatus::Queue.is_terminal());
        assert!(!MissionStatus::Active.is_terminal());
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            MissionStatus::Queue,
            MissionStatus::Active,
            MissionStatus::Completed,
            MissionStatus::Failed,
        ] {
            assert_eq!(MissionStatus::parse_str(status.as_str()), Some(status));
        }
        assert_eq!(MissionStatus::parse_str("bogus"), None);
    }

    #[test]
    fn test_mission_builder() {
        let mission = Mission::new("Add login", "Implement the login flow")
            .with_priority(MissionPriority::Urgent)
            .with_source(MissionSource::Telegram)
            .with_parent("aabbccdd");

        assert_eq!(mission.id.len(), 8);
        assert_eq!(mission.priority, MissionPriority::Urgent);
        assert_eq!(mission.source, MissionSource::Telegram);
        assert!(mission.is_sub_mission());
        assert_eq!(mission.status, MissionStatus::Queue);
    }
}
