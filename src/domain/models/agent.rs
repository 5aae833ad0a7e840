//! Agent domain model.
//!
//! Agents are handles to executors: the master "Jason" inside a gateway,
//! an expert sub-agent driven by the orchestrator, or a mirror of a
//! remote-spawned sub-session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::short_id;

/// Agent kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    /// The single orchestrating master per control plane
    Master,
    /// An expert or mirrored worker
    Sub,
}

impl Default for AgentType {
    fn default() -> Self {
        Self::Sub
    }
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Sub => "sub",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "master" => Some(Self::Master),
            "sub" => Some(Self::Sub),
            _ => None,
        }
    }
}

/// Status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered, no work assigned
    Idle,
    /// Assigned and making progress
    Active,
    /// Executing a mission right now
    Busy,
    /// Finished its mission
    Completed,
    /// Failed its mission
    Failed,
    /// Unreachable (gateway down)
    Offline,
}

impl Default for AgentStatus {
    fn default() -> Self {
        Self::Idle
    }
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Busy => "busy",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Offline => "offline",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idle" => Some(Self::Idle),
            "active" => Some(Self::Active),
            "busy" => Some(Self::Busy),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the agent is currently doing work.
    pub fn is_working(&self) -> bool {
        matches!(self, Self::Active | Self::Busy)
    }
}

/// A handle to an executor tracked by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Short hex identifier
    pub id: String,
    /// Display name (e.g. "Jason", "Researcher")
    pub name: String,
    /// Master or sub
    pub agent_type: AgentType,
    /// Current status
    pub status: AgentStatus,
    /// Parent agent id (subs only; always a master)
    pub parent_id: Option<String>,
    /// Model backing this agent
    pub model: Option<String>,
    /// System prompt in effect
    pub system_prompt: Option<String>,
    /// Worktree the agent operates in
    pub worktree_path: Option<String>,
    /// Branch the agent commits to
    pub git_branch: Option<String>,
    /// Short description of the current task
    pub current_task: Option<String>,
    /// Load indicator, 0-100
    pub load: u8,
    /// Retries consumed for the current task
    pub retry_count: u32,
    /// Deployment this agent lives in
    pub deployment_id: Option<String>,
    /// Expert template backing this agent
    pub agent_template: Option<String>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last updated
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Create a new idle agent.
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        let now = Utc::now();
        Self {
            id: short_id(),
            name: name.into(),
            agent_type,
            status: AgentStatus::Idle,
            parent_id: None,
            model: None,
            system_prompt: None,
            worktree_path: None,
            git_branch: None,
            current_task: None,
            load: 0,
            retry_count: 0,
            deployment_id: None,
            agent_template: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Link to a parent (master) agent.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Set the backing deployment.
    pub fn with_deployment(mut self, deployment_id: impl Into<String>) -> Self {
        self.deployment_id = Some(deployment_id.into());
        self
    }

    /// Set the expert template.
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.agent_template = Some(template.into());
        self
    }

    /// Set the current task description.
    pub fn with_current_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(task.into());
        self
    }

    /// Set the initial status.
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether this agent is a master.
    pub fn is_master(&self) -> bool {
        self.agent_type == AgentType::Master
    }
}
