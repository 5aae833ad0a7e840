//! Orchestrator task state.
//!
//! One `OrchestratorTask` tracks a full plan→execute→synthesize run. Its
//! subtasks are transient: they live inside the task record and are mirrored
//! to child Mission + Agent rows as they execute.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::{ExpertTemplate, Plan};
use super::short_id;

/// Status of one subtask within an orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubtaskStatus {
    /// Waiting on dependencies
    Pending,
    /// Child mission/agent rows being created
    CreatingAgent,
    /// Dispatched to an executor
    Executing,
    /// Finished with a result
    Completed,
    /// Finished without a result
    Failed,
}

impl Default for SubtaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl SubtaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::CreatingAgent => "creating_agent",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One unit of work inside an orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subtask {
    /// Plan-local id (stable dispatch order follows plan order)
    pub id: String,
    /// What needs to be done
    pub description: String,
    /// Expert template to execute as
    pub agent_type: ExpertTemplate,
    /// Plan-local ids this subtask waits on
    pub depends_on: Vec<String>,
    /// Current status
    pub status: SubtaskStatus,
    /// Result text (non-empty once completed)
    pub result: Option<String>,
    /// Error text when failed
    pub error: Option<String>,
    /// Child mission mirroring this subtask
    pub mission_id: Option<String>,
    /// Sub-agent mirroring this subtask
    pub agent_id: Option<String>,
    /// When dispatched
    pub started_at: Option<DateTime<Utc>>,
    /// When finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl Subtask {
    pub fn from_plan(plan: &Plan) -> Vec<Self> {
        plan.subtasks
            .iter()
            .map(|s| Self {
                id: s.id.clone(),
                description: s.description.clone(),
                agent_type: s.agent_type,
                depends_on: s.depends_on.clone(),
                status: SubtaskStatus::Pending,
                result: None,
                error: None,
                mission_id: None,
                agent_id: None,
                started_at: None,
                completed_at: None,
            })
            .collect()
    }
}

/// Status of a full orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorStatus {
    Pending,
    Planning,
    Executing,
    Synthesizing,
    Completed,
    Failed,
}

impl Default for OrchestratorStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OrchestratorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Synthesizing => "synthesizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Severity attached to a task log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

/// One timestamped log line on an orchestrator task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub timestamp: DateTime<Utc>,
    pub severity: LogSeverity,
    pub message: String,
}

impl TaskLog {
    pub fn info(message: impl Into<String>) -> Self {
        Self { timestamp: Utc::now(), severity: LogSeverity::Info, message: message.into() }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { timestamp: Utc::now(), severity: LogSeverity::Warning, message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self { timestamp: Utc::now(), severity: LogSeverity::Error, message: message.into() }
    }
}

/// Top-level state for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorTask {
    /// Short hex identifier
    pub id: String,
    /// The user request
    pub description: String,
    /// Deployment whose master executes subtasks
    pub master_deployment_id: String,
    /// Parent mission on the board, if the run is mission-linked
    pub mission_id: Option<String>,
    /// Pipeline status
    pub status: OrchestratorStatus,
    /// Plan analysis text
    pub analysis: Option<String>,
    /// Subtasks (populated after planning)
    pub subtasks: Vec<Subtask>,
    /// Synthesized result
    pub final_result: Option<String>,
    /// Timestamped progress log
    pub logs: Vec<TaskLog>,
    /// When submitted
    pub created_at: DateTime<Utc>,
    /// When finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl OrchestratorTask {
    pub fn new(description: impl Into<String>, master_deployment_id: impl Into<String>) -> Self {
        Self {
            id: short_id(),
            description: description.into(),
            master_deployment_id: master_deployment_id.into(),
            mission_id: None,
            status: OrchestratorStatus::Pending,
            analysis: None,
            subtasks: Vec::new(),
            final_result: None,
            logs: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Link to a mission on the board.
    pub fn with_mission(mut self, mission_id: impl Into<String>) -> Self {
        self.mission_id = Some(mission_id.into());
        self
    }

    /// Append a log line.
    pub fn log(&mut self, entry: TaskLog) {
        self.logs.push(entry);
    }

    /// Ids of subtasks that are ready to dispatch: pending with every
    /// dependency completed. Order follows the plan.
    pub fn ready_subtasks(&self) -> Vec<String> {
        self.subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Pending)
            .filter(|s| {
                s.depends_on.iter().all(|dep| {
                    self.subtasks
                        .iter()
                        .any(|o| o.id == *dep && o.status == SubtaskStatus::Completed)
                })
            })
            .map(|s| s.id.clone())
            .collect()
    }

    /// Ids of pending subtasks with at least one failed dependency. These
    /// are marked failed without being dispatched.
    pub fn dep_failed_subtasks(&self) -> Vec<String> {
        self.subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Pending)
            .filter(|s| {
                s.depends_on.iter().any(|dep| {
                    self.subtasks
                        .iter()
                        .any(|o| o.id == *dep && o.status == SubtaskStatus::Failed)
                })
            })
            .map(|s| s.id.clone())
            .collect()
    }

    /// Whether every subtask reached a terminal state.
    pub fn all_subtasks_terminal(&self) -> bool {
        self.subtasks.iter().all(|s| s.status.is_terminal())
    }

    /// Whether any subtask is mid-flight.
    pub fn any_subtask_executing(&self) -> bool {
        self.subtasks.iter().any(|s| {
            matches!(s.status, SubtaskStatus::CreatingAgent | SubtaskStatus::Executing)
        })
    }

    /// Mutable access to a subtask by plan-local id.
    pub fn subtask_mut(&mut self, id: &str) -> Option<&mut Subtask> {
        self.subtasks.iter_mut().find(|s| s.id == id)
    }

    /// Count of completed subtasks.
    pub fn completed_count(&self) -> usize {
        self.subtasks
            .iter()
            .filter(|s| s.status == SubtaskStatus::Completed)
            .count()
    }
}
