//! Domain models for the control plane.

pub mod agent;
pub mod chat;
pub mod deployment;
pub mod mission;
pub mod orchestration;
pub mod plan;

pub use agent::{Agent, AgentStatus, AgentType};
pub use chat::{ChatRole, TeamChatMessage};
pub use deployment::{Deployment, DeploymentStatus};
pub use mission::{Mission, MissionPriority, MissionSource, MissionStatus, ReviewStatus};
pub use orchestration::{
    LogSeverity, OrchestratorStatus, OrchestratorTask, Subtask, SubtaskStatus, TaskLog,
};
pub use plan::{is_complex_task, ExpertTemplate, Plan, PlanSubtask};

/// Generate a short 8-hex-char identifier.
pub fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// Generate a 10-hex-char deployment identifier.
pub fn deployment_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..10].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_id_shape() {
        let id = short_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_deployment_id_shape() {
        let id = deployment_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
