//! Mission/agent store façade.
//!
//! All status mutations go through this service; it enforces the board
//! invariants (forward-only mission status, terminal immutability, parent
//! forest acyclicity, single master agent, sub-agents parented to the
//! master) and publishes board events.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::domain::error::StoreError;
use crate::domain::models::{
    Agent, AgentStatus, AgentType, Mission, MissionStatus, ReviewStatus,
};
use crate::domain::ports::{AgentRepository, MissionRepository};
use crate::services::event_bus::{EventBus, EventPayload};

pub struct MissionService {
    missions: Arc<dyn MissionRepository>,
    agents: Arc<dyn AgentRepository>,
    bus: Arc<EventBus>,
}

impl MissionService {
    pub fn new(
        missions: Arc<dyn MissionRepository>,
        agents: Arc<dyn AgentRepository>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { missions, agents, bus }
    }

    // ---- missions ----

    /// Insert a mission. Sub-missions are linked to their parent and inherit
    /// the parent's source fields when unset; parent links are checked for
    /// cycles before insert.
    pub async fn create_mission(&self, mut mission: Mission) -> Result<Mission, StoreError> {
        if let Some(parent_id) = mission.parent_id.clone() {
            let parent = self
                .missions
                .get(&parent_id)
                .await?
                .ok_or(StoreError::NotFound { kind: "mission", id: parent_id.clone() })?;

            self.ensure_acyclic(&mission.id, &parent).await?;

            // Children inherit where they came from.
            if mission.source_message_id.is_none() {
                mission.source_message_id = parent.source_message_id.clone();
            }
            if mission.source == crate::domain::models::MissionSource::Manual {
                mission.source = parent.source;
            }
        }

        self.missions.insert(&mission).await?;
        info!(mission = %mission.id, title = %mission.title, "created mission");
        self.bus.publish(EventPayload::MissionUpdated {
            mission_id: mission.id.clone(),
            status: mission.status.as_str().to_string(),
        });
        Ok(mission)
    }

    /// Walk the parent chain and reject if it passes through `child_id`.
    async fn ensure_acyclic(&self, child_id: &str, parent: &Mission) -> Result<(), StoreError> {
        if parent.id == child_id {
            return Err(StoreError::Integrity(format!(
                "mission {child_id} cannot be its own parent"
            )));
        }
        let mut cursor = parent.parent_id.clone();
        while let Some(ancestor_id) = cursor {
            if ancestor_id == child_id {
                return Err(StoreError::Integrity(format!(
                    "mission parent chain would form a cycle through {child_id}"
                )));
            }
            cursor = self.missions.get(&ancestor_id).await?.and_then(|m| m.parent_id);
        }
        Ok(())
    }

    pub async fn get_mission(&self, id: &str) -> Result<Mission, StoreError> {
        self.missions
            .get(id)
            .await?
            .ok_or(StoreError::NotFound { kind: "mission", id: id.to_string() })
    }

    pub async fn list_missions(
        &self,
        status: Option<MissionStatus>,
    ) -> Result<Vec<Mission>, StoreError> {
        self.missions.list(status).await
    }

    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<Mission>, StoreError> {
        self.missions.list_children(parent_id).await
    }

    /// Advance a mission's status. Rejects anything but the forward path
    /// Queue → Active → {Completed, Failed}.
    pub async fn set_mission_status(
        &self,
        id: &str,
        new_status: MissionStatus,
    ) -> Result<Mission, StoreError> {
        let mut mission = self.get_mission(id).await?;

        if !mission.status.can_transition_to(new_status) {
            return Err(StoreError::InvariantViolation {
                kind: "mission",
                from: mission.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        mission.status = new_status;
        match new_status {
            MissionStatus::Active => mission.started_at = Some(Utc::now()),
            MissionStatus::Completed | MissionStatus::Failed => {
                mission.completed_at = Some(Utc::now());
            }
            MissionStatus::Queue => {}
        }

        self.missions.update(&mission).await?;
        info!(mission = %id, status = new_status.as_str(), "mission status changed");
        self.bus.publish(EventPayload::MissionUpdated {
            mission_id: id.to_string(),
            status: new_status.as_str().to_string(),
        });
        Ok(mission)
    }

    /// Update non-status fields. Terminal missions are immutable (delete is
    /// the only administrative escape hatch).
    pub async fn update_mission(&self, mission: &Mission) -> Result<(), StoreError> {
        let stored = self.get_mission(&mission.id).await?;
        if stored.status.is_terminal() {
            return Err(StoreError::InvariantViolation {
                kind: "mission",
                from: stored.status.as_str().to_string(),
                to: "updated".to_string(),
            });
        }
        self.missions.update(mission).await
    }

    /// Record Jason's review verdict on an orchestrated sub-mission.
    pub async fn set_review_status(
        &self,
        id: &str,
        review: ReviewStatus,
    ) -> Result<(), StoreError> {
        let mut mission = self.get_mission(id).await?;
        if !mission.is_sub_mission() {
            return Err(StoreError::Integrity(format!(
                "review status only applies to sub-missions, {id} has no parent"
            )));
        }
        mission.review_status = Some(review);
        self.missions.update(&mission).await
    }

    /// Administrative delete; allowed on terminal rows.
    pub async fn delete_mission(&self, id: &str) -> Result<(), StoreError> {
        self.missions.delete(id).await
    }

    // ---- agents ----

    /// Insert an agent. At most one master exists per control plane; a
    /// sub-agent's parent must exist and be the master.
    pub async fn create_agent(&self, agent: Agent) -> Result<Agent, StoreError> {
        match agent.agent_type {
            AgentType::Master => {
                let masters = self.agents.list_by_type(AgentType::Master).await?;
                if !masters.is_empty() {
                    return Err(StoreError::Integrity(format!(
                        "a master agent already exists: {}",
                        masters[0].id
                    )));
                }
            }
            AgentType::Sub => {
                let parent_id = agent.parent_id.clone().ok_or_else(|| {
                    StoreError::Integrity("sub-agent requires a parent".to_string())
                })?;
                let parent = self
                    .agents
                    .get(&parent_id)
                    .await?
                    .ok_or(StoreError::NotFound { kind: "agent", id: parent_id })?;
                if !parent.is_master() {
                    return Err(StoreError::Integrity(format!(
                        "sub-agent parent {} is not a master",
                        parent.id
                    )));
                }
            }
        }

        self.agents.insert(&agent).await?;
        self.bus.publish(EventPayload::AgentCreated {
            agent_id: agent.id.clone(),
            name: agent.name.clone(),
            agent_type: agent.agent_type.as_str().to_string(),
        });
        Ok(agent)
    }

    /// Get the master agent, creating it on first use.
    pub async fn ensure_master(&self, name: &str, deployment_id: &str) -> Result<Agent, StoreError> {
        let masters = self.agents.list_by_type(AgentType::Master).await?;
        if let Some(master) = masters.into_iter().next() {
            return Ok(master);
        }
        self.create_agent(
            Agent::new(name, AgentType::Master).with_deployment(deployment_id),
        )
        .await
    }

    pub async fn get_agent(&self, id: &str) -> Result<Agent, StoreError> {
        self.agents
            .get(id)
            .await?
            .ok_or(StoreError::NotFound { kind: "agent", id: id.to_string() })
    }

    pub async fn list_agents(
        &self,
        status: Option<AgentStatus>,
    ) -> Result<Vec<Agent>, StoreError> {
        self.agents.list(status).await
    }

    pub async fn set_agent_status(
        &self,
        id: &str,
        status: AgentStatus,
    ) -> Result<Agent, StoreError> {
        let mut agent = self.get_agent(id).await?;
        agent.status = status;
        agent.updated_at = Utc::now();
        self.agents.update(&agent).await?;
        self.bus.publish(EventPayload::AgentUpdated {
            agent_id: id.to_string(),
            status: status.as_str().to_string(),
        });
        Ok(agent)
    }

    pub async fn update_agent(&self, agent: &Agent) -> Result<(), StoreError> {
        self.agents.update(agent).await
    }
}
