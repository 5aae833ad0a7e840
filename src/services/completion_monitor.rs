//! Background completion monitor.
//!
//! A remote master works on its own clock: after a mention is answered, the
//! spawned sub-sessions keep running inside the gateway. This monitor polls
//! the session's chat history and reconciles the remote outcome into local
//! mission and agent records.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::domain::models::{AgentStatus, MissionStatus};
use crate::infrastructure::gateway::poll::{is_real_reply, messages_of};
use crate::infrastructure::gateway::GatewayClientPool;
use crate::services::mission_service::MissionService;
use crate::services::team_chat::TeamChatService;

/// Monitor tuning.
#[derive(Debug, Clone)]
pub struct CompletionMonitorConfig {
    /// History poll cadence
    pub poll_interval: Duration,
    /// Consecutive quiet polls that declare the run complete
    pub quiet_polls: u32,
    /// Hard cap; expiry fails the run
    pub hard_cap: Duration,
}

impl Default for CompletionMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            quiet_polls: 2,
            hard_cap: Duration::from_secs(15 * 60),
        }
    }
}

pub struct CompletionMonitor {
    pool: Arc<GatewayClientPool>,
    missions: Arc<MissionService>,
    chat: Arc<TeamChatService>,
    config: CompletionMonitorConfig,
}

impl CompletionMonitor {
    pub fn new(
        pool: Arc<GatewayClientPool>,
        missions: Arc<MissionService>,
        chat: Arc<TeamChatService>,
        config: CompletionMonitorConfig,
    ) -> Self {
        Self { pool, missions, chat, config }
    }

    /// Start a detached monitor for one parent mission.
    pub fn spawn(
        self: &Arc<Self>,
        parent_mission_id: String,
        session_key: String,
        deployment_id: String,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            monitor.run(&parent_mission_id, &session_key, &deployment_id).await;
        })
    }

    async fn run(&self, parent_mission_id: &str, session_key: &str, deployment_id: &str) {
        let deadline = tokio::time::Instant::now() + self.config.hard_cap;
        let mut last_llm_count = 0usize;
        let mut quiet = 0u32;

        loop {
            tokio::time::sleep(self.config.poll_interval).await;

            if tokio::time::Instant::now() >= deadline {
                warn!(mission = %parent_mission_id, "completion monitor hit the hard cap");
                self.finish(parent_mission_id, false).await;
                return;
            }

            let history = match self.pool.get(deployment_id).await {
                Ok(client) => client.chat_history(session_key).await,
                Err(e) => Err(e),
            };
            let messages = match history {
                Ok(history) => messages_of(&history),
                Err(e) => {
                    warn!(mission = %parent_mission_id, error = %e, "monitor poll failed");
                    continue;
                }
            };

            let llm_count = messages.iter().filter(|m| is_real_reply(m)).count();
            if llm_count > last_llm_count {
                last_llm_count = llm_count;
                quiet = 0;
            } else {
                quiet += 1;
            }

            // Two consecutive quiet polls with no sub-session activity:
            // the remote run is done.
            if quiet >= self.config.quiet_polls {
                info!(mission = %parent_mission_id, "remote run quiet, completing");
                self.finish(parent_mission_id, true).await;
                return;
            }
        }
    }

    /// Close out the parent mission and every still-running child.
    async fn finish(&self, parent_mission_id: &str, success: bool) {
        let (child_status, agent_status, parent_status) = if success {
            (MissionStatus::Completed, AgentStatus::Completed, MissionStatus::Completed)
        } else {
            (MissionStatus::Failed, AgentStatus::Failed, MissionStatus::Failed)
        };

        let children = match self.missions.list_children(parent_mission_id).await {
            Ok(children) => children,
            Err(e) => {
                warn!(mission = %parent_mission_id, error = %e, "could not list children");
                Vec::new()
            }
        };

        for child in children {
            if child.status.is_terminal() {
                continue;
            }
            if let Err(e) = self.missions.set_mission_status(&child.id, child_status).await {
                warn!(mission = %child.id, error = %e, "could not finalize sub-mission");
            }
            if let Some(agent_id) = &child.agent_id {
                if let Ok(agent) = self.missions.get_agent(agent_id).await {
                    if !agent.status.is_terminal() {
                        let _ = self.missions.set_agent_status(agent_id, agent_status).await;
                    }
                }
            }
        }

        if let Ok(parent) = self.missions.get_mission(parent_mission_id).await {
            if !parent.status.is_terminal() {
                if let Err(e) =
                    self.missions.set_mission_status(parent_mission_id, parent_status).await
                {
                    warn!(mission = %parent_mission_id, error = %e, "could not finalize mission");
                }
            }
        }

        let note = if success {
            "Remote run completed; all workers reconciled"
        } else {
            "Remote run timed out after 15 minutes; remaining workers marked failed"
        };
        let _ = self.chat.system(parent_mission_id, note).await;
    }
}
