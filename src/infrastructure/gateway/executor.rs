//! Gateway-backed subtask executor.
//!
//! The orchestrator's primary execution path: prefix the expert system
//! prompt to the subtask description, send it to the master deployment's
//! gateway, and poll chat history for the reply.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::domain::error::GatewayError;
use crate::domain::models::ExpertTemplate;
use crate::domain::ports::SubtaskExecutor;

use super::poll;
use super::pool::GatewayClientPool;

pub struct GatewayExecutor {
    pool: Arc<GatewayClientPool>,
}

impl GatewayExecutor {
    pub fn new(pool: Arc<GatewayClientPool>) -> Self {
        Self { pool }
    }

    /// The message sent to the remote master for one subtask.
    pub fn format_task(template: ExpertTemplate, description: &str) -> String {
        format!("{}\n\nTask: {}", template.system_prompt(), description)
    }
}

#[async_trait]
impl SubtaskExecutor for GatewayExecutor {
    async fn execute(
        &self,
        deployment_id: &str,
        template: ExpertTemplate,
        description: &str,
    ) -> Result<String, GatewayError> {
        let client = self.pool.get(deployment_id).await?;

        // Each subtask gets its own session so parallel replies never
        // interleave within one history.
        let session_key = format!(
            "agent:{}:{}",
            template.as_str(),
            Uuid::new_v4().simple().to_string()[..8].to_string()
        );
        debug!(deployment = deployment_id, session = %session_key, "dispatching subtask");

        let message = Self::format_task(template, description);
        let reply = poll::send_and_poll(&client, &session_key, &message).await?;
        let text = poll::message_text(&reply);
        if text.trim().is_empty() {
            return Err(GatewayError::Protocol("empty reply from gateway".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_task_prefixes_expert_prompt() {
        let message = GatewayExecutor::format_task(ExpertTemplate::Backend, "add an endpoint");
        assert!(message.starts_with("You are an expert backend agent."));
        assert!(message.ends_with("Task: add an endpoint"));
    }
}
