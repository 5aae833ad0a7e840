//! Subtask execution port.

use async_trait::async_trait;

use crate::domain::error::GatewayError;
use crate::domain::models::ExpertTemplate;

/// The seam the orchestrator dispatches subtasks through.
///
/// The production implementation sends the formatted expert prompt to the
/// master gateway and polls chat history for the reply; tests substitute a
/// scripted executor. A `GatewayError` that `is_transient()` tells the
/// orchestrator to fall back to the LLM router.
#[async_trait]
pub trait SubtaskExecutor: Send + Sync {
    /// Execute one subtask as the given expert and return the result text.
    async fn execute(
        &self,
        deployment_id: &str,
        template: ExpertTemplate,
        description: &str,
    ) -> Result<String, GatewayError>;
}
