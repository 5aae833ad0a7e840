//! Clawdeck: a control plane for OpenClaw gateway deployments.
//!
//! Receives coding tasks, decomposes them with an LLM planner, dispatches
//! subtasks to expert agents inside containerized gateways (framed
//! WebSocket RPC), supervises their lifecycle, and reports progress through
//! Kanban-style missions and per-mission team chat.

pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export key types for convenience
pub use infrastructure::database::DatabaseConnection;
pub use infrastructure::deploy::DeploymentManager;
pub use infrastructure::gateway::{GatewayClient, GatewayClientPool};
pub use infrastructure::llm::LlmRouter;
pub use services::{EventBus, MissionService, Orchestrator};
