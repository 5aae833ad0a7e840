//! Application services for the control plane.

pub mod completion_monitor;
pub mod event_bus;
pub mod mention_router;
pub mod mission_service;
pub mod orchestrator;
pub mod planner;
pub mod team_chat;

pub use completion_monitor::{CompletionMonitor, CompletionMonitorConfig};
pub use event_bus::{BusEvent, EventBus, EventBusConfig, EventId, EventPayload, SequenceNumber};
pub use mention_router::{is_mention, strip_mention, MentionReply, MentionRouter, WorkerSpawn};
pub use mission_service::MissionService;
pub use orchestrator::{OnComplete, Orchestrator};
pub use planner::Planner;
pub use team_chat::TeamChatService;
