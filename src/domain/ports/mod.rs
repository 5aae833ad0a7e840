//! Ports (trait seams) between the domain and infrastructure.

pub mod agent_repository;
pub mod chat_repository;
pub mod executor;
pub mod mission_repository;

pub use agent_repository::AgentRepository;
pub use chat_repository::ChatRepository;
pub use executor::SubtaskExecutor;
pub use mission_repository::MissionRepository;
