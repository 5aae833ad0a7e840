//! SQLite persistence layer.

pub mod agent_repo;
pub mod chat_repo;
pub mod connection;
pub mod mission_repo;
pub mod utils;

pub use agent_repo::AgentRepositoryImpl;
pub use chat_repo::ChatRepositoryImpl;
pub use connection::DatabaseConnection;
pub use mission_repo::MissionRepositoryImpl;
