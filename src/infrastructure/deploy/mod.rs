//! Deployment lifecycle: directories, env files, compose invocations.

pub mod compose;
pub mod env_file;
pub mod manager;
pub mod names;

pub use manager::{DeploymentInfo, DeploymentManager};
