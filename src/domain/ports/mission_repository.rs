//! Mission persistence port.

use async_trait::async_trait;

use crate::domain::error::StoreError;
use crate::domain::models::{Mission, MissionStatus};

/// Repository contract for mission rows.
///
/// Implementations persist missions; the invariant checks (legal status
/// transitions, parent acyclicity) live in `MissionService`, which is the
/// only caller that mutates status.
#[async_trait]
pub trait MissionRepository: Send + Sync {
    /// Insert a new mission.
    async fn insert(&self, mission: &Mission) -> Result<(), StoreError>;

    /// Get a mission by id.
    async fn get(&self, id: &str) -> Result<Option<Mission>, StoreError>;

    /// Update all mutable fields of an existing mission.
    async fn update(&self, mission: &Mission) -> Result<(), StoreError>;

    /// List missions, optionally filtered by status.
    async fn list(&self, status: Option<MissionStatus>) -> Result<Vec<Mission>, StoreError>;

    /// List direct children of a mission.
    async fn list_children(&self, parent_id: &str) -> Result<Vec<Mission>, StoreError>;

    /// Administrative delete (the only mutation allowed on terminal rows).
    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
