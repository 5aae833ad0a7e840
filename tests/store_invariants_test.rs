//! Mission/agent store invariant tests.

use std::sync::Arc;

use clawdeck::domain::error::StoreError;
use clawdeck::domain::models::{
    Agent, AgentStatus, AgentType, ChatRole, Mission, MissionSource, MissionStatus, ReviewStatus,
};
use clawdeck::infrastructure::database::{
    AgentRepositoryImpl, ChatRepositoryImpl, DatabaseConnection, MissionRepositoryImpl,
};
use clawdeck::services::{EventBus, MissionService, TeamChatService};

struct Harness {
    missions: Arc<MissionService>,
    chat: Arc<TeamChatService>,
    bus: Arc<EventBus>,
    _dir: tempfile::TempDir,
}

async fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("test.db");
    let db = DatabaseConnection::new(&format!("sqlite:{}", db_path.display()))
        .await
        .expect("database");
    db.migrate().await.expect("migrations");

    let bus = Arc::new(EventBus::default());
    let missions = Arc::new(MissionService::new(
        Arc::new(MissionRepositoryImpl::new(db.pool().clone())),
        Arc::new(AgentRepositoryImpl::new(db.pool().clone())),
        bus.clone(),
    ));
    let chat = Arc::new(TeamChatService::new(
        Arc::new(ChatRepositoryImpl::new(db.pool().clone())),
        bus.clone(),
    ));
    Harness { missions, chat, bus, _dir: dir }
}

#[tokio::test]
async fn test_mission_status_moves_forward_only() {
    let h = harness().await;
    let mission = h.missions.create_mission(Mission::new("build", "build it")).await.unwrap();

    h.missions.set_mission_status(&mission.id, MissionStatus::Active).await.unwrap();
    let done =
        h.missions.set_mission_status(&mission.id, MissionStatus::Completed).await.unwrap();
    assert!(done.started_at.is_some());
    assert!(done.completed_at.is_some());

    // Terminal rows only move via administrative delete.
    let err = h
        .missions
        .set_mission_status(&mission.id, MissionStatus::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvariantViolation { .. }));
}

#[tokio::test]
async fn test_mission_cannot_skip_backwards() {
    let h = harness().await;
    let mission = h.missions.create_mission(Mission::new("t", "d")).await.unwrap();
    h.missions.set_mission_status(&mission.id, MissionStatus::Active).await.unwrap();

    let err =
        h.missions.set_mission_status(&mission.id, MissionStatus::Queue).await.unwrap_err();
    assert!(matches!(err, StoreError::InvariantViolation { .. }));
}

#[tokio::test]
async fn test_terminal_mission_is_immutable() {
    let h = harness().await;
    let mission = h.missions.create_mission(Mission::new("t", "d")).await.unwrap();
    h.missions.set_mission_status(&mission.id, MissionStatus::Active).await.unwrap();
    h.missions.set_mission_status(&mission.id, MissionStatus::Completed).await.unwrap();

    let mut edited = h.missions.get_mission(&mission.id).await.unwrap();
    edited.title = "renamed".to_string();
    let err = h.missions.update_mission(&edited).await.unwrap_err();
    assert!(matches!(err, StoreError::InvariantViolation { .. }));

    // Administrative delete still works.
    h.missions.delete_mission(&mission.id).await.unwrap();
    assert!(h.missions.get_mission(&mission.id).await.is_err());
}

#[tokio::test]
async fn test_sub_mission_inherits_source_fields() {
    let h = harness().await;
    let mut parent = Mission::new("parent", "p").with_source(MissionSource::Telegram);
    parent.source_message_id = Some("tg-42".to_string());
    let parent = h.missions.create_mission(parent).await.unwrap();

    let child = h
        .missions
        .create_mission(Mission::new("child", "c").with_parent(parent.id.clone()))
        .await
        .unwrap();

    let stored = h.missions.get_mission(&child.id).await.unwrap();
    assert_eq!(stored.source, MissionSource::Telegram);
    assert_eq!(stored.source_message_id.as_deref(), Some("tg-42"));
    assert_eq!(stored.parent_id.as_deref(), Some(parent.id.as_str()));
}

#[tokio::test]
async fn test_parent_cycle_is_rejected() {
    let h = harness().await;
    let m1 = h.missions.create_mission(Mission::new("m1", "")).await.unwrap();
    let m2 = h
        .missions
        .create_mission(Mission::new("m2", "").with_parent(m1.id.clone()))
        .await
        .unwrap();

    // A mission whose id already sits above the proposed parent.
    let mut cyclic = Mission::new("m1-again", "").with_parent(m2.id.clone());
    cyclic.id = m1.id.clone();
    let err = h.missions.create_mission(cyclic).await.unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
}

#[tokio::test]
async fn test_unknown_parent_is_rejected() {
    let h = harness().await;
    let err = h
        .missions
        .create_mission(Mission::new("orphan", "").with_parent("does-not-exist"))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn test_single_master_agent() {
    let h = harness().await;
    h.missions.create_agent(Agent::new("Jason", AgentType::Master)).await.unwrap();

    let err = h
        .missions
        .create_agent(Agent::new("Jason2", AgentType::Master))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
}

#[tokio::test]
async fn test_sub_agent_requires_master_parent() {
    let h = harness().await;

    // No parent at all
    let err = h
        .missions
        .create_agent(Agent::new("helper", AgentType::Sub))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));

    // Parent is another sub
    let master = h.missions.create_agent(Agent::new("Jason", AgentType::Master)).await.unwrap();
    let sub = h
        .missions
        .create_agent(Agent::new("helper", AgentType::Sub).with_parent(master.id.clone()))
        .await
        .unwrap();
    let err = h
        .missions
        .create_agent(Agent::new("nested", AgentType::Sub).with_parent(sub.id.clone()))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));
}

#[tokio::test]
async fn test_ensure_master_is_idempotent() {
    let h = harness().await;
    let first = h.missions.ensure_master("Jason", "dep-1").await.unwrap();
    let second = h.missions.ensure_master("Jason", "dep-1").await.unwrap();
    assert_eq!(first.id, second.id);

    let masters = h.missions.list_agents(None).await.unwrap();
    assert_eq!(masters.len(), 1);
}

#[tokio::test]
async fn test_agent_status_update_publishes_event() {
    let h = harness().await;
    let master = h.missions.create_agent(Agent::new("Jason", AgentType::Master)).await.unwrap();

    let mut rx = h.bus.subscribe();
    h.missions.set_agent_status(&master.id, AgentStatus::Busy).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.payload.topic(), "agent:updated");
}

#[tokio::test]
async fn test_review_status_only_on_sub_missions() {
    let h = harness().await;
    let parent = h.missions.create_mission(Mission::new("parent", "")).await.unwrap();
    let child = h
        .missions
        .create_mission(Mission::new("child", "").with_parent(parent.id.clone()))
        .await
        .unwrap();

    let err =
        h.missions.set_review_status(&parent.id, ReviewStatus::Approved).await.unwrap_err();
    assert!(matches!(err, StoreError::Integrity(_)));

    h.missions.set_review_status(&child.id, ReviewStatus::ChangesRequested).await.unwrap();
    let stored = h.missions.get_mission(&child.id).await.unwrap();
    assert_eq!(stored.review_status, Some(ReviewStatus::ChangesRequested));
}

#[tokio::test]
async fn test_chat_stream_is_ordered_and_counted() {
    let h = harness().await;
    let mission = h.missions.create_mission(Mission::new("m", "")).await.unwrap();

    h.chat.append(&mission.id, ChatRole::User, "telegram", "first").await.unwrap();
    h.chat.append(&mission.id, ChatRole::Agent, "Jason", "second").await.unwrap();
    h.chat.system(&mission.id, "third").await.unwrap();

    let messages = h.chat.list(&mission.id).await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["first", "second", "third"]);
    assert_eq!(h.chat.count(&mission.id).await.unwrap(), 3);
}

#[tokio::test]
async fn test_mission_transition_publishes_event() {
    let h = harness().await;
    let mission = h.missions.create_mission(Mission::new("m", "")).await.unwrap();

    let mut rx = h.bus.subscribe();
    h.missions.set_mission_status(&mission.id, MissionStatus::Active).await.unwrap();

    let event = rx.recv().await.unwrap();
    assert_eq!(event.payload.topic(), "mission:updated");
}
