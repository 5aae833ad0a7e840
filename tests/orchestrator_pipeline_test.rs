//! Orchestrator pipeline integration tests with a scripted executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use clawdeck::domain::error::GatewayError;
use clawdeck::domain::models::{
    ExpertTemplate, Mission, MissionSource, MissionStatus, OrchestratorStatus, OrchestratorTask,
    SubtaskStatus,
};
use clawdeck::domain::ports::SubtaskExecutor;
use clawdeck::infrastructure::database::{
    AgentRepositoryImpl, ChatRepositoryImpl, DatabaseConnection, MissionRepositoryImpl,
};
use clawdeck::infrastructure::llm::{LlmProvider, LlmRouter, LlmSettings};
use clawdeck::services::{EventBus, MissionService, Orchestrator, Planner, TeamChatService};

/// Scripted executor: per-description behavior plus a call log.
#[derive(Default)]
struct ScriptedExecutor {
    /// description -> Ok(result) | Err(message)
    script: HashMap<String, Result<String, String>>,
    /// Artificial latency before answering
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn ok(mut self, description: &str, result: &str) -> Self {
        self.script.insert(description.to_string(), Ok(result.to_string()));
        self
    }

    fn fail(mut self, description: &str, message: &str) -> Self {
        self.script.insert(description.to_string(), Err(message.to_string()));
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl SubtaskExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        _deployment_id: &str,
        _template: ExpertTemplate,
        description: &str,
    ) -> Result<String, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().await.push(description.to_string());
        match self.script.get(description) {
            Some(Ok(result)) => Ok(result.clone()),
            // A permanent remote error: no LLM fallback.
            Some(Err(message)) => Err(GatewayError::Remote {
                code: "EXEC_FAILED".to_string(),
                message: message.clone(),
            }),
            None => Ok(format!("default result for: {description}")),
        }
    }
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    missions: Arc<MissionService>,
    chat: Arc<TeamChatService>,
    _dir: tempfile::TempDir,
}

async fn harness(executor: Arc<ScriptedExecutor>, llm: Arc<LlmRouter>) -> Harness {
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

    let planner = Planner::new(llm.clone(), "test-model");
    let orchestrator = Arc::new(Orchestrator::new(
        planner,
        llm,
        executor,
        missions.clone(),
        chat.clone(),
        "test-model",
    ));
    Harness { orchestrator, missions, chat, _dir: dir }
}

/// Router with no usable provider: planning and synthesis take their
/// fallback paths.
fn unconfigured_llm() -> Arc<LlmRouter> {
    Arc::new(LlmRouter::new(LlmSettings::default(), None))
}

/// Router pointed at a mock server that answers every chat call with the
/// two-subtask plan (s2 depends on s1).
async fn plan_serving_llm() -> (mockito::ServerGuard, Arc<LlmRouter>) {
    let mut server = mockito::Server::new_async().await;
    let plan = serde_json::json!({
        "analysis": "two steps",
        "subtasks": [
            {"id": "s1", "description": "task one", "agent_type": "backend", "depends_on": []},
            {"id": "s2", "description": "task two", "agent_type": "qa", "depends_on": ["s1"]}
        ]
    });
    let body = serde_json::json!({
        "choices": [{"message": {"role": "assistant", "content": plan.to_string()}}]
    });
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(body.to_string())
        .expect_at_least(1)
        .create_async()
        .await;

    let settings = LlmSettings {
        provider: LlmProvider::Custom,
        custom_llm_base_url: Some(server.url()),
        custom_llm_api_key: Some("test".to_string()),
        custom_llm_model_name: Some("mock".to_string()),
        ..Default::default()
    };
    (server, Arc::new(LlmRouter::new(settings, None)))
}

async fn wait_terminal(orchestrator: &Arc<Orchestrator>, task_id: &str) -> OrchestratorTask {
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        if let Some(task) = orchestrator.get_task(task_id).await {
            if task.status.is_terminal() {
                return task;
            }
        }
    }
    panic!("task {task_id} did not reach a terminal state");
}

#[tokio::test]
async fn test_single_subtask_success_end_to_end() {
    // Planning falls back to the single-subtask plan (no LLM), the
    // executor answers, synthesis falls back to concatenation.
    let description = "Write a Python function that returns the sum of two integers";
    let executor =
        Arc::new(ScriptedExecutor::default().ok(description, "def add(a, b): return a + b"));
    let h = harness(executor.clone(), unconfigured_llm()).await;

    let mission = h
        .missions
        .create_mission(
            Mission::new("sum function", description).with_source(MissionSource::Orchestrate),
        )
        .await
        .unwrap();

    let task_id = Arc::clone(&h.orchestrator)
        .submit_task(description, "dep-A", Some(mission.id.clone()), None)
        .await;
    let task = wait_terminal(&h.orchestrator, &task_id).await;

    assert_eq!(task.status, OrchestratorStatus::Completed);
    assert_eq!(task.subtasks.len(), 1);
    assert_eq!(task.subtasks[0].status, SubtaskStatus::Completed);
    assert!(task.subtasks[0].result.as_deref().unwrap().contains("def add"));
    assert!(task.final_result.as_deref().unwrap_or_default().contains("def add"));

    // Mission board mirrors the run.
    let parent = h.missions.get_mission(&mission.id).await.unwrap();
    assert_eq!(parent.status, MissionStatus::Completed);
    let children = h.missions.list_children(&mission.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].status, MissionStatus::Completed);

    // Team chat narrated the run.
    let log = h.chat.list(&mission.id).await.unwrap();
    assert!(log.iter().any(|m| m.content.contains("Planning complete: 1 subtasks")));
}

#[tokio::test]
async fn test_dag_dependency_orders_dispatch() {
    let (_server, llm) = plan_serving_llm().await;
    let executor = Arc::new(
        ScriptedExecutor::default()
            .ok("task one", "one done")
            .ok("task two", "two done")
            .with_delay(Duration::from_millis(50)),
    );
    let h = harness(executor.clone(), llm).await;

    let task_id =
        Arc::clone(&h.orchestrator).submit_task("build and test", "dep-A", None, None).await;
    let task = wait_terminal(&h.orchestrator, &task_id).await;

    assert_eq!(task.status, OrchestratorStatus::Completed);
    assert_eq!(task.subtasks.len(), 2);
    assert!(task.subtasks.iter().all(|s| s.status == SubtaskStatus::Completed));

    // s2 was dispatched strictly after s1 completed.
    assert_eq!(executor.calls().await, vec!["task one", "task two"]);
}

#[tokio::test]
async fn test_failed_dependency_cascades_without_dispatch() {
    let (_server, llm) = plan_serving_llm().await;
    let executor = Arc::new(
        ScriptedExecutor::default()
            .fail("task one", "compile error")
            .ok("task two", "never runs"),
    );
    let h = harness(executor.clone(), llm).await;

    let mission = h
        .missions
        .create_mission(
            Mission::new("doomed", "build and test").with_source(MissionSource::Orchestrate),
        )
        .await
        .unwrap();

    let task_id = Arc::clone(&h.orchestrator)
        .submit_task("build and test", "dep-A", Some(mission.id.clone()), None)
        .await;
    let task = wait_terminal(&h.orchestrator, &task_id).await;

    assert_eq!(task.status, OrchestratorStatus::Failed);
    let s1 = task.subtasks.iter().find(|s| s.id == "s1").unwrap();
    let s2 = task.subtasks.iter().find(|s| s.id == "s2").unwrap();
    assert_eq!(s1.status, SubtaskStatus::Failed);
    assert_eq!(s2.status, SubtaskStatus::Failed);
    assert_eq!(s2.error.as_deref(), Some("dependency failed"));

    // s2 never reached the executor.
    assert_eq!(executor.calls().await, vec!["task one"]);

    let parent = h.missions.get_mission(&mission.id).await.unwrap();
    assert_eq!(parent.status, MissionStatus::Failed);
}

#[tokio::test]
async fn test_partial_failure_still_completes() {
    let (_server, llm) = plan_serving_llm().await;
    let executor = Arc::new(
        ScriptedExecutor::default()
            .ok("task one", "one done")
            .fail("task two", "flaky test"),
    );
    let h = harness(executor.clone(), llm).await;

    let task_id =
        Arc::clone(&h.orchestrator).submit_task("build and test", "dep-A", None, None).await;
    let task = wait_terminal(&h.orchestrator, &task_id).await;

    // One subtask made it: the run synthesizes what it has.
    assert_eq!(task.status, OrchestratorStatus::Completed);
    assert!(task.final_result.is_some());
    let s2 = task.subtasks.iter().find(|s| s.id == "s2").unwrap();
    assert_eq!(s2.status, SubtaskStatus::Failed);
}

#[tokio::test]
async fn test_on_complete_callback_fires_exactly_once() {
    let description = "tiny task";
    let executor = Arc::new(ScriptedExecutor::default().ok(description, "done"));
    let h = harness(executor, unconfigured_llm()).await;

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let task_id = Arc::clone(&h.orchestrator)
        .submit_task(
            description,
            "dep-A",
            None,
            Some(Box::new(move |task| {
                assert!(task.status.is_terminal());
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await;

    wait_terminal(&h.orchestrator, &task_id).await;
    // Give any duplicate invocation a chance to show up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cancellation_fails_the_run() {
    let description = "slow task";
    let executor = Arc::new(
        ScriptedExecutor::default()
            .ok(description, "too late")
            .with_delay(Duration::from_millis(400)),
    );
    let h = harness(executor, unconfigured_llm()).await;

    let mission = h
        .missions
        .create_mission(
            Mission::new("slow", description).with_source(MissionSource::Orchestrate),
        )
        .await
        .unwrap();

    let task_id = Arc::clone(&h.orchestrator)
        .submit_task(description, "dep-A", Some(mission.id.clone()), None)
        .await;
    assert!(h.orchestrator.cancel(&task_id).await);

    let task = wait_terminal(&h.orchestrator, &task_id).await;
    assert_eq!(task.status, OrchestratorStatus::Failed);

    let parent = h.missions.get_mission(&mission.id).await.unwrap();
    assert_eq!(parent.status, MissionStatus::Failed);

    // Cancelling an unknown task reports false.
    assert!(!h.orchestrator.cancel("nope").await);
}
