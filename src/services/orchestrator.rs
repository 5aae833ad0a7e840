//! Orchestrator pipeline.
//!
//! Drives one orchestration run: plan → execute the subtask DAG (parallel
//! where dependencies allow) → review each completed subtask → synthesize →
//! finalize mission state. Subtask failures never cancel siblings; a failed
//! dependency cascades to its dependents without dispatching them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::domain::error::GatewayError;
use crate::domain::models::{
    Agent, AgentStatus, AgentType, ChatRole, ExpertTemplate, Mission, MissionSource,
    MissionStatus, OrchestratorStatus, OrchestratorTask, ReviewStatus, Subtask, SubtaskStatus,
    TaskLog,
};
use crate::domain::ports::SubtaskExecutor;
use crate::infrastructure::llm::{ChatMessage, LlmRouter};
use crate::services::mission_service::MissionService;
use crate::services::planner::Planner;
use crate::services::team_chat::TeamChatService;

/// Callback invoked exactly once with the finished task.
pub type OnComplete = Box<dyn FnOnce(OrchestratorTask) + Send + 'static>;

/// Review verdict parsed from the Jason-review call.
#[derive(Debug, Clone)]
struct ReviewVerdict {
    decision: ReviewStatus,
    comment: String,
}

pub struct Orchestrator {
    tasks: RwLock<HashMap<String, OrchestratorTask>>,
    cancels: RwLock<HashMap<String, Arc<AtomicBool>>>,
    callbacks: Mutex<HashMap<String, OnComplete>>,
    planner: Planner,
    llm: Arc<LlmRouter>,
    executor: Arc<dyn SubtaskExecutor>,
    missions: Arc<MissionService>,
    chat: Arc<TeamChatService>,
    model: String,
}

impl Orchestrator {
    pub fn new(
        planner: Planner,
        llm: Arc<LlmRouter>,
        executor: Arc<dyn SubtaskExecutor>,
        missions: Arc<MissionService>,
        chat: Arc<TeamChatService>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            cancels: RwLock::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            planner,
            llm,
            executor,
            missions,
            chat,
            model: model.into(),
        }
    }

    /// Submit a task and return its id immediately. The pipeline runs in a
    /// detached worker; clients poll `get_task` for progress.
    pub async fn submit_task(
        self: Arc<Self>,
        description: &str,
        master_deployment_id: &str,
        mission_id: Option<String>,
        on_complete: Option<OnComplete>,
    ) -> String {
        let mut task = OrchestratorTask::new(description, master_deployment_id);
        if let Some(mission_id) = mission_id {
            task = task.with_mission(mission_id);
        }
        let task_id = task.id.clone();

        let cancel = Arc::new(AtomicBool::new(false));
        self.cancels.write().await.insert(task_id.clone(), cancel.clone());
        if let Some(callback) = on_complete {
            self.callbacks.lock().await.insert(task_id.clone(), callback);
        }
        self.tasks.write().await.insert(task_id.clone(), task);

        let orchestrator = Arc::clone(&self);
        let worker_id = task_id.clone();
        tokio::spawn(async move {
            orchestrator.run_pipeline(worker_id, cancel).await;
        });

        task_id
    }

    /// Snapshot of one task.
    pub async fn get_task(&self, task_id: &str) -> Option<OrchestratorTask> {
        self.tasks.read().await.get(task_id).cloned()
    }

    /// Snapshot of all tasks.
    pub async fn list_tasks(&self) -> Vec<OrchestratorTask> {
        self.tasks.read().await.values().cloned().collect()
    }

    /// Request cancellation. The run fails at its next checkpoint; the
    /// remote gateway is not stopped (the history monitor reconciles its
    /// best-effort work).
    pub async fn cancel(&self, task_id: &str) -> bool {
        match self.cancels.read().await.get(task_id) {
            Some(flag) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    // ---- pipeline ----

    async fn run_pipeline(self: Arc<Self>, task_id: String, cancel: Arc<AtomicBool>) {
        let task_id = task_id.as_str();
        // Phase 1: plan.
        let (description, mission_id) = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(task_id) else { return };
            task.status = OrchestratorStatus::Planning;
            task.log(TaskLog::info("planning started"));
            (task.description.clone(), task.mission_id.clone())
        };

        let plan = self.planner.plan(&description, None).await;
        let subtask_count = plan.subtasks.len();
        {
            let mut tasks = self.tasks.write().await;
            if let Some(task) = tasks.get_mut(task_id) {
                task.analysis = Some(plan.analysis.clone());
                task.subtasks = Subtask::from_plan(&plan);
                task.status = OrchestratorStatus::Executing;
                task.log(TaskLog::info(format!("planning complete: {subtask_count} subtasks")));
            }
        }

        if let Some(mission_id) = &mission_id {
            if let Err(e) = self.missions.set_mission_status(mission_id, MissionStatus::Active).await
            {
                warn!(mission = %mission_id, error = %e, "could not activate mission");
            }
            let _ = self
                .chat
                .append(
                    mission_id,
                    ChatRole::Agent,
                    "Jason",
                    &format!("Planning complete: {subtask_count} subtasks"),
                )
                .await;
        }

        // Phase 2: execute until every subtask is terminal.
        loop {
            if cancel.load(Ordering::SeqCst) {
                self.finish_cancelled(task_id, mission_id.as_deref()).await;
                return;
            }

            // Dependents of failed subtasks fail without dispatch.
            let dep_failed = {
                let tasks = self.tasks.read().await;
                tasks.get(task_id).map(|t| t.dep_failed_subtasks()).unwrap_or_default()
            };
            for subtask_id in dep_failed {
                self.mark_subtask_failed(task_id, &subtask_id, "dependency failed").await;
                self.mirror_failure(task_id, &subtask_id, mission_id.as_deref()).await;
            }

            let ready = {
                let tasks = self.tasks.read().await;
                let Some(task) = tasks.get(task_id) else { return };
                if task.all_subtasks_terminal() {
                    break;
                }
                let ready = task.ready_subtasks();
                if ready.is_empty() && !task.any_subtask_executing() {
                    // Nothing ready and nothing running: the rest are
                    // unreachable (failed deps handled above).
                    break;
                }
                ready
            };

            if ready.is_empty() {
                break;
            }

            // Dispatch the whole ready set in parallel, plan order.
            let dispatches = ready.iter().map(|subtask_id| {
                let orchestrator = Arc::clone(&self);
                let task_id = task_id.to_string();
                let subtask_id = subtask_id.clone();
                let mission_id = mission_id.clone();
                async move {
                    orchestrator
                        .dispatch_subtask(&task_id, &subtask_id, mission_id.as_deref())
                        .await;
                }
            });
            futures::future::join_all(dispatches).await;
        }

        // Phase 3/4: synthesize and finalize.
        self.synthesize_and_finish(task_id, mission_id.as_deref()).await;
    }

    /// Execute one subtask: gateway first, LLM fallback on transient
    /// gateway trouble. Mirrors progress to a child mission + sub-agent and
    /// runs the Jason review on success.
    async fn dispatch_subtask(&self, task_id: &str, subtask_id: &str, mission_id: Option<&str>) {
        let (description, template, deployment_id) = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(task_id) else { return };
            let deployment_id = task.master_deployment_id.clone();
            let Some(subtask) = task.subtask_mut(subtask_id) else { return };
            subtask.status = SubtaskStatus::CreatingAgent;
            subtask.started_at = Some(Utc::now());
            (subtask.description.clone(), subtask.agent_type, deployment_id)
        };

        // Mirror: child mission + sub-agent before the work starts.
        let mirror = self
            .create_mirror(task_id, subtask_id, &description, template, &deployment_id, mission_id)
            .await;

        {
            let mut tasks = self.tasks.write().await;
            if let Some(subtask) =
                tasks.get_mut(task_id).and_then(|t| t.subtask_mut(subtask_id))
            {
                subtask.status = SubtaskStatus::Executing;
            }
        }

        let result = self.execute_with_fallback(&deployment_id, template, &description).await;

        match result {
            Ok(result_text) => {
                {
                    let mut tasks = self.tasks.write().await;
                    if let Some(task) = tasks.get_mut(task_id) {
                        task.log(TaskLog::info(format!("subtask {subtask_id} completed")));
                        if let Some(subtask) = task.subtask_mut(subtask_id) {
                            subtask.status = SubtaskStatus::Completed;
                            subtask.result = Some(result_text.clone());
                            subtask.completed_at = Some(Utc::now());
                        }
                    }
                }

                if let Some((child_mission_id, agent_id)) = &mirror {
                    let _ = self
                        .missions
                        .set_mission_status(child_mission_id, MissionStatus::Completed)
                        .await;
                    let _ =
                        self.missions.set_agent_status(agent_id, AgentStatus::Completed).await;
                }
                if let Some(mission_id) = mission_id {
                    let _ = self
                        .chat
                        .append(
                            mission_id,
                            ChatRole::Agent,
                            "Jason",
                            &format!("Subtask {subtask_id} completed"),
                        )
                        .await;
                }

                // Per-subtask Jason review; stored, never re-executed.
                self.review_subtask(task_id, subtask_id, &description, &result_text, mirror.as_ref())
                    .await;
            }
            Err(error) => {
                warn!(task = task_id, subtask = subtask_id, error = %error, "subtask failed");
                self.mark_subtask_failed(task_id, subtask_id, &error).await;

                if let Some((child_mission_id, agent_id)) = &mirror {
                    let _ = self
                        .missions
                        .set_mission_status(child_mission_id, MissionStatus::Failed)
                        .await;
                    let _ = self.missions.set_agent_status(agent_id, AgentStatus::Failed).await;
                }
                if let Some(mission_id) = mission_id {
                    let _ = self
                        .chat
                        .system(mission_id, &format!("Subtask {subtask_id} failed: {error}"))
                        .await;
                }
            }
        }
    }

    /// Gateway primary path; transient gateway errors fall back to the LLM
    /// router with the expert system prompt.
    async fn execute_with_fallback(
        &self,
        deployment_id: &str,
        template: ExpertTemplate,
        description: &str,
    ) -> Result<String, String> {
        match self.executor.execute(deployment_id, template, description).await {
            Ok(result) if !result.trim().is_empty() => return Ok(result),
            Ok(_) => return Err("executor returned empty result".to_string()),
            // NotConnected/Timeout/unreachable gateways fall back; remote
            // rejections and Cloudflare blocks do not.
            Err(e) if e.is_transient() || matches!(e, GatewayError::Handshake(_)) => {
                info!(error = %e, "gateway unavailable, falling back to LLM router");
            }
            Err(e) => return Err(e.to_string()),
        }

        let messages = [
            ChatMessage::system(template.system_prompt()),
            ChatMessage::user(description.to_string()),
        ];
        self.llm
            .chat(&self.model, &messages, 0.7, 4096, None)
            .await
            .map_err(|e| format!("fallback LLM failed: {e}"))
    }

    /// Create the child mission + sub-agent pair mirroring one subtask.
    async fn create_mirror(
        &self,
        task_id: &str,
        subtask_id: &str,
        description: &str,
        template: ExpertTemplate,
        deployment_id: &str,
        mission_id: Option<&str>,
    ) -> Option<(String, String)> {
        let mission_id = mission_id?;

        let master = match self.missions.ensure_master("Jason", deployment_id).await {
            Ok(master) => master,
            Err(e) => {
                warn!(error = %e, "could not ensure master agent");
                return None;
            }
        };

        let agent = Agent::new(format!("{}-{subtask_id}", template.as_str()), AgentType::Sub)
            .with_parent(master.id)
            .with_deployment(deployment_id)
            .with_template(template.as_str())
            .with_current_task(description)
            .with_status(AgentStatus::Busy);
        let agent = match self.missions.create_agent(agent).await {
            Ok(agent) => agent,
            Err(e) => {
                warn!(error = %e, "could not create sub-agent");
                return None;
            }
        };

        let title = summarize(description, 64);
        let child = Mission::new(format!("{}: {title}", template.as_str()), description)
            .with_parent(mission_id)
            .with_source(MissionSource::Orchestrate)
            .with_agent(agent.id.clone());
        let child = match self.missions.create_mission(child).await {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "could not create child mission");
                return None;
            }
        };
        let _ = self.missions.set_mission_status(&child.id, MissionStatus::Active).await;

        {
            let mut tasks = self.tasks.write().await;
            if let Some(subtask) =
                tasks.get_mut(task_id).and_then(|t| t.subtask_mut(subtask_id))
            {
                subtask.mission_id = Some(child.id.clone());
                subtask.agent_id = Some(agent.id.clone());
            }
        }
        Some((child.id, agent.id))
    }

    async fn mark_subtask_failed(&self, task_id: &str, subtask_id: &str, error: &str) {
        let mut tasks = self.tasks.write().await;
        if let Some(task) = tasks.get_mut(task_id) {
            task.log(TaskLog::error(format!("subtask {subtask_id} failed: {error}")));
            if let Some(subtask) = task.subtask_mut(subtask_id) {
                subtask.status = SubtaskStatus::Failed;
                subtask.error = Some(error.to_string());
                subtask.completed_at = Some(Utc::now());
            }
        }
    }

    /// Mirror a dependency-cascade failure onto the board.
    async fn mirror_failure(&self, task_id: &str, subtask_id: &str, mission_id: Option<&str>) {
        let Some(mission_id) = mission_id else { return };
        let _ = self
            .chat
            .system(
                mission_id,
                &format!("Subtask {subtask_id} skipped: dependency failed"),
            )
            .await;
        let _ = task_id;
    }

    /// Ask the LLM to review one completed subtask; store the verdict on
    /// the child mission. `changes_requested` is reported, not re-executed.
    async fn review_subtask(
        &self,
        task_id: &str,
        subtask_id: &str,
        description: &str,
        result: &str,
        mirror: Option<&(String, String)>,
    ) {
        let verdict = match self.request_review(description, result).await {
            Some(verdict) => verdict,
            None => return,
        };

        {
            let mut tasks = self.tasks.write().await;
            if let Some(task) = tasks.get_mut(task_id) {
                task.log(TaskLog::info(format!(
                    "review for {subtask_id}: {} ({})",
                    verdict.decision.as_str(),
                    summarize(&verdict.comment, 120)
                )));
            }
        }

        if let Some((child_mission_id, _)) = mirror {
            if let Err(e) =
                self.missions.set_review_status(child_mission_id, verdict.decision).await
            {
                warn!(mission = %child_mission_id, error = %e, "could not store review status");
            }
        }
    }

    async fn request_review(&self, description: &str, result: &str) -> Option<ReviewVerdict> {
        let prompt = format!(
            r#"Review the work below as a strict tech lead.

## Subtask
{description}

## Produced Result
{result}

Respond with JSON only: {{"decision": "approved" | "changes_requested", "comment": "one-paragraph justification"}}"#
        );

        let value = self
            .llm
            .chat_json(&self.model, &[ChatMessage::user(prompt)], 0.2, 1024, None)
            .await
            .ok()?;

        parse_review(&value)
    }

    async fn synthesize_and_finish(&self, task_id: &str, mission_id: Option<&str>) {
        let (description, subtasks) = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(task_id) else { return };
            task.status = OrchestratorStatus::Synthesizing;
            task.log(TaskLog::info("synthesizing results"));
            (task.description.clone(), task.subtasks.clone())
        };

        let all_failed = subtasks.iter().all(|s| s.status == SubtaskStatus::Failed);
        let final_result = if all_failed {
            None
        } else {
            Some(self.synthesize(&description, &subtasks).await)
        };

        let final_status =
            if all_failed { OrchestratorStatus::Failed } else { OrchestratorStatus::Completed };

        let finished = {
            let mut tasks = self.tasks.write().await;
            if let Some(task) = tasks.get_mut(task_id) {
                task.status = final_status;
                task.final_result = final_result;
                task.completed_at = Some(Utc::now());
                task.log(TaskLog::info(format!("finished: {}", final_status.as_str())));
                Some(task.clone())
            } else {
                None
            }
        };

        if let Some(mission_id) = mission_id {
            let mission_status = if all_failed {
                MissionStatus::Failed
            } else {
                MissionStatus::Completed
            };
            if let Err(e) = self.missions.set_mission_status(mission_id, mission_status).await {
                warn!(mission = %mission_id, error = %e, "could not finalize mission");
            }
        }

        self.cancels.write().await.remove(task_id);
        if let Some(finished) = finished {
            self.invoke_callback(task_id, finished).await;
        }
    }

    async fn finish_cancelled(&self, task_id: &str, mission_id: Option<&str>) {
        let finished = {
            let mut tasks = self.tasks.write().await;
            if let Some(task) = tasks.get_mut(task_id) {
                task.status = OrchestratorStatus::Failed;
                task.completed_at = Some(Utc::now());
                task.log(TaskLog::warning("cancelled by caller"));
                // In-flight subtask results are dropped.
                for subtask in &mut task.subtasks {
                    if !subtask.status.is_terminal() {
                        subtask.status = SubtaskStatus::Failed;
                        subtask.error = Some("cancelled".to_string());
                    }
                }
                Some(task.clone())
            } else {
                None
            }
        };

        if let Some(mission_id) = mission_id {
            let _ = self.missions.set_mission_status(mission_id, MissionStatus::Failed).await;
        }
        self.cancels.write().await.remove(task_id);
        if let Some(finished) = finished {
            self.invoke_callback(task_id, finished).await;
        }
    }

    async fn invoke_callback(&self, task_id: &str, task: OrchestratorTask) {
        if let Some(callback) = self.callbacks.lock().await.remove(task_id) {
            callback(task);
        }
    }

    /// Synthesis call with a concatenation fallback when the LLM is down.
    async fn synthesize(&self, description: &str, subtasks: &[Subtask]) -> String {
        let digest = subtasks
            .iter()
            .map(|s| {
                format!(
                    "## {} ({})\n{}\n",
                    s.id,
                    s.status.as_str(),
                    s.result.as_deref().or(s.error.as_deref()).unwrap_or("no output")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "Original task:\n{description}\n\nSubtask results:\n{digest}\n\n\
             Write the final consolidated answer for the user. Merge the \
             subtask results, resolve overlaps, and call out anything that \
             failed."
        );

        match self.llm.chat(&self.model, &[ChatMessage::user(prompt)], 0.4, 4096, None).await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "synthesis LLM failed, concatenating results");
                format!("# Results for: {description}\n\n{digest}")
            }
        }
    }
}

fn parse_review(value: &Value) -> Option<ReviewVerdict> {
    let decision = value
        .get("decision")
        .and_then(Value::as_str)
        .and_then(ReviewStatus::parse_str)?;
    let comment = value
        .get("comment")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(ReviewVerdict { decision, comment })
}

/// First `limit` chars of a description, on a char boundary.
fn summarize(text: &str, limit: usize) -> String {
    let text = text.trim().replace('\n', " ");
    if text.chars().count() <= limit {
        text
    } else {
        let truncated: String = text.chars().take(limit).collect();
        format!("{truncated}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_review() {
        let value = json!({"decision": "approved", "comment": "solid work"});
        let verdict = parse_review(&value).unwrap();
        assert_eq!(verdict.decision, ReviewStatus::Approved);
        assert_eq!(verdict.comment, "solid work");

        let value = json!({"decision": "changes_requested", "comment": ""});
        let verdict = parse_review(&value).unwrap();
        assert_eq!(verdict.decision, ReviewStatus::ChangesRequested);

        assert!(parse_review(&json!({"decision": "maybe"})).is_none());
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("short", 64), "short");
        let long = "a".repeat(100);
        let short = summarize(&long, 10);
        assert_eq!(short.chars().count(), 11);
        assert!(short.ends_with('…'));
        assert_eq!(summarize("line1\nline2", 64), "line1 line2");
    }
}
