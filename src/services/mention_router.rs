//! Mention routing.
//!
//! Detects `@jason` mentions, forwards the task to the master gateway, and
//! mirrors the remote master's spawned sub-sessions into local missions and
//! agents. The actual completion of remote work is reconciled later by the
//! completion monitor.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::domain::error::GatewayError;
use crate::domain::models::{
    Agent, AgentStatus, AgentType, ChatRole, Mission, MissionSource, MissionStatus,
};
use crate::infrastructure::gateway::poll::{self, message_text};
use crate::infrastructure::gateway::GatewayClientPool;
use crate::services::completion_monitor::CompletionMonitor;
use crate::services::mission_service::MissionService;
use crate::services::planner::{delegation_prompt, needs_delegation};
use crate::services::team_chat::TeamChatService;

/// Roles the extractor will accept from spawn markers and prose.
pub const KNOWN_ROLES: &[&str] = &[
    "researcher",
    "qa",
    "verifier",
    "planner",
    "coder",
    "designer",
    "tester",
    "reviewer",
    "writer",
    "analyst",
    "architect",
    "debugger",
    "documenter",
    "editor",
    "summarizer",
    "validator",
    "checker",
    "qa/verifier",
    "code reviewer",
];

fn mention_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(^|\s)@jason\b").expect("valid mention regex"))
}

/// Whether a message mentions `@jason` as a standalone token.
pub fn is_mention(message: &str) -> bool {
    mention_regex().is_match(message)
}

/// Remove the mention token and return the clean task text.
pub fn strip_mention(message: &str) -> String {
    mention_regex().replace_all(message, "$1").trim().to_string()
}

/// One extracted worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpawn {
    /// Display role, e.g. "Researcher" or "Worker-1"
    pub role: String,
    /// Short description if the text carried one
    pub description: Option<String>,
}

/// Reply returned to the mention caller.
#[derive(Debug, Clone)]
pub struct MentionReply {
    pub mission_id: String,
    pub response: String,
    pub workers: Vec<WorkerSpawn>,
}

pub struct MentionRouter {
    pool: Arc<GatewayClientPool>,
    missions: Arc<MissionService>,
    chat: Arc<TeamChatService>,
    monitor: Arc<CompletionMonitor>,
}

impl MentionRouter {
    pub fn new(
        pool: Arc<GatewayClientPool>,
        missions: Arc<MissionService>,
        chat: Arc<TeamChatService>,
        monitor: Arc<CompletionMonitor>,
    ) -> Self {
        Self { pool, missions, chat, monitor }
    }

    /// Handle one `@jason` mention: create the parent mission, forward the
    /// task, mirror spawned workers, start the background monitor, and
    /// return the master's first reply.
    pub async fn handle_mention(
        &self,
        message: &str,
        session_key: &str,
        master_deployment_id: &str,
    ) -> Result<MentionReply, GatewayError> {
        let task = strip_mention(message);

        let mission = self
            .missions
            .create_mission(
                Mission::new(task_title(&task), task.clone())
                    .with_source(MissionSource::Telegram),
            )
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let client = self.pool.get(master_deployment_id).await?;

        // Spawns already in history must not count as ours.
        let baseline_spawns = match client.chat_history(session_key).await {
            Ok(history) => count_spawn_markers(&poll::messages_of(&history)),
            Err(_) => 0,
        };

        let outgoing =
            if needs_delegation(&task) { delegation_prompt(&task) } else { task.clone() };

        let _ = self.chat.append(&mission.id, ChatRole::User, "telegram", &task).await;

        let reply = poll::send_and_poll(&client, session_key, &outgoing).await?;
        let response = message_text(&reply);

        let _ = self.chat.append(&mission.id, ChatRole::Agent, "Jason", &response).await;

        // Snapshot after the send; new markers beyond the baseline are ours.
        let post_messages = match client.chat_history(session_key).await {
            Ok(history) => poll::messages_of(&history),
            Err(_) => Vec::new(),
        };
        let workers = extract_workers(&response, &post_messages, baseline_spawns);

        self.mirror_workers(&mission.id, master_deployment_id, &workers).await;

        let _ = self.missions.set_mission_status(&mission.id, MissionStatus::Active).await;

        // Background reconciliation of the remote run; detached.
        let _monitor = self.monitor.spawn(
            mission.id.clone(),
            session_key.to_string(),
            master_deployment_id.to_string(),
        );

        info!(mission = %mission.id, workers = workers.len(), "mention handled");
        Ok(MentionReply { mission_id: mission.id, response, workers })
    }

    /// Create one sub-mission + busy sub-agent per extracted worker.
    async fn mirror_workers(
        &self,
        parent_mission_id: &str,
        deployment_id: &str,
        workers: &[WorkerSpawn],
    ) {
        if workers.is_empty() {
            return;
        }

        let master = match self.missions.ensure_master("Jason", deployment_id).await {
            Ok(master) => master,
            Err(e) => {
                warn!(error = %e, "could not ensure master agent for worker mirror");
                return;
            }
        };

        for worker in workers {
            let agent = Agent::new(worker.role.clone(), AgentType::Sub)
                .with_parent(master.id.clone())
                .with_deployment(deployment_id)
                .with_status(AgentStatus::Busy);

            let agent = match self.missions.create_agent(agent).await {
                Ok(agent) => agent,
                Err(e) => {
                    warn!(role = %worker.role, error = %e, "could not create worker agent");
                    continue;
                }
            };

            let title = match &worker.description {
                Some(description) => format!("{}: {description}", worker.role),
                None => format!("{}: {}", worker.role, worker.role.to_lowercase()),
            };
            let sub = Mission::new(title, worker.description.clone().unwrap_or_default())
                .with_parent(parent_mission_id)
                .with_agent(agent.id.clone());

            match self.missions.create_mission(sub).await {
                Ok(sub) => {
                    let _ =
                        self.missions.set_mission_status(&sub.id, MissionStatus::Active).await;
                }
                Err(e) => warn!(role = %worker.role, error = %e, "could not create sub-mission"),
            }
        }
    }
}

/// Short mission title from a task description.
fn task_title(task: &str) -> String {
    let line = task.lines().next().unwrap_or(task).trim();
    if line.chars().count() <= 80 {
        line.to_string()
    } else {
        let truncated: String = line.chars().take(80).collect();
        format!("{truncated}…")
    }
}

/// Count `{"status":"accepted","childSessionKey":...}` tool-output markers.
pub fn count_spawn_markers(messages: &[Value]) -> usize {
    messages.iter().filter(|m| spawn_role(m).is_some()).count()
}

/// Extract the spawn role from one tool-output message, if it is a spawn
/// acknowledgement. `childSessionKey` has the shape
/// `agent:<role>:subagent:<uuid>`.
fn spawn_role(message: &Value) -> Option<String> {
    let text = message_text(message);
    if !text.contains("\"status\":\"accepted\"") && !text.contains("\"status\": \"accepted\"") {
        return None;
    }
    let parsed: Value = serde_json::from_str(text.trim()).ok()?;
    if parsed.get("status").and_then(Value::as_str) != Some("accepted") {
        return None;
    }
    let child_key = parsed.get("childSessionKey").and_then(Value::as_str)?;
    let mut parts = child_key.split(':');
    let (prefix, role) = (parts.next()?, parts.next()?);
    if prefix != "agent" {
        return None;
    }
    Some(role.to_string())
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn known_role(role: &str) -> bool {
    KNOWN_ROLES.contains(&role.to_lowercase().as_str())
}

fn text_extraction_regexes() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        let roles = KNOWN_ROLES
            .iter()
            .map(|r| regex::escape(r))
            .collect::<Vec<_>>()
            .join("|");
        [
            // Strategy 1: "Launched Researcher session", "Spawning QA sub-agent"
            Regex::new(r"(?i)\b(?:Launched|Spawn(?:ing)?)\s+([A-Za-z][\w/-]*)\s+(?:session|sub-agent)")
                .expect("valid spawn regex"),
            // Strategy 2: "Researcher (dig into the crash logs)"
            Regex::new(&format!(r"(?i)\b({roles})\s*\(([^)]+)\)")).expect("valid role regex"),
            // Strategy 3: "Delegating to a researcher sub-agent"
            Regex::new(r"(?i)Delegating to a (\w+) sub-agent").expect("valid delegation regex"),
        ]
    })
}

/// Extract workers spawned by our message.
///
/// Strategy 0 (primary) counts new tool-output spawn markers beyond the
/// baseline; strategies 1-3 pull named workers out of the response text;
/// strategy 4 falls back to marker-derived roles when spawns happened but
/// the text named nobody.
pub fn extract_workers(
    response: &str,
    messages: &[Value],
    baseline_spawns: usize,
) -> Vec<WorkerSpawn> {
    // Strategy 0: spawn markers past the baseline.
    let spawn_roles: Vec<String> = messages
        .iter()
        .filter_map(spawn_role)
        .skip(baseline_spawns)
        .collect();

    // Strategies 1-3: named workers from the text.
    let mut named: Vec<WorkerSpawn> = Vec::new();
    let mut push_named = |role: &str, description: Option<String>| {
        let role = if known_role(role) { capitalize(&role.to_lowercase()) } else { return };
        if named.iter().any(|w| w.role == role) {
            return;
        }
        named.push(WorkerSpawn { role, description });
    };

    let [spawn_re, role_re, delegate_re] = text_extraction_regexes();
    for capture in spawn_re.captures_iter(response) {
        push_named(&capture[1], None);
    }
    for capture in role_re.captures_iter(response) {
        push_named(&capture[1], Some(capture[2].trim().to_string()));
    }
    for capture in delegate_re.captures_iter(response) {
        push_named(&capture[1], None);
    }

    if !spawn_roles.is_empty() && named.is_empty() {
        // Strategy 4: generic entries named after the marker roles.
        return spawn_roles
            .iter()
            .enumerate()
            .map(|(index, role)| WorkerSpawn {
                role: if known_role(role) {
                    capitalize(&role.to_lowercase())
                } else {
                    format!("Worker-{}", index + 1)
                },
                description: None,
            })
            .collect();
    }
    named
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_mention_standalone_token() {
        assert!(is_mention("@jason build the login page"));
        assert!(is_mention("hey @Jason can you help"));
        assert!(is_mention("hey @JASON"));
        assert!(!is_mention("email me at x@jasonmail.com"));
        assert!(!is_mention("jason should do it"));
    }

    #[test]
    fn test_strip_mention() {
        assert_eq!(strip_mention("@jason build the login page"), "build the login page");
        assert_eq!(strip_mention("please @Jason fix CI"), "please fix CI");
    }

    fn spawn_message(role: &str) -> Value {
        json!({
            "role": "assistant",
            "content": format!(
                "{{\"status\":\"accepted\",\"childSessionKey\":\"agent:{role}:subagent:123e4567-e89b-12d3-a456-426614174000\",\"runId\":\"r1\"}}"
            )
        })
    }

    #[test]
    fn test_count_spawn_markers() {
        let messages = vec![
            json!({"role": "user", "content": "go"}),
            spawn_message("researcher"),
            spawn_message("qa"),
            json!({"role": "assistant", "model": "m", "content": "working on it"}),
        ];
        assert_eq!(count_spawn_markers(&messages), 2);
    }

    #[test]
    fn test_strategy0_with_baseline() {
        let messages = vec![
            spawn_message("researcher"), // pre-existing
            spawn_message("qa"),         // ours
            spawn_message("tester"),     // ours
        ];
        let workers = extract_workers("did some work", &messages, 1);
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].role, "Qa");
        assert_eq!(workers[1].role, "Tester");
    }

    #[test]
    fn test_strategy0_unknown_role_becomes_worker_n() {
        let messages = vec![spawn_message("mystery")];
        let workers = extract_workers("done", &messages, 0);
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].role, "Worker-1");
    }

    #[test]
    fn test_strategy1_launched_session() {
        let workers = extract_workers("Launched Researcher session to dig in.", &[], 0);
        assert_eq!(workers, vec![WorkerSpawn { role: "Researcher".to_string(), description: None }]);

        let workers = extract_workers("Spawning tester sub-agent now", &[], 0);
        assert_eq!(workers[0].role, "Tester");
    }

    #[test]
    fn test_strategy2_role_with_description() {
        let workers = extract_workers("I'll use Researcher (crash log analysis) for this.", &[], 0);
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].role, "Researcher");
        assert_eq!(workers[0].description.as_deref(), Some("crash log analysis"));
    }

    #[test]
    fn test_strategy3_delegating() {
        let workers = extract_workers("Delegating to a debugger sub-agent.", &[], 0);
        assert_eq!(workers[0].role, "Debugger");
    }

    #[test]
    fn test_named_workers_win_over_generic() {
        let messages = vec![spawn_message("researcher")];
        let workers =
            extract_workers("Launched Researcher session for the analysis", &messages, 0);
        assert_eq!(workers.len(), 1);
        assert_eq!(workers[0].role, "Researcher");
    }

    #[test]
    fn test_unknown_text_roles_are_ignored() {
        let workers = extract_workers("Launched Wizard session", &[], 0);
        assert!(workers.is_empty());
    }

    #[test]
    fn test_task_title_truncation() {
        assert_eq!(task_title("short task"), "short task");
        let long = "t".repeat(100);
        assert!(task_title(&long).chars().count() <= 81);
    }
}
