//! LLM-powered task planning.
//!
//! Builds the planning prompt (expert catalog + repository file tree + the
//! user request), calls the router for JSON, and parses the result into a
//! dependency-ordered plan. A parse failure after the router's strict retry
//! degrades to a single-subtask plan rather than failing the run.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::domain::error::PlanError;
use crate::domain::models::{is_complex_task, ExpertTemplate, Plan, PlanSubtask};
use crate::infrastructure::llm::{ChatMessage, LlmRouter};

/// File-tree excerpt cap in the planning prompt.
const MAX_FILE_TREE_BYTES: usize = 64 * 1024;

/// Sampling temperature for planning.
const PLAN_TEMPERATURE: f32 = 0.3;

/// Token budget for the plan response.
const PLAN_MAX_TOKENS: u32 = 4096;

pub struct Planner {
    llm: Arc<LlmRouter>,
    model: String,
}

impl Planner {
    pub fn new(llm: Arc<LlmRouter>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    /// Produce a plan for the task. Never fails: LLM or parse trouble falls
    /// back to the single-subtask plan.
    pub async fn plan(&self, task: &str, file_tree: Option<&str>) -> Plan {
        match self.plan_with_llm(task, file_tree).await {
            Ok(plan) => plan,
            Err(e) => {
                warn!(error = %e, "planning failed, using single-subtask fallback");
                Plan::single_subtask(task)
            }
        }
    }

    async fn plan_with_llm(&self, task: &str, file_tree: Option<&str>) -> Result<Plan, PlanError> {
        let prompt = build_planning_prompt(task, file_tree);
        let value = self
            .llm
            .chat_json(
                &self.model,
                &[ChatMessage::user(prompt)],
                PLAN_TEMPERATURE,
                PLAN_MAX_TOKENS,
                None,
            )
            .await?;

        let plan = parse_plan(&value)?;
        plan.validate().map_err(PlanError::ParseFailed)?;
        Ok(plan)
    }
}

/// Build the planning prompt.
pub fn build_planning_prompt(task: &str, file_tree: Option<&str>) -> String {
    let catalog = ExpertTemplate::all()
        .iter()
        .map(|t| format!("- {}: {}", t.as_str(), t.description()))
        .collect::<Vec<_>>()
        .join("\n");

    let tree_section = match file_tree {
        Some(tree) => format!("\n## Repository Layout\n{}\n", truncate_tree(tree)),
        None => String::new(),
    };

    format!(
        r#"You are the planning stage of a coding-agent control plane.

## Expert Agent Types
{catalog}
{tree_section}
## Task
{task}

## Instructions
Decompose the task into subtasks, each executable by one expert agent in a
single session. Use depends_on to order subtasks; leave it empty when they
can run in parallel.

## Required Output Format (JSON)
```json
{{
  "analysis": "Brief analysis of the task",
  "subtasks": [
    {{
      "id": "subtask-1",
      "description": "What this subtask does",
      "agent_type": "fullstack|frontend|backend|database|devops|qa",
      "depends_on": []
    }}
  ]
}}
```

IMPORTANT: Output ONLY the JSON object, no other text."#
    )
}

/// Truncate the file tree to the prompt budget at a char boundary.
fn truncate_tree(tree: &str) -> &str {
    if tree.len() <= MAX_FILE_TREE_BYTES {
        return tree;
    }
    let mut end = MAX_FILE_TREE_BYTES;
    while !tree.is_char_boundary(end) {
        end -= 1;
    }
    &tree[..end]
}

/// Parse the LLM's JSON into a plan. Unknown agent types fall back to a
/// keyword match on the subtask description; missing ids are synthesized.
pub fn parse_plan(value: &Value) -> Result<Plan, PlanError> {
    let analysis = value
        .get("analysis")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let raw_subtasks = value
        .get("subtasks")
        .and_then(Value::as_array)
        .ok_or_else(|| PlanError::ParseFailed("missing subtasks array".to_string()))?;

    if raw_subtasks.is_empty() {
        return Err(PlanError::ParseFailed("empty subtasks array".to_string()));
    }

    let mut subtasks = Vec::with_capacity(raw_subtasks.len());
    for (index, raw) in raw_subtasks.iter().enumerate() {
        let description = raw
            .get("description")
            .and_then(Value::as_str)
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| {
                PlanError::ParseFailed(format!("subtask {index} has no description"))
            })?
            .to_string();

        let id = raw
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map_or_else(|| format!("subtask-{}", index + 1), ToString::to_string);

        let agent_type = raw
            .get("agent_type")
            .and_then(Value::as_str)
            .and_then(ExpertTemplate::parse_str)
            .unwrap_or_else(|| ExpertTemplate::keyword_match(&description));

        let depends_on = raw
            .get("depends_on")
            .and_then(Value::as_array)
            .map(|deps| {
                deps.iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();

        subtasks.push(PlanSubtask { id, description, agent_type, depends_on });
    }

    Ok(Plan { analysis, subtasks })
}

/// Wrap a complex task with the delegation instructions the remote master
/// needs to spawn one sub-session per subtask.
pub fn delegation_prompt(task: &str) -> String {
    format!(
        "This is a multi-part task. Break it into subtasks and call \
         sessions_spawn once per subtask so each runs in its own expert \
         sub-agent session. Report which sub-agents you launched, then \
         coordinate their results.\n\nTask: {task}"
    )
}

/// Whether the delegation wrap applies.
pub fn needs_delegation(task: &str) -> bool {
    is_complex_task(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plan_full() {
        let value = json!({
            "analysis": "Two-stage build",
            "subtasks": [
                {"id": "s1", "description": "Create the endpoint", "agent_type": "backend", "depends_on": []},
                {"id": "s2", "description": "Write tests", "agent_type": "qa", "depends_on": ["s1"]}
            ]
        });
        let plan = parse_plan(&value).unwrap();
        assert_eq!(plan.analysis, "Two-stage build");
        assert_eq!(plan.subtasks.len(), 2);
        assert_eq!(plan.subtasks[1].depends_on, vec!["s1"]);
        assert!(plan.validate().is_ok());
    }

    #[test]
    fn test_parse_plan_unknown_agent_type_falls_back() {
        let value = json!({
            "analysis": "",
            "subtasks": [
                {"id": "s1", "description": "Write a schema migration", "agent_type": "wizard", "depends_on": []}
            ]
        });
        let plan = parse_plan(&value).unwrap();
        assert_eq!(plan.subtasks[0].agent_type, ExpertTemplate::Database);
    }

    #[test]
    fn test_parse_plan_synthesizes_missing_ids() {
        let value = json!({
            "subtasks": [
                {"description": "Do the thing", "agent_type": "fullstack"}
            ]
        });
        let plan = parse_plan(&value).unwrap();
        assert_eq!(plan.subtasks[0].id, "subtask-1");
    }

    #[test]
    fn test_parse_plan_rejects_missing_subtasks() {
        assert!(parse_plan(&json!({"analysis": "no tasks"})).is_err());
        assert!(parse_plan(&json!({"subtasks": []})).is_err());
    }

    #[test]
    fn test_prompt_contains_catalog_and_task() {
        let prompt = build_planning_prompt("Add OAuth login", Some("src/\n  main.rs\n"));
        assert!(prompt.contains("fullstack"));
        assert!(prompt.contains("Add OAuth login"));
        assert!(prompt.contains("main.rs"));
        assert!(prompt.contains("ONLY the JSON object"));
    }

    #[test]
    fn test_file_tree_truncation() {
        let tree = "x".repeat(MAX_FILE_TREE_BYTES + 1000);
        let prompt = build_planning_prompt("task", Some(&tree));
        assert!(prompt.len() < tree.len() + 2000);
    }

    #[test]
    fn test_delegation_prompt_mentions_sessions_spawn() {
        let wrapped = delegation_prompt("Build a REST API with authentication");
        assert!(wrapped.contains("sessions_spawn"));
        assert!(wrapped.ends_with("Build a REST API with authentication"));
    }
}
