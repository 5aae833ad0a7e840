//! Expert templates and structured plans.
//!
//! The planner decomposes a task into subtasks, each assigned to one of a
//! fixed catalog of six expert templates. The same catalog backs the
//! keyword fallback when the LLM plan does not parse.

use serde::{Deserialize, Serialize};

/// One of the six expert agent templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertTemplate {
    Fullstack,
    Frontend,
    Backend,
    Database,
    Devops,
    Qa,
}

impl Default for ExpertTemplate {
    fn default() -> Self {
        Self::Fullstack
    }
}

impl ExpertTemplate {
    /// All templates, in catalog order.
    pub fn all() -> &'static [ExpertTemplate] {
        &[
            Self::Fullstack,
            Self::Frontend,
            Self::Backend,
            Self::Database,
            Self::Devops,
            Self::Qa,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fullstack => "fullstack",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Database => "database",
            Self::Devops => "devops",
            Self::Qa => "qa",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fullstack" | "full-stack" | "full_stack" => Some(Self::Fullstack),
            "frontend" | "front-end" => Some(Self::Frontend),
            "backend" | "back-end" => Some(Self::Backend),
            "database" | "db" => Some(Self::Database),
            "devops" | "dev-ops" | "infra" => Some(Self::Devops),
            "qa" | "test" | "testing" => Some(Self::Qa),
            _ => None,
        }
    }

    /// Short description used in the planning prompt.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Fullstack => "general-purpose engineer; end-to-end features across the stack",
            Self::Frontend => "UI work: components, styling, state management, accessibility",
            Self::Backend => "APIs, services, business logic, integrations",
            Self::Database => "schema design, migrations, queries, data modeling",
            Self::Devops => "build, deploy, containers, CI/CD, infrastructure",
            Self::Qa => "tests, verification, regression coverage, quality gates",
        }
    }

    /// System prompt used when executing a subtask as this expert.
    pub fn system_prompt(&self) -> String {
        format!(
            "You are an expert {} agent. {}. Work autonomously, be concrete, \
             and report exactly what you did and what remains.",
            self.as_str(),
            self.description()
        )
    }

    /// Map a free-text task to the best-matching template by keyword hits.
    /// Defaults to `Fullstack` when nothing matches.
    pub fn keyword_match(task: &str) -> Self {
        let lower = task.to_lowercase();
        let scored: &[(ExpertTemplate, &[&str])] = &[
            (Self::Frontend, &["frontend", "react", "ui", "css", "component", "page"]),
            (Self::Backend, &["backend", "api", "endpoint", "server", "service", "rest"]),
            (Self::Database, &["database", "schema", "migration", "sql", "query", "table"]),
            (Self::Devops, &["docker", "deploy", "ci", "pipeline", "kubernetes", "compose"]),
            (Self::Qa, &["test", "qa", "verify", "coverage", "regression"]),
        ];

        let mut best = Self::Fullstack;
        let mut best_hits = 0usize;
        for (template, keywords) in scored {
            let hits = keywords.iter().filter(|k| lower.contains(*k)).count();
            if hits > best_hits {
                best_hits = hits;
                best = *template;
            }
        }
        best
    }
}

/// Keyword set that marks a task as complex enough for delegation.
const COMPLEX_KEYWORDS: &[&str] = &[
    "rest api",
    "authentication",
    "database",
    "unit test",
    "crud",
    "frontend",
    "backend",
    "docker",
    "deployment",
    "migration",
    "websocket",
    "integration",
];

/// Length beyond which a task is complex regardless of keywords.
const COMPLEX_LENGTH: usize = 200;

/// A task is "complex" when at least two keywords hit or it is long.
/// Complex tasks get the delegation prompt so the remote master spawns
/// sub-sessions per subtask.
pub fn is_complex_task(task: &str) -> bool {
    if task.len() > COMPLEX_LENGTH {
        return true;
    }
    let lower = task.to_lowercase();
    COMPLEX_KEYWORDS.iter().filter(|k| lower.contains(*k)).count() >= 2
}

/// One planned subtask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSubtask {
    /// Plan-local id (e.g. "subtask-1")
    pub id: String,
    /// What needs to be done
    pub description: String,
    /// Expert template to execute as
    pub agent_type: ExpertTemplate,
    /// Plan-local ids this subtask waits on
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// A structured plan produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Prose analysis of the request
    pub analysis: String,
    /// Dependency-ordered subtasks
    pub subtasks: Vec<PlanSubtask>,
}

impl Plan {
    /// The degenerate one-subtask plan used when LLM planning fails.
    pub fn single_subtask(task: &str) -> Self {
        Self {
            analysis: "Fallback plan: executing the task as a single subtask.".to_string(),
            subtasks: vec![PlanSubtask {
                id: "subtask-1".to_string(),
                description: task.to_string(),
                agent_type: ExpertTemplate::keyword_match(task),
                depends_on: vec![],
            }],
        }
    }

    /// Validate that every `depends_on` entry names a known subtask and the
    /// edges form a DAG (no cycles).
    pub fn validate(&self) -> Result<(), String> {
        use std::collections::{HashMap, HashSet};

        let ids: HashSet<&str> = self.subtasks.iter().map(|s| s.id.as_str()).collect();
        if ids.len() != self.subtasks.len() {
            return Err("duplicate subtask ids in plan".to_string());
        }
        for sub in &self.subtasks {
            for dep in &sub.depends_on {
                if !ids.contains(dep.as_str()) {
                    return Err(format!("subtask {} depends on unknown id {}", sub.id, dep));
                }
            }
        }

        // Kahn's algorithm; leftover nodes mean a cycle.
        let mut indegree: HashMap<&str, usize> = self
            .subtasks
            .iter()
            .map(|s| (s.id.as_str(), s.depends_on.len()))
            .collect();
        let mut queue: Vec<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = queue.pop() {
            visited += 1;
            for sub in &self.subtasks {
                if sub.depends_on.iter().any(|d| d == id) {
                    let d = indegree.get_mut(sub.id.as_str()).expect("known id");
                    *d -= 1;
                    if *d == 0 {
                        queue.push(sub.id.as_str());
                    }
                }
            }
        }
        if visited != self.subtasks.len() {
            return Err("dependency cycle in plan".to_string());
        }
        Ok(())
    }
}
