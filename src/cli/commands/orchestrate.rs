//! Orchestration CLI handlers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::domain::models::{Mission, MissionSource, OrchestratorStatus};
use crate::services::{MissionService, Orchestrator};

/// Submit a task and follow it until it finishes.
pub async fn handle_submit(
    orchestrator: &Arc<Orchestrator>,
    missions: &MissionService,
    description: &str,
    deployment_id: &str,
    with_mission: bool,
    json: bool,
) -> Result<()> {
    let mission_id = if with_mission {
        let mission = missions
            .create_mission(
                Mission::new(description, description).with_source(MissionSource::Orchestrate),
            )
            .await?;
        Some(mission.id)
    } else {
        None
    };

    let task_id = Arc::clone(orchestrator)
        .submit_task(description, deployment_id, mission_id, None)
        .await;
    if !json {
        println!("Submitted orchestrator task {task_id}");
    }

    // Follow the run to completion; the worker is detached.
    loop {
        tokio::time::sleep(Duration::from_secs(2)).await;
        let Some(task) = orchestrator.get_task(&task_id).await else {
            return Err(anyhow!("task {task_id} disappeared"));
        };
        if task.status.is_terminal() {
            if json {
                println!("{}", serde_json::to_string_pretty(&task)?);
            } else {
                print_task(&task);
            }
            return Ok(());
        }
        if !json {
            println!(
                "  {} ({}/{} subtasks done)",
                task.status.as_str(),
                task.completed_count(),
                task.subtasks.len()
            );
        }
    }
}

pub async fn handle_show(
    orchestrator: &Arc<Orchestrator>,
    task_id: &str,
    json: bool,
) -> Result<()> {
    let task = orchestrator
        .get_task(task_id)
        .await
        .ok_or_else(|| anyhow!("unknown task {task_id}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
    } else {
        print_task(&task);
    }
    Ok(())
}

pub async fn handle_cancel(
    orchestrator: &Arc<Orchestrator>,
    task_id: &str,
    json: bool,
) -> Result<()> {
    let cancelled = orchestrator.cancel(task_id).await;
    if json {
        println!("{}", serde_json::json!({"task": task_id, "cancelled": cancelled}));
    } else if cancelled {
        println!("Cancellation requested for {task_id}");
    } else {
        println!("No running task {task_id}");
    }
    Ok(())
}

fn print_task(task: &crate::domain::models::OrchestratorTask) {
    let status = match task.status {
        OrchestratorStatus::Completed => console::style(task.status.as_str()).green(),
        OrchestratorStatus::Failed => console::style(task.status.as_str()).red(),
        _ => console::style(task.status.as_str()).yellow(),
    };
    println!("Task {} [{status}]", task.id);
    println!("  {}", task.description);
    for subtask in &task.subtasks {
        println!(
            "  - {} [{}] {}",
            subtask.id,
            subtask.status.as_str(),
            subtask.agent_type.as_str()
        );
    }
    if task.status == OrchestratorStatus::Completed {
        if let Some(result) = &task.final_result {
            println!("\n{result}");
        }
    }
    if task.status == OrchestratorStatus::Failed {
        for log in task.logs.iter().rev().take(5) {
            println!("  log: {}", log.message);
        }
    }
}
