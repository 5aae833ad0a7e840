//! Mission board and team chat CLI handlers.

use anyhow::{anyhow, Result};
use comfy_table::Table;

use crate::domain::models::MissionStatus;
use crate::services::{MissionService, TeamChatService};

pub async fn handle_mission_list(
    missions: &MissionService,
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    let status = match status {
        Some(s) => {
            Some(MissionStatus::parse_str(s).ok_or_else(|| anyhow!("unknown status '{s}'"))?)
        }
        None => None,
    };

    let list = missions.list_missions(status).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["id", "status", "priority", "source", "title"]);
    for mission in &list {
        table.add_row(vec![
            mission.id.clone(),
            mission.status.as_str().to_string(),
            mission.priority.as_str().to_string(),
            mission.source.as_str().to_string(),
            mission.title.clone(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn handle_mission_show(missions: &MissionService, id: &str, json: bool) -> Result<()> {
    let mission = missions.get_mission(id).await?;
    let children = missions.list_children(id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({"mission": mission, "children": children})
        );
        return Ok(());
    }

    println!("Mission {} [{}] {}", mission.id, mission.status.as_str(), mission.title);
    if !mission.description.is_empty() {
        println!("  {}", mission.description);
    }
    if let Some(review) = mission.review_status {
        println!("  review: {}", review.as_str());
    }
    for child in &children {
        println!(
            "  - {} [{}] {}{}",
            child.id,
            child.status.as_str(),
            child.title,
            child
                .review_status
                .map(|r| format!(" (review: {})", r.as_str()))
                .unwrap_or_default()
        );
    }
    Ok(())
}

pub async fn handle_chat_log(chat: &TeamChatService, mission_id: &str, json: bool) -> Result<()> {
    let messages = chat.list(mission_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&messages)?);
        return Ok(());
    }

    for message in &messages {
        println!(
            "[{}] {} ({}): {}",
            message.created_at.format("%H:%M:%S"),
            message.sender,
            message.role.as_str(),
            message.content
        );
    }
    Ok(())
}
