//! Mention CLI handler: the same path the Telegram bridge drives.

use anyhow::{anyhow, Result};

use crate::services::{is_mention, MentionRouter};

pub async fn handle_mention(
    router: &MentionRouter,
    message: &str,
    session_key: &str,
    deployment_id: &str,
    json: bool,
) -> Result<()> {
    if !is_mention(message) {
        return Err(anyhow!("message does not mention @jason"));
    }

    let reply = router.handle_mention(message, session_key, deployment_id).await?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "mission_id": reply.mission_id,
                "response": reply.response,
                "workers": reply.workers.iter().map(|w| w.role.clone()).collect::<Vec<_>>(),
            })
        );
        return Ok(());
    }

    println!("{}", reply.response);
    if !reply.workers.is_empty() {
        println!("\nworkers spawned:");
        for worker in &reply.workers {
            match &worker.description {
                Some(description) => println!("  {}: {description}", worker.role),
                None => println!("  {}", worker.role),
            }
        }
    }
    println!("\nmission {} (completion monitor running)", reply.mission_id);
    Ok(())
}
