//! Deployment CLI handlers.

use std::collections::HashMap;

use anyhow::Result;
use comfy_table::Table;

use crate::infrastructure::deploy::DeploymentManager;

pub async fn handle_configure(
    manager: &DeploymentManager,
    env: HashMap<String, String>,
    json: bool,
) -> Result<()> {
    let deployment = manager.configure(env).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&deployment)?);
    } else {
        println!(
            "Configured deployment {} ({}) on port {}",
            deployment.id, deployment.name, deployment.port
        );
        println!("  dir: {}", deployment.deploy_dir.display());
    }
    Ok(())
}

pub async fn handle_launch(manager: &DeploymentManager, id: &str, json: bool) -> Result<()> {
    manager.launch(id).await?;
    report_status(manager, id, json).await
}

pub async fn handle_stop(manager: &DeploymentManager, id: &str, json: bool) -> Result<()> {
    manager.stop(id).await?;
    report_status(manager, id, json).await
}

pub async fn handle_restart(manager: &DeploymentManager, id: &str, json: bool) -> Result<()> {
    manager.restart(id).await?;
    report_status(manager, id, json).await
}

pub async fn handle_remove(manager: &DeploymentManager, id: &str, json: bool) -> Result<()> {
    manager.remove(id).await?;
    if json {
        println!("{}", serde_json::json!({"removed": id}));
    } else {
        println!("Removed deployment {id}");
    }
    Ok(())
}

pub async fn handle_info(manager: &DeploymentManager, id: &str, json: bool) -> Result<()> {
    let info = manager.info(id).await?;
    if json {
        // The masked view; raw values stay off the wire unless asked for.
        println!(
            "{}",
            serde_json::json!({
                "deployment": info.deployment,
                "env_config": info.env_config,
            })
        );
        return Ok(());
    }

    let deployment = &info.deployment;
    println!("Deployment {} ({})", deployment.id, deployment.name);
    println!("  status: {}", deployment.status.as_str());
    println!("  port:   {}", deployment.port);
    println!("  dir:    {}", deployment.deploy_dir.display());
    if let Some(error) = &deployment.last_error {
        println!("  error:  {error}");
    }
    println!("  env:");
    let mut keys: Vec<&String> = info.env_config.keys().collect();
    keys.sort();
    for key in keys {
        println!("    {key}={}", info.env_config[key]);
    }
    Ok(())
}

pub async fn handle_list(manager: &DeploymentManager, json: bool) -> Result<()> {
    let deployments = manager.list().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&deployments)?);
        return Ok(());
    }

    let master = manager.master().await;
    let mut table = Table::new();
    table.set_header(vec!["id", "name", "port", "status", "master"]);
    for deployment in &deployments {
        table.add_row(vec![
            deployment.id.clone(),
            deployment.name.clone(),
            deployment.port.to_string(),
            deployment.status.as_str().to_string(),
            if master.as_deref() == Some(deployment.id.as_str()) { "*" } else { "" }.to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

pub async fn handle_update_env(
    manager: &DeploymentManager,
    id: &str,
    updates: HashMap<String, String>,
    json: bool,
) -> Result<()> {
    let keys: Vec<String> = updates.keys().cloned().collect();
    manager.update_env(id, updates).await?;
    if json {
        println!("{}", serde_json::json!({"updated": id, "keys": keys}));
    } else {
        println!("Updated {} key(s) in {id}/.env; run `deploy restart {id}` to apply", keys.len());
    }
    Ok(())
}

pub async fn handle_logs(
    manager: &DeploymentManager,
    id: &str,
    tail: u32,
    json: bool,
) -> Result<()> {
    let logs = manager.logs(id, tail).await?;
    if json {
        println!("{}", serde_json::json!({"id": id, "logs": logs}));
    } else {
        print!("{logs}");
    }
    Ok(())
}

pub async fn handle_set_master(manager: &DeploymentManager, id: &str, json: bool) -> Result<()> {
    manager.set_master(id).await?;
    if json {
        println!("{}", serde_json::json!({"master": manager.master().await}));
    } else if id.is_empty() {
        println!("Master designation cleared");
    } else {
        println!("Master deployment set to {id}");
    }
    Ok(())
}

pub async fn handle_restore(manager: &DeploymentManager, json: bool) -> Result<()> {
    manager.restore().await?;
    handle_list(manager, json).await
}

async fn report_status(manager: &DeploymentManager, id: &str, json: bool) -> Result<()> {
    if let Some(deployment) = manager.get(id).await {
        if json {
            println!("{}", serde_json::to_string_pretty(&deployment)?);
        } else {
            println!("Deployment {id}: {}", deployment.status.as_str());
        }
    }
    Ok(())
}
