//! Gateway probe CLI handlers.

use anyhow::Result;

use crate::infrastructure::gateway::GatewayClientPool;

pub async fn handle_status(pool: &GatewayClientPool, deployment_id: &str, json: bool) -> Result<()> {
    let client = pool.get(deployment_id).await?;
    let status = client.status().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("Gateway {deployment_id} status:");
        println!("{}", serde_json::to_string_pretty(&status)?);
        if let Some(hello) = client.hello() {
            if let Some(version) = hello.pointer("/server/version") {
                println!("server version: {version}");
            }
        }
    }
    Ok(())
}

pub async fn handle_health(pool: &GatewayClientPool, deployment_id: &str, json: bool) -> Result<()> {
    match pool.get(deployment_id).await {
        Ok(client) => match client.health().await {
            Ok(health) => {
                if json {
                    println!("{}", serde_json::json!({"ok": true, "health": health}));
                } else {
                    println!("Gateway {deployment_id} healthy");
                }
            }
            Err(e) => {
                if json {
                    println!("{}", serde_json::json!({"ok": false, "error": e.to_string()}));
                } else {
                    println!("Gateway {deployment_id} unhealthy: {e}");
                }
            }
        },
        Err(e) => {
            if json {
                println!("{}", serde_json::json!({"ok": false, "error": e.to_string()}));
            } else {
                println!("Gateway {deployment_id} unreachable: {e}");
            }
        }
    }
    Ok(())
}
