//! LLM provider CLI handlers.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::infrastructure::llm::{LlmProvider, LlmRouter};

pub async fn handle_test(router: &LlmRouter, json: bool) -> Result<()> {
    let probe = router.test_connection().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&probe)?);
        return Ok(());
    }

    if probe.ok {
        println!("Provider reachable; {} model(s):", probe.models.len());
        for model in probe.models.iter().take(20) {
            println!("  {model}");
        }
    } else {
        println!("Provider check failed: {}", probe.error.unwrap_or_default());
    }
    Ok(())
}

pub async fn handle_switch(
    router: &LlmRouter,
    provider: &str,
    fields: HashMap<String, String>,
    json: bool,
) -> Result<()> {
    let provider = LlmProvider::parse_str(provider)
        .ok_or_else(|| anyhow!("unknown provider '{provider}' (openrouter|runpod|custom)"))?;

    router.switch_provider(provider, fields).await?;
    let configured = router.is_configured().await;

    if json {
        println!(
            "{}",
            serde_json::json!({"provider": provider.as_str(), "configured": configured})
        );
    } else {
        println!("Switched to {}", provider.as_str());
        if !configured {
            println!("warning: provider is missing required fields");
        }
    }
    Ok(())
}
