//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "clawdeck", version, about = "Control plane for OpenClaw gateway deployments")]
pub struct Cli {
    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage gateway deployments
    #[command(subcommand)]
    Deploy(DeployCommands),

    /// Probe a deployment's gateway
    #[command(subcommand)]
    Gateway(GatewayCommands),

    /// LLM provider configuration
    #[command(subcommand)]
    Llm(LlmCommands),

    /// Orchestration runs
    #[command(subcommand)]
    Orchestrate(OrchestrateCommands),

    /// Mission board
    #[command(subcommand)]
    Mission(MissionCommands),

    /// Team chat streams
    #[command(subcommand)]
    Chat(ChatCommands),

    /// Route an incoming @jason mention (the Telegram bridge path)
    Mention {
        /// The raw chat message containing the mention
        message: String,
        /// Gateway session key to converse on
        #[arg(long, default_value = "main")]
        session: String,
        /// Master deployment id (defaults to the designated master)
        #[arg(long, env = "CLAWDECK_DEPLOYMENT")]
        deployment: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum DeployCommands {
    /// Create a new deployment directory + .env
    Configure {
        /// Extra env entries as KEY=VALUE (provider keys etc.)
        #[arg(long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,
    },
    /// Start a deployment's containers
    Launch { id: String },
    /// Stop a deployment's containers
    Stop { id: String },
    /// Recreate containers so env changes take effect
    Restart { id: String },
    /// Tear down and delete a deployment
    Remove { id: String },
    /// Descriptor plus masked env
    Info { id: String },
    /// All tracked deployments
    List,
    /// Rewrite .env keys (restart to apply)
    UpdateEnv {
        id: String,
        #[arg(long = "set", value_name = "KEY=VALUE", required = true)]
        set: Vec<String>,
    },
    /// Tail a deployment's container logs
    Logs {
        id: String,
        #[arg(long, default_value_t = 100)]
        tail: u32,
    },
    /// Designate the master deployment ("" clears)
    SetMaster { id: String },
    /// Rescan deployments/* from disk
    Restore,
}

#[derive(Subcommand)]
pub enum GatewayCommands {
    /// Connect and fetch gateway status
    Status { deployment_id: String },
    /// Connect and run the gateway health RPC
    Health { deployment_id: String },
}

#[derive(Subcommand)]
pub enum LlmCommands {
    /// Probe the active provider (GET /models)
    Test,
    /// Switch the active provider and persist its keys
    Switch {
        /// openrouter | runpod | custom
        provider: String,
        /// Provider fields as KEY=VALUE
        #[arg(long = "field", value_name = "KEY=VALUE")]
        field: Vec<String>,
    },
}

#[derive(Subcommand)]
pub enum OrchestrateCommands {
    /// Submit a task to the orchestrator
    Submit {
        /// Task description
        description: String,
        /// Master deployment id (defaults to the designated master)
        #[arg(long, env = "CLAWDECK_DEPLOYMENT")]
        deployment: Option<String>,
        /// Create and link a mission on the board
        #[arg(long)]
        mission: bool,
    },
    /// Show one orchestrator task
    Show { task_id: String },
    /// Cancel a running task
    Cancel { task_id: String },
}

#[derive(Subcommand)]
pub enum MissionCommands {
    /// List missions, optionally by status
    List {
        #[arg(long)]
        status: Option<String>,
    },
    /// Show one mission with its children
    Show { id: String },
}

#[derive(Subcommand)]
pub enum ChatCommands {
    /// Print a mission's team chat
    Log { mission_id: String },
}

/// Parse repeated KEY=VALUE args into a map.
pub fn parse_kv_pairs(pairs: &[String]) -> anyhow::Result<std::collections::HashMap<String, String>> {
    let mut map = std::collections::HashMap::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{pair}'"))?;
        map.insert(key.to_string(), value.to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_kv_pairs() {
        let map = parse_kv_pairs(&[
            "OPENROUTER_API_KEY=sk-1".to_string(),
            "CUSTOM_LLM_BASE_URL=http://h/v1?x=y".to_string(),
        ])
        .unwrap();
        assert_eq!(map.get("OPENROUTER_API_KEY").map(String::as_str), Some("sk-1"));
        // Value keeps everything after the first '='
        assert_eq!(
            map.get("CUSTOM_LLM_BASE_URL").map(String::as_str),
            Some("http://h/v1?x=y")
        );

        assert!(parse_kv_pairs(&["not-a-pair".to_string()]).is_err());
    }
}
