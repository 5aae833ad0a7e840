//! Clawdeck CLI entry point.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use clawdeck::cli::{
    commands::{board, deploy, gateway, llm, mention, orchestrate},
    parse_kv_pairs, ChatCommands, Cli, Commands, DeployCommands, GatewayCommands, LlmCommands,
    MissionCommands, OrchestrateCommands,
};
use clawdeck::domain::ports::SubtaskExecutor;
use clawdeck::infrastructure::{
    config::ConfigLoader,
    database::{AgentRepositoryImpl, ChatRepositoryImpl, DatabaseConnection, MissionRepositoryImpl},
    deploy::DeploymentManager,
    gateway::{executor::GatewayExecutor, GatewayClientPool},
    llm::{LlmRouter, LlmSettings},
    logging,
};
use clawdeck::services::{
    CompletionMonitor, CompletionMonitorConfig, EventBus, MentionRouter, MissionService,
    Orchestrator, Planner, TeamChatService,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration and logging first; everything else depends on them.
    let config = ConfigLoader::load().context("Failed to load configuration")?;
    logging::init(&config.logging);

    // Database + migrations.
    let database_url = format!("sqlite:{}", config.database.path);
    if let Some(parent) = PathBuf::from(&config.database.path).parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }
    let db = DatabaseConnection::new(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run database migrations")?;

    // Repositories.
    let mission_repo = Arc::new(MissionRepositoryImpl::new(db.pool().clone()));
    let agent_repo = Arc::new(AgentRepositoryImpl::new(db.pool().clone()));
    let chat_repo = Arc::new(ChatRepositoryImpl::new(db.pool().clone()));

    // Core services.
    let bus = Arc::new(EventBus::default());
    let missions = Arc::new(MissionService::new(mission_repo, agent_repo, bus.clone()));
    let team_chat = Arc::new(TeamChatService::new(chat_repo, bus.clone()));

    // Deployments: scan-on-start rebuilds the in-memory map from disk.
    let manager = Arc::new(DeploymentManager::new(&config.deploy.root_dir));
    manager.restore().await.context("Failed to scan deployments")?;

    // LLM router: config settings, process env fills the gaps, switches
    // persist into the project-root .env.
    let env_settings = LlmSettings::from_env_map(&process_env());
    let settings = merge_settings(config.llm.clone(), env_settings);
    let root_env = PathBuf::from(&config.deploy.root_dir).join(".env");
    let llm_router = Arc::new(LlmRouter::new(settings, Some(root_env)));

    // Gateway plumbing + orchestrator.
    let pool = Arc::new(GatewayClientPool::new(manager.clone()));
    let executor: Arc<dyn SubtaskExecutor> = Arc::new(GatewayExecutor::new(pool.clone()));
    let planner = Planner::new(llm_router.clone(), config.orchestrator.model.clone());
    let orchestrator = Arc::new(Orchestrator::new(
        planner,
        llm_router.clone(),
        executor,
        missions.clone(),
        team_chat.clone(),
        config.orchestrator.model.clone(),
    ));

    let monitor = Arc::new(CompletionMonitor::new(
        pool.clone(),
        missions.clone(),
        team_chat.clone(),
        CompletionMonitorConfig {
            poll_interval: std::time::Duration::from_secs(config.orchestrator.monitor_poll_secs),
            ..Default::default()
        },
    ));
    let mention_router =
        MentionRouter::new(pool.clone(), missions.clone(), team_chat.clone(), monitor);

    let result = dispatch(
        cli,
        &manager,
        &pool,
        &llm_router,
        &orchestrator,
        &missions,
        &team_chat,
        &mention_router,
    )
    .await;

    // Close gateway sockets before the runtime tears down.
    pool.shutdown().await;
    db.close().await;
    result
}

#[allow(clippy::too_many_arguments)]
async fn dispatch(
    cli: Cli,
    manager: &Arc<DeploymentManager>,
    pool: &Arc<GatewayClientPool>,
    llm_router: &Arc<LlmRouter>,
    orchestrator: &Arc<Orchestrator>,
    missions: &Arc<MissionService>,
    team_chat: &Arc<TeamChatService>,
    mention_router: &MentionRouter,
) -> Result<()> {
    match cli.command {
        Commands::Deploy(command) => match command {
            DeployCommands::Configure { env } => {
                let env = parse_kv_pairs(&env)?;
                deploy::handle_configure(manager, env, cli.json).await
            }
            DeployCommands::Launch { id } => deploy::handle_launch(manager, &id, cli.json).await,
            DeployCommands::Stop { id } => deploy::handle_stop(manager, &id, cli.json).await,
            DeployCommands::Restart { id } => deploy::handle_restart(manager, &id, cli.json).await,
            DeployCommands::Remove { id } => deploy::handle_remove(manager, &id, cli.json).await,
            DeployCommands::Info { id } => deploy::handle_info(manager, &id, cli.json).await,
            DeployCommands::List => deploy::handle_list(manager, cli.json).await,
            DeployCommands::UpdateEnv { id, set } => {
                let updates = parse_kv_pairs(&set)?;
                deploy::handle_update_env(manager, &id, updates, cli.json).await
            }
            DeployCommands::Logs { id, tail } => {
                deploy::handle_logs(manager, &id, tail, cli.json).await
            }
            DeployCommands::SetMaster { id } => {
                deploy::handle_set_master(manager, &id, cli.json).await
            }
            DeployCommands::Restore => deploy::handle_restore(manager, cli.json).await,
        },
        Commands::Gateway(command) => match command {
            GatewayCommands::Status { deployment_id } => {
                gateway::handle_status(pool, &deployment_id, cli.json).await
            }
            GatewayCommands::Health { deployment_id } => {
                gateway::handle_health(pool, &deployment_id, cli.json).await
            }
        },
        Commands::Llm(command) => match command {
            LlmCommands::Test => llm::handle_test(llm_router, cli.json).await,
            LlmCommands::Switch { provider, field } => {
                let fields = parse_kv_pairs(&field)?;
                llm::handle_switch(llm_router, &provider, fields, cli.json).await
            }
        },
        Commands::Orchestrate(command) => match command {
            OrchestrateCommands::Submit { description, deployment, mission } => {
                let deployment_id = match deployment {
                    Some(id) => id,
                    None => manager.master().await.context(
                        "no master deployment designated; pass --deployment or run `deploy set-master`",
                    )?,
                };
                orchestrate::handle_submit(
                    orchestrator,
                    missions,
                    &description,
                    &deployment_id,
                    mission,
                    cli.json,
                )
                .await
            }
            OrchestrateCommands::Show { task_id } => {
                orchestrate::handle_show(orchestrator, &task_id, cli.json).await
            }
            OrchestrateCommands::Cancel { task_id } => {
                orchestrate::handle_cancel(orchestrator, &task_id, cli.json).await
            }
        },
        Commands::Mission(command) => match command {
            MissionCommands::List { status } => {
                board::handle_mission_list(missions, status.as_deref(), cli.json).await
            }
            MissionCommands::Show { id } => {
                board::handle_mission_show(missions, &id, cli.json).await
            }
        },
        Commands::Chat(command) => match command {
            ChatCommands::Log { mission_id } => {
                board::handle_chat_log(team_chat, &mission_id, cli.json).await
            }
        },
        Commands::Mention { message, session, deployment } => {
            let deployment_id = match deployment {
                Some(id) => id,
                None => manager.master().await.context(
                    "no master deployment designated; pass --deployment or run `deploy set-master`",
                )?,
            };
            mention::handle_mention(mention_router, &message, &session, &deployment_id, cli.json)
                .await
        }
    }
}

fn process_env() -> HashMap<String, String> {
    std::env::vars().collect()
}

/// Config wins; process env fills fields the config left unset.
fn merge_settings(config: LlmSettings, env: LlmSettings) -> LlmSettings {
    LlmSettings {
        provider: config.provider,
        openrouter_base_url: config.openrouter_base_url.or(env.openrouter_base_url),
        openrouter_api_key: config.openrouter_api_key.or(env.openrouter_api_key),
        runpod_api_key: config.runpod_api_key.or(env.runpod_api_key),
        runpod_endpoint_id: config.runpod_endpoint_id.or(env.runpod_endpoint_id),
        runpod_model_name: config.runpod_model_name.or(env.runpod_model_name),
        custom_llm_base_url: config.custom_llm_base_url.or(env.custom_llm_base_url),
        custom_llm_api_key: config.custom_llm_api_key.or(env.custom_llm_api_key),
        custom_llm_model_name: config.custom_llm_model_name.or(env.custom_llm_model_name),
    }
}
