// Semblance agent core
// Main entry point for the semblance binary

use clap::Parser;
use sdk::errors::{EngineError, ErrorExt};
use semblance_engine::cli::{AutonomyAction, Cli, Command, EscalationAction};
use semblance_engine::config::Config;
use semblance_engine::handlers::{
    handle_approve, handle_autonomy_set, handle_autonomy_show, handle_chat,
    handle_escalations_check, handle_escalations_list, handle_escalations_respond,
    handle_history, handle_log, handle_patterns, handle_pending, handle_reject, open_agent,
    OutputFormat,
};
use semblance_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the config file; RUST_LOG wins over both
    let log_level = cli.log.as_deref().unwrap_or(&config.core.log_level);
    init_telemetry_with_level(log_level);

    tracing::info!("Semblance v{}", env!("CARGO_PKG_VERSION"));

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    let (database, agent) = open_agent(&config).await?;

    let result = match cli.command {
        Command::Chat {
            message,
            conversation,
        } => handle_chat(&agent, &message, conversation.as_deref(), format).await,

        Command::History {
            conversation_id,
            limit,
        } => handle_history(&agent, conversation_id.as_deref(), limit, format).await,

        Command::Pending => handle_pending(&agent, format).await,

        Command::Approve { id } => handle_approve(&agent, &id, format).await,

        Command::Reject { id } => handle_reject(&agent, &id, format).await,

        Command::Log { limit } => handle_log(&agent, limit, format).await,

        Command::Patterns => handle_patterns(&agent, format).await,

        Command::Autonomy { action } => match action {
            AutonomyAction::Show => handle_autonomy_show(&agent, format).await,
            AutonomyAction::Set { domain, tier } => {
                handle_autonomy_set(&agent, domain, tier, format).await
            }
        },

        Command::Escalations { action } => match action {
            EscalationAction::Check => handle_escalations_check(&agent, format).await,
            EscalationAction::List => handle_escalations_list(&agent, format).await,
            EscalationAction::Respond { id, decision } => {
                handle_escalations_respond(&agent, &id, decision, format).await
            }
        },
    };

    drop(agent);
    database.close().await?;

    if let Err(e) = &result {
        if let Some(engine_error) = e.downcast_ref::<EngineError>() {
            eprintln!("Hint: {}", engine_error.user_hint());
        }
    }

    result
}
