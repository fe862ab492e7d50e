//! Command handlers for CLI operations
//!
//! Each handler takes an [`AgentCore`] built by [`open_agent`] and prints its
//! result either as text or as pretty JSON.

use anyhow::{Context, Result};
use sdk::actions::{AgentAction, Domain};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentCore, Collaborators};
use crate::autonomy::AutonomyTier;
use crate::cli::EscalationDecision;
use crate::config::Config;
use crate::db::{Database, EscalationPrompt};
use crate::executor::{ActionExecutor, DryRunExecutor, HttpActionGateway};
use crate::knowledge::ConversationKnowledge;
use crate::llm::ollama::OllamaProvider;
use crate::style::{FileStyleProfileStore, HeuristicScorer};

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open the database and wire the default collaborators
pub async fn open_agent(config: &Config) -> Result<(Database, AgentCore)> {
    let database = Database::new(&config.db_path())
        .await
        .context("Failed to open database")?;

    let llm = OllamaProvider::new(
        config.llm.ollama.base_url.clone(),
        config.llm.ollama.model.clone(),
        Duration::from_secs(config.llm.timeout_secs),
    )?;

    let executor: Arc<dyn ActionExecutor> = match &config.actions.gateway_url {
        Some(url) => Arc::new(HttpActionGateway::new(
            url.clone(),
            Duration::from_secs(config.actions.timeout_secs),
        )?),
        None => {
            tracing::info!("No action gateway configured, actions run as dry runs");
            Arc::new(DryRunExecutor)
        }
    };

    let agent = AgentCore::new(
        &database,
        config,
        Collaborators {
            llm: Arc::new(llm),
            knowledge: Arc::new(ConversationKnowledge::new(database.memory())),
            executor,
            profiles: Arc::new(FileStyleProfileStore::new(config.style.profile_path.clone())),
            scorer: Arc::new(HeuristicScorer),
        },
    );

    Ok((database, agent))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_action(action: &AgentAction) {
    println!(
        "  {}  {:<16} {:<17} {}",
        action.id,
        action.action.as_str(),
        action.status.as_str(),
        action.reasoning
    );
}

fn print_prompt(prompt: &EscalationPrompt) {
    println!(
        "  {}  {}: {} -> {} ({} approvals of {})",
        prompt.id,
        prompt.domain,
        prompt.current_tier,
        prompt.suggested_tier,
        prompt.consecutive_approvals,
        prompt.action
    );
}

/// Send one message
pub async fn handle_chat(
    agent: &AgentCore,
    message: &str,
    conversation: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let response = agent.process_message(message, conversation).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Text => {
            println!("{}", response.message);
            println!();
            for action in &response.actions {
                print_action(action);
            }
            if let Some(score) = &response.style_score {
                println!("  Style score: {}/100", score.overall);
            }
            println!(
                "  Conversation: {}  Tokens: {}",
                response.conversation_id,
                response.tokens_used.total()
            );
        }
    }
    Ok(())
}

/// List conversations, or print one conversation
pub async fn handle_history(
    agent: &AgentCore,
    conversation_id: Option<&str>,
    limit: i64,
    format: OutputFormat,
) -> Result<()> {
    let Some(id) = conversation_id else {
        let conversations = agent.list_conversations(limit).await?;
        return match format {
            OutputFormat::Json => print_json(&conversations),
            OutputFormat::Text => {
                if conversations.is_empty() {
                    println!("No conversations yet.");
                }
                for c in &conversations {
                    println!("  {}  {}", c.id, c.title.as_deref().unwrap_or("(untitled)"));
                }
                Ok(())
            }
        };
    };

    let history = agent
        .get_conversation(id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Conversation {} not found", id))?;

    match format {
        OutputFormat::Json => print_json(&history)?,
        OutputFormat::Text => {
            println!(
                "{}",
                history.conversation.title.as_deref().unwrap_or("(untitled)")
            );
            for turn in &history.turns {
                println!();
                println!("[{}] {}", turn.role.as_str(), turn.content);
            }
        }
    }
    Ok(())
}

pub async fn handle_pending(agent: &AgentCore, format: OutputFormat) -> Result<()> {
    let pending = agent.get_pending_actions().await?;
    match format {
        OutputFormat::Json => print_json(&pending)?,
        OutputFormat::Text => {
            if pending.is_empty() {
                println!("Nothing is waiting for approval.");
            } else {
                println!("Awaiting approval ({}):", pending.len());
                for action in &pending {
                    print_action(action);
                }
            }
        }
    }
    Ok(())
}

pub async fn handle_approve(agent: &AgentCore, id: &str, format: OutputFormat) -> Result<()> {
    let action = agent.approve_action(id).await?;
    match format {
        OutputFormat::Json => print_json(&action)?,
        OutputFormat::Text => {
            println!("Approved {} ({})", action.id, action.status.as_str());
            if let Some(response) = &action.response {
                println!("  Response: {}", serde_json::to_string(response)?);
            }
        }
    }
    Ok(())
}

pub async fn handle_reject(agent: &AgentCore, id: &str, format: OutputFormat) -> Result<()> {
    let rejected = agent.reject_action(id).await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "id": id, "rejected": rejected }))?,
        OutputFormat::Text => {
            if rejected {
                println!("Rejected {}", id);
            } else {
                println!("Action {} is not awaiting approval; nothing changed.", id);
            }
        }
    }
    Ok(())
}

pub async fn handle_log(agent: &AgentCore, limit: i64, format: OutputFormat) -> Result<()> {
    let log = agent.get_action_log(limit).await?;
    match format {
        OutputFormat::Json => print_json(&log)?,
        OutputFormat::Text => {
            if log.is_empty() {
                println!("No actions recorded.");
            }
            for action in &log {
                print_action(action);
            }
        }
    }
    Ok(())
}

pub async fn handle_patterns(agent: &AgentCore, format: OutputFormat) -> Result<()> {
    let patterns = agent.get_all_patterns().await?;
    match format {
        OutputFormat::Json => print_json(&patterns)?,
        OutputFormat::Text => {
            if patterns.is_empty() {
                println!("No approval patterns learned yet.");
            }
            for p in &patterns {
                println!(
                    "  {}  {:<16} {}/{}{}  {}",
                    &p.fingerprint[..p.fingerprint.len().min(12)],
                    p.action.as_str(),
                    p.consecutive_approvals,
                    p.threshold,
                    if p.is_trusted() { " trusted" } else { "" },
                    p.descriptor
                );
            }
        }
    }
    Ok(())
}

pub async fn handle_autonomy_show(agent: &AgentCore, format: OutputFormat) -> Result<()> {
    let tiers = agent.get_autonomy_config().await?;
    match format {
        OutputFormat::Json => print_json(&tiers)?,
        OutputFormat::Text => {
            for (domain, tier) in &tiers {
                println!("  {:<10} {}", domain.as_str(), tier);
            }
        }
    }
    Ok(())
}

pub async fn handle_autonomy_set(
    agent: &AgentCore,
    domain: Domain,
    tier: AutonomyTier,
    format: OutputFormat,
) -> Result<()> {
    agent.set_autonomy_tier(domain, tier).await?;
    match format {
        OutputFormat::Json => print_json(&json!({ "domain": domain, "tier": tier }))?,
        OutputFormat::Text => println!("{} is now {}", domain, tier),
    }
    Ok(())
}

pub async fn handle_escalations_check(agent: &AgentCore, format: OutputFormat) -> Result<()> {
    let created = agent.check_escalations().await?;
    match format {
        OutputFormat::Json => print_json(&created)?,
        OutputFormat::Text => {
            if created.is_empty() {
                println!("No new suggestions.");
            }
            for prompt in &created {
                print_prompt(prompt);
            }
        }
    }
    Ok(())
}

pub async fn handle_escalations_list(agent: &AgentCore, format: OutputFormat) -> Result<()> {
    let active = agent.get_active_escalations().await?;
    match format {
        OutputFormat::Json => print_json(&active)?,
        OutputFormat::Text => {
            if active.is_empty() {
                println!("No active suggestions.");
            }
            for prompt in &active {
                print_prompt(prompt);
            }
        }
    }
    Ok(())
}

pub async fn handle_escalations_respond(
    agent: &AgentCore,
    id: &str,
    decision: EscalationDecision,
    format: OutputFormat,
) -> Result<()> {
    let prompt = agent
        .respond_to_escalation(id, decision == EscalationDecision::Accept)
        .await?;
    match format {
        OutputFormat::Json => print_json(&prompt)?,
        OutputFormat::Text => match decision {
            EscalationDecision::Accept => {
                println!("{} is now {}", prompt.domain, prompt.suggested_tier)
            }
            EscalationDecision::Dismiss => println!("Suggestion {} dismissed", prompt.id),
        },
    }
    Ok(())
}
