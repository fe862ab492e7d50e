//! CLI interface for Semblance
//!
//! This module provides the command-line interface using clap's derive API.
//! Every command runs against the local database and exits; there is no
//! background process.

use clap::{Parser, Subcommand, ValueEnum};
use sdk::actions::Domain;
use std::path::PathBuf;

use crate::autonomy::AutonomyTier;

/// Semblance agent core
///
/// A local-first personal assistant that answers from your own data and
/// acts on your behalf within the autonomy you grant it.
#[derive(Parser, Debug)]
#[command(name = "semblance")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a message to the assistant
    Chat {
        /// The message
        message: String,

        /// Continue an existing conversation
        #[arg(short, long, value_name = "ID")]
        conversation: Option<String>,
    },

    /// List conversations, or show one conversation's turns
    History {
        /// Conversation to show
        conversation_id: Option<String>,

        /// Number of conversations to list (default: 10)
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },

    /// Show actions waiting for approval
    Pending,

    /// Approve and execute a pending action
    Approve {
        /// Action ID
        id: String,
    },

    /// Reject a pending action
    Reject {
        /// Action ID
        id: String,
    },

    /// Show recent actions of any status
    Log {
        /// Number of actions to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },

    /// Show learned approval patterns
    Patterns,

    /// Manage per-domain autonomy tiers
    Autonomy {
        #[command(subcommand)]
        action: AutonomyAction,
    },

    /// Manage tier escalation suggestions
    Escalations {
        #[command(subcommand)]
        action: EscalationAction,
    },
}

/// Autonomy management actions
#[derive(Subcommand, Debug)]
pub enum AutonomyAction {
    /// Show the effective tier of every domain
    Show,

    /// Set the tier of a domain
    Set {
        /// Domain (email, calendar, reminders, web)
        domain: Domain,
        /// Tier (guardian, partner, alter_ego)
        tier: AutonomyTier,
    },
}

/// Escalation prompt actions
#[derive(Subcommand, Debug)]
pub enum EscalationAction {
    /// Look for domains that have outgrown their tier
    Check,

    /// List active suggestions
    List,

    /// Accept or dismiss a suggestion
    Respond {
        /// Prompt ID
        id: String,
        /// accept or dismiss
        #[arg(value_enum)]
        decision: EscalationDecision,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum EscalationDecision {
    Accept,
    Dismiss,
}
