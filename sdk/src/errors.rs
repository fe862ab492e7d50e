//! Error types and handling
//!
//! This module provides the error types used throughout the Semblance engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Security
//!
//! Hints are static strings. Error payloads (recipients, message bodies,
//! provider responses) never leak into a hint, so hints are always safe to
//! show in the approval UI.

use thiserror::Error;

/// Trait for engine error extensions
///
/// This trait provides additional context for errors, including user-friendly
/// hints and recoverability information. All engine errors implement this trait.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    ///
    /// Recoverable errors can be retried or worked around. Non-recoverable
    /// errors typically require a configuration change.
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Error Categories
///
/// - **Configuration**: Invalid or missing configuration
/// - **Database**: SQLite operation failures
/// - **LLM Provider**: Model backend failures
/// - **Actions**: Pending-queue state violations and execution failures
/// - **Autonomy**: Unknown tiers, domains, escalation prompts
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::ActionNotPending("a1".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal_error = EngineError::Config("bad tier".to_string());
/// assert!(!fatal_error.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // LLM provider errors
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("LLM call timed out")]
    LLMTimeout,

    // Tool errors
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidToolArguments { tool: String, reason: String },

    // Action errors
    #[error("Unknown action type: {0}")]
    UnknownActionType(String),

    #[error("Action {0} is not awaiting approval")]
    ActionNotPending(String),

    #[error("Action execution failed: {0}")]
    ActionExecution(String),

    // Autonomy errors
    #[error("Unknown autonomy tier: {0}")]
    UnknownTier(String),

    #[error("Unknown domain: {0}")]
    UnknownDomain(String),

    #[error("Escalation prompt {0} is not active")]
    EscalationNotActive(String),

    // Style errors
    #[error("Style profile error: {0}")]
    StyleProfile(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml file for errors",

            Self::Database(_) => "Database operation failed. Try again",

            Self::LLMProvider(_) => "Model backend unavailable. Is Ollama running?",
            Self::LLMTimeout => "The model took too long to respond. Try again",

            Self::UnknownTool(_) => "The assistant asked for a tool that does not exist",
            Self::InvalidToolArguments { .. } => "The assistant produced an incomplete request",

            Self::UnknownActionType(_) => "This kind of action is not supported",
            Self::ActionNotPending(_) => "This action was already handled",
            Self::ActionExecution(_) => "The action could not be completed",

            Self::UnknownTier(_) => "Use one of: guardian, partner, alter_ego",
            Self::UnknownDomain(_) => "Use one of: email, calendar, reminders, web",
            Self::EscalationNotActive(_) => "This suggestion was already answered",

            Self::StyleProfile(_) => "Your writing style profile could not be loaded",

            Self::Network(_) => "Network operation failed. Check your connection",

            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Non-recoverable errors
            Self::Config(_) | Self::UnknownTier(_) | Self::UnknownDomain(_) => false,

            // All other errors are potentially recoverable
            _ => true,
        }
    }
}
