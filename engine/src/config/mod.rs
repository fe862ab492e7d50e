//! Configuration management
//!
//! This module handles loading, validation, and management of the Semblance
//! configuration. Configuration is stored in TOML format at
//! ~/.semblance/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Data directory, log level
//! - **llm**: Model backend settings
//! - **agent**: Retrieval and history window sizes
//! - **autonomy**: Per-domain tiers, approval thresholds, fingerprint rules
//! - **style**: Draft refinement threshold and attempt budget
//! - **actions**: Where approved actions are sent
//!
//! # Examples
//!
//! ```no_run
//! use semblance_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Model: {}", config.llm.ollama.model);
//! # Ok(())
//! # }
//! ```

use sdk::actions::Domain;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::approval::fingerprint::FingerprintRule;
use crate::autonomy::AutonomyTier;

/// Upper bound on style generation attempts, including the first
pub const MAX_STYLE_ATTEMPTS: u32 = 3;

/// Main configuration structure
///
/// Only `core` is required; every other section falls back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Model backend configuration
    #[serde(default)]
    pub llm: LLMConfig,

    /// Orchestrator loop settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Autonomy policy
    #[serde(default)]
    pub autonomy: AutonomyConfig,

    /// Style refinement
    #[serde(default)]
    pub style: StyleConfig,

    /// Action execution
    #[serde(default)]
    pub actions: ActionsConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMConfig {
    /// Ollama provider settings
    #[serde(default)]
    pub ollama: OllamaConfig,

    /// Sampling temperature for the main loop
    #[serde(default = "default_chat_temperature")]
    pub temperature: f32,

    /// Per-call timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

/// Ollama provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Base URL for Ollama API
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,

    /// Model name
    #[serde(default = "default_ollama_model")]
    pub model: String,
}

/// Orchestrator loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum knowledge snippets retrieved per message
    #[serde(default = "default_context_limit")]
    pub context_limit: usize,

    /// Number of prior turns included in the prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

/// Autonomy policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomyConfig {
    /// Tier used for domains without an explicit entry
    #[serde(default = "default_tier")]
    pub default_tier: AutonomyTier,

    /// Domain name → tier
    #[serde(default)]
    pub domains: BTreeMap<String, AutonomyTier>,

    /// Consecutive approvals required before a pattern auto-approves,
    /// used for domains without an entry in `approval_thresholds`
    #[serde(default = "default_approval_threshold")]
    pub default_threshold: u32,

    /// Domain name → consecutive approvals required
    #[serde(default = "default_domain_thresholds")]
    pub approval_thresholds: BTreeMap<String, u32>,

    /// Replacements for the built-in fingerprint rules, per action type
    #[serde(default)]
    pub fingerprint_rules: Vec<FingerprintRule>,
}

/// Style refinement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleConfig {
    /// Minimum overall score (0-100) accepted without retrying
    #[serde(default = "default_score_threshold")]
    pub score_threshold: u32,

    /// Total generation attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Sampling temperature for draft generation
    #[serde(default = "default_style_temperature")]
    pub temperature: f32,

    /// Style profile JSON file (supports ~ expansion)
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,
}

/// Action execution configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// HTTP endpoint of the action gateway. Actions are only logged when unset.
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Gateway request timeout in seconds
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.semblance")
}

fn default_chat_temperature() -> f32 {
    0.7
}

fn default_llm_timeout() -> u64 {
    300
}

fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_context_limit() -> usize {
    5
}

fn default_history_window() -> usize {
    10
}

fn default_tier() -> AutonomyTier {
    AutonomyTier::Partner
}

fn default_approval_threshold() -> u32 {
    3
}

fn default_domain_thresholds() -> BTreeMap<String, u32> {
    BTreeMap::from([
        ("email".to_string(), 3),
        ("calendar".to_string(), 3),
        ("reminders".to_string(), 2),
        ("web".to_string(), 2),
    ])
}

fn default_score_threshold() -> u32 {
    70
}

fn default_max_attempts() -> u32 {
    3
}

fn default_style_temperature() -> f32 {
    0.7
}

fn default_profile_path() -> PathBuf {
    PathBuf::from("~/.semblance/style_profile.json")
}

fn default_gateway_timeout() -> u64 {
    30
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            ollama: OllamaConfig::default(),
            temperature: default_chat_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            model: default_ollama_model(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            context_limit: default_context_limit(),
            history_window: default_history_window(),
        }
    }
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier(),
            domains: BTreeMap::new(),
            default_threshold: default_approval_threshold(),
            approval_thresholds: default_domain_thresholds(),
            fingerprint_rules: Vec::new(),
        }
    }
}

impl AutonomyConfig {
    /// Configured tier for a domain
    pub fn tier_for(&self, domain: Domain) -> AutonomyTier {
        self.domains
            .get(domain.as_str())
            .copied()
            .unwrap_or(self.default_tier)
    }

    /// Approval threshold assigned to new patterns in a domain
    pub fn threshold_for(&self, domain: Domain) -> u32 {
        self.approval_thresholds
            .get(domain.as_str())
            .copied()
            .unwrap_or(self.default_threshold)
    }
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            max_attempts: default_max_attempts(),
            temperature: default_style_temperature(),
            profile_path: default_profile_path(),
        }
    }
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            gateway_url: None,
            timeout_secs: default_gateway_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.semblance/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, validate and process configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let mut config = Self::default_config();

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.semblance/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".semblance").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig {
                log_level: default_log_level(),
                data_dir: default_data_dir(),
            },
            llm: LLMConfig::default(),
            agent: AgentConfig::default(),
            autonomy: AutonomyConfig::default(),
            style: StyleConfig::default(),
            actions: ActionsConfig::default(),
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("semblance.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerated and bounded fields
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        for domain in self
            .autonomy
            .domains
            .keys()
            .chain(self.autonomy.approval_thresholds.keys())
        {
            domain
                .parse::<Domain>()
                .map_err(|_| EngineError::Config(format!("Unknown autonomy domain '{}'", domain)))?;
        }

        if self.autonomy.default_threshold == 0
            || self.autonomy.approval_thresholds.values().any(|t| *t == 0)
        {
            return Err(EngineError::Config(
                "approval thresholds must be at least 1".to_string(),
            ));
        }

        if self.style.score_threshold > 100 {
            return Err(EngineError::Config(
                "style.score_threshold must be between 0 and 100".to_string(),
            ));
        }
        if self.style.max_attempts == 0 || self.style.max_attempts > MAX_STYLE_ATTEMPTS {
            return Err(EngineError::Config(format!(
                "style.max_attempts must be between 1 and {}",
                MAX_STYLE_ATTEMPTS
            )));
        }

        if self.agent.history_window == 0 {
            return Err(EngineError::Config(
                "agent.history_window must be at least 1".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        self.style.profile_path = expand_path(&self.style.profile_path)?;

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}
