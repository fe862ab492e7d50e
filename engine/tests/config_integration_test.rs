//! Integration tests for configuration management
//!
//! These tests verify that the Config struct can be loaded from disk,
//! validated, and processed with path expansion and defaults.

use sdk::actions::Domain;
use sdk::errors::EngineError;
use semblance_engine::approval::fingerprint::FingerprintRule;
use semblance_engine::autonomy::AutonomyTier;
use semblance_engine::config::Config;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_config_toml_parsing() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let toml_content = format!(
        r#"
[core]
log_level = "debug"
data_dir = {:?}

[llm]
temperature = 0.3
timeout_secs = 60

[llm.ollama]
base_url = "http://gpu-box:11434"
model = "qwen2.5:14b"

[agent]
context_limit = 8
history_window = 20

[autonomy]
default_tier = "guardian"
default_threshold = 4

[autonomy.domains]
calendar = "alter_ego"

[autonomy.approval_thresholds]
email = 5

[style]
score_threshold = 80
max_attempts = 2

[actions]
gateway_url = "http://127.0.0.1:7700"
timeout_secs = 10
"#,
        data_dir.display().to_string()
    );

    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, toml_content).unwrap();

    let config = Config::load_from_path(&config_path).unwrap();

    assert_eq!(config.core.log_level, "debug");
    assert!(data_dir.exists(), "data dir should be created on load");
    assert_eq!(config.db_path(), data_dir.join("semblance.db"));

    assert_eq!(config.llm.ollama.base_url, "http://gpu-box:11434");
    assert_eq!(config.llm.ollama.model, "qwen2.5:14b");
    assert_eq!(config.llm.timeout_secs, 60);

    assert_eq!(config.agent.context_limit, 8);
    assert_eq!(config.agent.history_window, 20);

    assert_eq!(config.autonomy.tier_for(Domain::Calendar), AutonomyTier::AlterEgo);
    assert_eq!(config.autonomy.tier_for(Domain::Email), AutonomyTier::Guardian);
    assert_eq!(config.autonomy.threshold_for(Domain::Email), 5);
    // A partial threshold table replaces the defaults; other domains fall back
    assert_eq!(config.autonomy.threshold_for(Domain::Web), 4);

    assert_eq!(config.style.score_threshold, 80);
    assert_eq!(config.style.max_attempts, 2);
    assert_eq!(
        config.actions.gateway_url.as_deref(),
        Some("http://127.0.0.1:7700")
    );
}

#[test]
fn test_config_defaults_for_missing_sections() {
    let temp_dir = TempDir::new().unwrap();
    let toml_content = format!(
        "[core]\ndata_dir = {:?}\n",
        temp_dir.path().display().to_string()
    );

    let config = Config::from_toml_str(&toml_content).unwrap();

    assert_eq!(config.core.log_level, "info");
    assert_eq!(config.llm.ollama.model, "llama3.1:8b");
    assert_eq!(config.llm.timeout_secs, 300);
    assert_eq!(config.agent.context_limit, 5);
    assert_eq!(config.agent.history_window, 10);
    assert_eq!(config.autonomy.default_tier, AutonomyTier::Partner);
    assert_eq!(config.autonomy.threshold_for(Domain::Email), 3);
    assert_eq!(config.autonomy.threshold_for(Domain::Calendar), 3);
    assert_eq!(config.autonomy.threshold_for(Domain::Reminders), 2);
    assert_eq!(config.autonomy.threshold_for(Domain::Web), 2);
    assert!(config.autonomy.fingerprint_rules.is_empty());
    assert_eq!(config.style.score_threshold, 70);
    assert_eq!(config.style.max_attempts, 3);
    assert!(config.actions.gateway_url.is_none());
}

#[test]
fn test_fingerprint_rule_overrides_parse() {
    let temp_dir = TempDir::new().unwrap();
    let toml_content = format!(
        r#"
[core]
data_dir = {:?}

[[autonomy.fingerprint_rules]]
action = "web.fetch"
fields = []
"#,
        temp_dir.path().display().to_string()
    );

    let config = Config::from_toml_str(&toml_content).unwrap();
    let rules: &[FingerprintRule] = &config.autonomy.fingerprint_rules;
    assert_eq!(rules.len(), 1);
}

#[test]
fn test_config_validation_errors() {
    let temp_dir = TempDir::new().unwrap();
    let core = format!(
        "[core]\ndata_dir = {:?}\n",
        temp_dir.path().display().to_string()
    );

    let invalid = [
        "[core]\nlog_level = \"loud\"\n".to_string(),
        format!("{}\n[autonomy.domains]\nbanking = \"partner\"\n", core),
        format!("{}\n[autonomy.domains]\nemail = \"overlord\"\n", core),
        format!("{}\n[autonomy.approval_thresholds]\nweb = 0\n", core),
        format!("{}\n[style]\nscore_threshold = 101\n", core),
        format!("{}\n[style]\nmax_attempts = 0\n", core),
        format!("{}\n[agent]\nhistory_window = 0\n", core),
    ];

    for toml_content in invalid {
        let err = Config::from_toml_str(&toml_content).unwrap_err();
        assert!(
            matches!(err, EngineError::Config(_)),
            "expected config error for:\n{}",
            toml_content
        );
    }
}

#[test]
fn test_missing_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let err = Config::load_from_path(&temp_dir.path().join("absent.toml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
