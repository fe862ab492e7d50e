//! Action execution transport
//!
//! Approved actions leave the core through [`ActionExecutor`]. The executor
//! reports a success/failure outcome; transport errors are returned as
//! `Err` and the caller records the action as failed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use sdk::actions::{ActionOutcome, ActionType};
use sdk::errors::EngineError;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Performs actions on the user's behalf
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn send_action(
        &self,
        action: ActionType,
        payload: &serde_json::Value,
    ) -> Result<ActionOutcome>;
}

/// Executor that posts actions to an HTTP gateway
///
/// Request: `POST {base_url}/actions` with `{"action": "email.send", "payload": {...}}`.
/// Response: an [`ActionOutcome`] JSON object.
pub struct HttpActionGateway {
    base_url: String,
    client: Client,
}

#[derive(Serialize)]
struct ActionRequest<'a> {
    action: &'a str,
    payload: &'a serde_json::Value,
}

impl HttpActionGateway {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ActionExecutor for HttpActionGateway {
    async fn send_action(
        &self,
        action: ActionType,
        payload: &serde_json::Value,
    ) -> Result<ActionOutcome> {
        let url = format!("{}/actions", self.base_url);
        debug!("Sending {} to action gateway", action);

        let response = self
            .client
            .post(&url)
            .json(&ActionRequest {
                action: action.as_str(),
                payload,
            })
            .send()
            .await
            .map_err(|e| EngineError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("Action gateway rejected {} ({}): {}", action, status, text);
            return Ok(ActionOutcome::failure(format!(
                "gateway returned {}: {}",
                status, text
            )));
        }

        let outcome: ActionOutcome = response
            .json()
            .await
            .map_err(|e| EngineError::Network(format!("Invalid gateway response: {}", e)))?;

        Ok(outcome)
    }
}

/// Executor that only logs actions
///
/// Used when no gateway is configured so the agent can run locally.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl ActionExecutor for DryRunExecutor {
    async fn send_action(
        &self,
        action: ActionType,
        payload: &serde_json::Value,
    ) -> Result<ActionOutcome> {
        info!(action = %action, payload = %payload, "Dry run: action not sent");
        Ok(ActionOutcome::success(Some(serde_json::json!({
            "dry_run": true
        }))))
    }
}
