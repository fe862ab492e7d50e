//! Escalation prompts
//!
//! When a pattern has earned auto-approval in a domain whose tier still
//! asks for that kind of action, the user is offered the next tier up for
//! the whole domain. At most one prompt per domain is active. A dismissed
//! suggestion is not raised again for the same pattern.

use anyhow::Result;
use sdk::errors::EngineError;
use tracing::info;

use super::AutonomyEngine;
use crate::db::{now_millis, EscalationPrompt, EscalationStatus};

impl AutonomyEngine {
    /// Create prompts for domains that have outgrown their tier
    ///
    /// Returns the prompts created by this call.
    pub async fn check_escalations(&self) -> Result<Vec<EscalationPrompt>> {
        let mut created = Vec::new();

        for pattern in self.tracker().get_all_patterns().await? {
            if !pattern.is_trusted() {
                continue;
            }

            let domain = pattern.action.domain();
            let tier = self.tier_for(domain).await?;
            if tier.permits(pattern.action.class()) {
                continue;
            }
            let Some(suggested) = tier.next() else {
                continue;
            };
            if self
                .repository()
                .was_dismissed(&pattern.fingerprint, suggested)
                .await?
            {
                continue;
            }

            let prompt = EscalationPrompt {
                id: uuid::Uuid::new_v4().to_string(),
                domain,
                current_tier: tier,
                suggested_tier: suggested,
                action: pattern.action,
                fingerprint: pattern.fingerprint.clone(),
                consecutive_approvals: pattern.consecutive_approvals,
                status: EscalationStatus::Active,
                created_at: now_millis()?,
                responded_at: None,
            };

            if self.repository().insert_prompt(&prompt).await? {
                info!(
                    "Suggesting {} tier for {} after {} approvals of {}",
                    suggested, domain, pattern.consecutive_approvals, pattern.action
                );
                created.push(prompt);
            }
        }

        Ok(created)
    }

    pub async fn active_escalations(&self) -> Result<Vec<EscalationPrompt>> {
        self.repository().list_active().await
    }

    /// Accept or dismiss an active prompt
    ///
    /// Accepting applies the suggested tier to the prompt's domain.
    pub async fn respond_to_escalation(
        &self,
        prompt_id: &str,
        accepted: bool,
    ) -> Result<EscalationPrompt> {
        let status = if accepted {
            EscalationStatus::Accepted
        } else {
            EscalationStatus::Dismissed
        };

        if !self.repository().resolve_prompt(prompt_id, status).await? {
            return Err(EngineError::EscalationNotActive(prompt_id.to_string()).into());
        }

        let prompt = self
            .repository()
            .get_prompt(prompt_id)
            .await?
            .ok_or_else(|| EngineError::EscalationNotActive(prompt_id.to_string()))?;

        if accepted {
            self.set_tier(prompt.domain, prompt.suggested_tier).await?;
        } else {
            info!("Escalation for {} dismissed", prompt.domain);
        }

        Ok(prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::super::AutonomyTier;
    use super::*;
    use crate::approval::ApprovalPatternTracker;
    use crate::config::AutonomyConfig;
    use crate::db::Database;
    use sdk::actions::{ActionType, Domain};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn engine() -> (TempDir, AutonomyEngine) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let config = AutonomyConfig::default();
        let tracker = Arc::new(ApprovalPatternTracker::new(db.approval_patterns(), &config));
        (temp_dir, AutonomyEngine::new(config, db.autonomy(), tracker))
    }

    async fn approve(engine: &AutonomyEngine, times: usize) {
        for _ in 0..times {
            engine
                .tracker()
                .record_approval(ActionType::EmailSend, &json!({"to": ["a@example.com"]}))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_no_prompt_before_threshold() {
        let (_dir, engine) = engine().await;
        approve(&engine, 2).await;
        assert!(engine.check_escalations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prompt_created_once_per_domain() {
        let (_dir, engine) = engine().await;
        approve(&engine, 3).await;

        let created = engine.check_escalations().await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].domain, Domain::Email);
        assert_eq!(created[0].current_tier, AutonomyTier::Partner);
        assert_eq!(created[0].suggested_tier, AutonomyTier::AlterEgo);

        assert!(engine.check_escalations().await.unwrap().is_empty());
        assert_eq!(engine.active_escalations().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_accept_applies_tier() {
        let (_dir, engine) = engine().await;
        approve(&engine, 3).await;
        let prompt = engine.check_escalations().await.unwrap().remove(0);

        let answered = engine.respond_to_escalation(&prompt.id, true).await.unwrap();
        assert_eq!(answered.status, EscalationStatus::Accepted);
        assert_eq!(
            engine.tier_for(Domain::Email).await.unwrap(),
            AutonomyTier::AlterEgo
        );

        let err = engine
            .respond_to_escalation(&prompt.id, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::EscalationNotActive(_))
        ));
    }

    #[tokio::test]
    async fn test_dismissed_not_raised_again() {
        let (_dir, engine) = engine().await;
        approve(&engine, 3).await;
        let prompt = engine.check_escalations().await.unwrap().remove(0);

        engine.respond_to_escalation(&prompt.id, false).await.unwrap();
        assert_eq!(
            engine.tier_for(Domain::Email).await.unwrap(),
            AutonomyTier::Partner
        );
        assert!(engine.check_escalations().await.unwrap().is_empty());
    }
}
