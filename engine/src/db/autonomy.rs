/// Autonomy override and escalation prompt persistence
use anyhow::{Context, Result};
use sdk::actions::{ActionType, Domain};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;

use super::now_millis;
use crate::autonomy::AutonomyTier;

/// Lifecycle state of an escalation prompt
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EscalationStatus {
    Active,
    Accepted,
    Dismissed,
}

impl EscalationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EscalationStatus::Active => "active",
            EscalationStatus::Accepted => "accepted",
            EscalationStatus::Dismissed => "dismissed",
        }
    }
}

impl FromStr for EscalationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(EscalationStatus::Active),
            "accepted" => Ok(EscalationStatus::Accepted),
            "dismissed" => Ok(EscalationStatus::Dismissed),
            other => anyhow::bail!("Unknown escalation status '{}'", other),
        }
    }
}

/// Suggestion to move a domain to a more autonomous tier
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EscalationPrompt {
    pub id: String,
    pub domain: Domain,
    pub current_tier: AutonomyTier,
    pub suggested_tier: AutonomyTier,
    /// Action type whose approval streak triggered the prompt
    pub action: ActionType,
    pub fingerprint: String,
    pub consecutive_approvals: u32,
    pub status: EscalationStatus,
    pub created_at: i64,
    pub responded_at: Option<i64>,
}

/// Repository for tier overrides and escalation prompts
pub struct AutonomyRepository {
    pool: SqlitePool,
}

impl AutonomyRepository {
    /// Create a new autonomy repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Tier overrides set at runtime
    pub async fn get_overrides(&self) -> Result<Vec<(Domain, AutonomyTier)>> {
        let rows = sqlx::query("SELECT domain, tier FROM autonomy_overrides ORDER BY domain")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch autonomy overrides")?;

        rows.iter()
            .map(|r| -> Result<(Domain, AutonomyTier)> {
                let domain: String = r.get("domain");
                let tier: String = r.get("tier");
                Ok((domain.parse()?, tier.parse()?))
            })
            .collect()
    }

    /// Runtime tier override for one domain, if any
    pub async fn get_override(&self, domain: Domain) -> Result<Option<AutonomyTier>> {
        let tier: Option<String> =
            sqlx::query_scalar("SELECT tier FROM autonomy_overrides WHERE domain = ?")
                .bind(domain.as_str())
                .fetch_optional(&self.pool)
                .await
                .context("Failed to fetch autonomy override")?;

        Ok(tier.map(|t| t.parse::<AutonomyTier>()).transpose()?)
    }

    /// Persist a tier override for a domain
    pub async fn set_override(&self, domain: Domain, tier: AutonomyTier) -> Result<()> {
        let now = now_millis()?;

        sqlx::query(
            r#"
            INSERT INTO autonomy_overrides (domain, tier, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(domain) DO UPDATE SET tier = excluded.tier, updated_at = excluded.updated_at
            "#,
        )
        .bind(domain.as_str())
        .bind(tier.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to set autonomy override")?;

        Ok(())
    }

    /// Insert a prompt unless its domain already has an active one
    ///
    /// Returns `true` when the prompt was stored.
    pub async fn insert_prompt(&self, prompt: &EscalationPrompt) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO escalation_prompts
                (id, domain, current_tier, suggested_tier, action, fingerprint,
                 consecutive_approvals, status, created_at, responded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&prompt.id)
        .bind(prompt.domain.as_str())
        .bind(prompt.current_tier.as_str())
        .bind(prompt.suggested_tier.as_str())
        .bind(prompt.action.as_str())
        .bind(&prompt.fingerprint)
        .bind(prompt.consecutive_approvals as i64)
        .bind(prompt.status.as_str())
        .bind(prompt.created_at)
        .bind(prompt.responded_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert escalation prompt")?;

        Ok(result.rows_affected() == 1)
    }

    /// Get a prompt by id
    pub async fn get_prompt(&self, id: &str) -> Result<Option<EscalationPrompt>> {
        let row = sqlx::query("SELECT * FROM escalation_prompts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch escalation prompt")?;

        row.as_ref().map(prompt_from_row).transpose()
    }

    /// Active prompts, oldest first
    pub async fn list_active(&self) -> Result<Vec<EscalationPrompt>> {
        let rows = sqlx::query(
            "SELECT * FROM escalation_prompts WHERE status = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(EscalationStatus::Active.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list escalation prompts")?;

        rows.iter().map(prompt_from_row).collect()
    }

    /// Whether the user already dismissed this suggestion for this pattern
    pub async fn was_dismissed(
        &self,
        fingerprint: &str,
        suggested_tier: AutonomyTier,
    ) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM escalation_prompts WHERE fingerprint = ? AND suggested_tier = ? AND status = ?",
        )
        .bind(fingerprint)
        .bind(suggested_tier.as_str())
        .bind(EscalationStatus::Dismissed.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to check dismissed escalation prompts")?;

        Ok(count > 0)
    }

    /// Close an active prompt with `status`
    ///
    /// Returns `false` when the prompt is missing or already answered.
    pub async fn resolve_prompt(&self, id: &str, status: EscalationStatus) -> Result<bool> {
        let now = now_millis()?;

        let result = sqlx::query(
            "UPDATE escalation_prompts SET status = ?, responded_at = ? WHERE id = ? AND status = ?",
        )
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .bind(EscalationStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to resolve escalation prompt")?;

        Ok(result.rows_affected() == 1)
    }
}

fn prompt_from_row(r: &SqliteRow) -> Result<EscalationPrompt> {
    let domain: String = r.get("domain");
    let current_tier: String = r.get("current_tier");
    let suggested_tier: String = r.get("suggested_tier");
    let action: String = r.get("action");
    let status: String = r.get("status");
    let approvals: i64 = r.get("consecutive_approvals");

    Ok(EscalationPrompt {
        id: r.get("id"),
        domain: domain.parse()?,
        current_tier: current_tier.parse()?,
        suggested_tier: suggested_tier.parse()?,
        action: action.parse()?,
        fingerprint: r.get("fingerprint"),
        consecutive_approvals: approvals as u32,
        status: status.parse()?,
        created_at: r.get("created_at"),
        responded_at: r.get("responded_at"),
    })
}
