/// Approval pattern persistence
///
/// One row per fingerprint. Counters are updated with single-statement
/// upserts so concurrent approvals of the same pattern never lose an
/// increment.
use anyhow::{Context, Result};
use sdk::actions::ActionType;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use super::now_millis;

/// Learned approval history for one action fingerprint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalPattern {
    pub fingerprint: String,
    pub action: ActionType,
    /// Normalized fields the fingerprint was computed from
    pub descriptor: serde_json::Value,
    pub consecutive_approvals: u32,
    pub consecutive_rejections: u32,
    pub threshold: u32,
    pub last_updated: i64,
}

impl ApprovalPattern {
    /// Whether the approval streak has reached the threshold
    pub fn is_trusted(&self) -> bool {
        self.consecutive_approvals >= self.threshold
    }
}

/// Repository for approval patterns
pub struct ApprovalPatternRepository {
    pool: SqlitePool,
}

impl ApprovalPatternRepository {
    /// Create a new approval pattern repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a pattern by fingerprint
    pub async fn get(&self, fingerprint: &str) -> Result<Option<ApprovalPattern>> {
        let row = sqlx::query(
            r#"
            SELECT fingerprint, action, descriptor_json, consecutive_approvals,
                   consecutive_rejections, threshold, last_updated
            FROM approval_patterns
            WHERE fingerprint = ?
            "#,
        )
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch approval pattern")?;

        row.as_ref().map(pattern_from_row).transpose()
    }

    /// All patterns, grouped by action type
    pub async fn list_all(&self) -> Result<Vec<ApprovalPattern>> {
        let rows = sqlx::query(
            r#"
            SELECT fingerprint, action, descriptor_json, consecutive_approvals,
                   consecutive_rejections, threshold, last_updated
            FROM approval_patterns
            ORDER BY action ASC, fingerprint ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list approval patterns")?;

        rows.iter().map(pattern_from_row).collect()
    }

    /// Increment the approval streak and clear the rejection streak
    ///
    /// `initial_threshold` is only used when the pattern is seen for the
    /// first time.
    pub async fn record_approval(
        &self,
        fingerprint: &str,
        action: ActionType,
        descriptor: &serde_json::Value,
        initial_threshold: u32,
    ) -> Result<ApprovalPattern> {
        let now = now_millis()?;
        let descriptor_json =
            serde_json::to_string(descriptor).context("Failed to serialize descriptor")?;

        sqlx::query(
            r#"
            INSERT INTO approval_patterns
                (fingerprint, action, descriptor_json, consecutive_approvals,
                 consecutive_rejections, threshold, last_updated)
            VALUES (?, ?, ?, 1, 0, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                consecutive_approvals = consecutive_approvals + 1,
                consecutive_rejections = 0,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(fingerprint)
        .bind(action.as_str())
        .bind(descriptor_json)
        .bind(initial_threshold as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to record approval")?;

        self.get(fingerprint)
            .await?
            .context("Approval pattern missing after upsert")
    }

    /// Clear the approval streak and increment the rejection streak
    ///
    /// The threshold is left untouched.
    pub async fn record_rejection(
        &self,
        fingerprint: &str,
        action: ActionType,
        descriptor: &serde_json::Value,
        initial_threshold: u32,
    ) -> Result<ApprovalPattern> {
        let now = now_millis()?;
        let descriptor_json =
            serde_json::to_string(descriptor).context("Failed to serialize descriptor")?;

        sqlx::query(
            r#"
            INSERT INTO approval_patterns
                (fingerprint, action, descriptor_json, consecutive_approvals,
                 consecutive_rejections, threshold, last_updated)
            VALUES (?, ?, ?, 0, 1, ?, ?)
            ON CONFLICT(fingerprint) DO UPDATE SET
                consecutive_approvals = 0,
                consecutive_rejections = consecutive_rejections + 1,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(fingerprint)
        .bind(action.as_str())
        .bind(descriptor_json)
        .bind(initial_threshold as i64)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to record rejection")?;

        self.get(fingerprint)
            .await?
            .context("Approval pattern missing after upsert")
    }

    /// Raise a pattern's threshold to `threshold` if that is higher
    ///
    /// Returns `false` when the pattern does not exist.
    pub async fn raise_threshold(&self, fingerprint: &str, threshold: u32) -> Result<bool> {
        let now = now_millis()?;

        let result = sqlx::query(
            r#"
            UPDATE approval_patterns
            SET threshold = MAX(threshold, ?), last_updated = ?
            WHERE fingerprint = ?
            "#,
        )
        .bind(threshold as i64)
        .bind(now)
        .bind(fingerprint)
        .execute(&self.pool)
        .await
        .context("Failed to raise approval threshold")?;

        Ok(result.rows_affected() == 1)
    }

    /// Forget a pattern entirely
    pub async fn delete(&self, fingerprint: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM approval_patterns WHERE fingerprint = ?")
            .bind(fingerprint)
            .execute(&self.pool)
            .await
            .context("Failed to delete approval pattern")?;

        Ok(result.rows_affected() == 1)
    }
}

fn pattern_from_row(r: &SqliteRow) -> Result<ApprovalPattern> {
    let action: String = r.get("action");
    let descriptor: String = r.get("descriptor_json");
    let approvals: i64 = r.get("consecutive_approvals");
    let rejections: i64 = r.get("consecutive_rejections");
    let threshold: i64 = r.get("threshold");

    Ok(ApprovalPattern {
        fingerprint: r.get("fingerprint"),
        action: action.parse()?,
        descriptor: serde_json::from_str(&descriptor).context("Failed to parse descriptor")?,
        consecutive_approvals: approvals as u32,
        consecutive_rejections: rejections as u32,
        threshold: threshold as u32,
        last_updated: r.get("last_updated"),
    })
}
