/// Pending action queue persistence
///
/// Every action the orchestrator produces is stored here, whether it was
/// executed immediately or is awaiting approval. Status changes are
/// compare-and-set updates guarded by the expected current status, so a
/// transition out of a terminal state is a no-op rather than an overwrite.
use anyhow::{Context, Result};
use sdk::actions::{ActionOutcome, ActionStatus, AgentAction};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

const SELECT_COLUMNS: &str = "id, action, payload, reasoning, domain, tier, status, created_at, executed_at, response_json";

/// Repository for the pending action queue
pub struct PendingActionRepository {
    pool: SqlitePool,
}

impl PendingActionRepository {
    /// Create a new pending action repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert an action in whatever status it currently has
    pub async fn insert(&self, action: &AgentAction) -> Result<()> {
        let payload =
            serde_json::to_string(&action.payload).context("Failed to serialize payload")?;
        let response = action
            .response
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize action response")?;

        sqlx::query(
            r#"
            INSERT INTO pending_actions
                (id, action, payload, reasoning, domain, tier, status, created_at, executed_at, response_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&action.id)
        .bind(action.action.as_str())
        .bind(payload)
        .bind(&action.reasoning)
        .bind(action.domain.as_str())
        .bind(&action.tier)
        .bind(action.status.as_str())
        .bind(action.created_at)
        .bind(action.executed_at)
        .bind(response)
        .execute(&self.pool)
        .await
        .context("Failed to insert action")?;

        Ok(())
    }

    /// Get an action by id
    pub async fn get(&self, id: &str) -> Result<Option<AgentAction>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM pending_actions WHERE id = ?",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch action")?;

        row.as_ref().map(action_from_row).transpose()
    }

    /// Actions awaiting approval, oldest first
    pub async fn list_pending(&self) -> Result<Vec<AgentAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pending_actions WHERE status = ? ORDER BY created_at ASC, rowid ASC",
            SELECT_COLUMNS
        ))
        .bind(ActionStatus::PendingApproval.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list pending actions")?;

        rows.iter().map(action_from_row).collect()
    }

    /// Number of actions awaiting approval
    pub async fn count_pending(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_actions WHERE status = ?")
            .bind(ActionStatus::PendingApproval.as_str())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count pending actions")?;

        Ok(count)
    }

    /// Most recent actions of any status, newest first
    pub async fn action_log(&self, limit: i64) -> Result<Vec<AgentAction>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM pending_actions ORDER BY created_at DESC, rowid DESC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch action log")?;

        rows.iter().map(action_from_row).collect()
    }

    /// Move an action from `from` to `to` if it is still in `from`
    ///
    /// Returns `true` when the row transitioned. Illegal transitions are
    /// rejected before touching the database.
    pub async fn transition(
        &self,
        id: &str,
        from: ActionStatus,
        to: ActionStatus,
        executed_at: Option<i64>,
        response: Option<&ActionOutcome>,
    ) -> Result<bool> {
        if !from.can_transition_to(to) {
            anyhow::bail!(
                "Illegal action status transition {} -> {}",
                from.as_str(),
                to.as_str()
            );
        }

        let response = response
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize action response")?;

        let result = sqlx::query(
            r#"
            UPDATE pending_actions
            SET status = ?, executed_at = COALESCE(?, executed_at),
                response_json = COALESCE(?, response_json)
            WHERE id = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(executed_at)
        .bind(response)
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update action status")?;

        Ok(result.rows_affected() == 1)
    }
}

fn action_from_row(r: &SqliteRow) -> Result<AgentAction> {
    let action: String = r.get("action");
    let payload: String = r.get("payload");
    let domain: String = r.get("domain");
    let status: String = r.get("status");
    let response: Option<String> = r.get("response_json");

    Ok(AgentAction {
        id: r.get("id"),
        action: action.parse()?,
        payload: serde_json::from_str(&payload).context("Failed to parse action payload")?,
        reasoning: r.get("reasoning"),
        domain: domain.parse()?,
        tier: r.get("tier"),
        status: status.parse()?,
        created_at: r.get("created_at"),
        executed_at: r.get("executed_at"),
        response: response
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .context("Failed to parse action response")?,
    })
}
