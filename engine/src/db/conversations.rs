/// Conversation persistence operations
///
/// Turns are append-only. The only mutable column is the parent
/// conversation's `updated_at`, bumped whenever a turn is appended.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::str::FromStr;

use super::now_millis;

/// Maximum number of characters of the first message used as a title
const TITLE_CHARS: usize = 60;

/// Speaker of a turn
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl FromStr for TurnRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "user" => Ok(TurnRole::User),
            "assistant" => Ok(TurnRole::Assistant),
            other => anyhow::bail!("Unknown turn role '{}'", other),
        }
    }
}

/// Prompt / completion token counts reported by the model
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u32,
    pub completion: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.prompt + self.completion
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.prompt += other.prompt;
        self.completion += other.completion;
    }
}

/// Conversation record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// One immutable turn of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub id: String,
    pub conversation_id: String,
    pub role: TurnRole,
    pub content: String,
    pub timestamp: i64,
    /// Knowledge snippets shown to the model for this turn
    pub context: Option<serde_json::Value>,
    /// Ids of actions produced while answering this turn
    pub actions: Option<Vec<String>>,
    pub tokens: Option<TokenUsage>,
}

/// Fields of a turn about to be written
#[derive(Debug, Clone)]
pub struct NewTurn<'a> {
    pub role: TurnRole,
    pub content: &'a str,
    pub context: Option<&'a serde_json::Value>,
    pub actions: Option<&'a [String]>,
    pub tokens: Option<TokenUsage>,
}

/// Conversation repository for database operations
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    /// Create a new conversation repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a conversation by id
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch conversation")?;

        Ok(row.map(|r| Conversation {
            id: r.get("id"),
            title: r.get("title"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    /// Create the conversation if it does not exist yet
    ///
    /// The title is derived from the first message. Returns `true` when a new
    /// row was inserted.
    pub async fn ensure_conversation(&self, id: &str, first_message: &str) -> Result<bool> {
        let now = now_millis()?;
        let title: String = first_message.chars().take(TITLE_CHARS).collect();

        let result = sqlx::query(
            "INSERT OR IGNORE INTO conversations (id, title, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(title)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to create conversation")?;

        Ok(result.rows_affected() == 1)
    }

    /// List conversations, most recently updated first
    pub async fn list_conversations(&self, limit: i64) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(
            "SELECT id, title, created_at, updated_at FROM conversations ORDER BY updated_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list conversations")?;

        Ok(rows
            .into_iter()
            .map(|r| Conversation {
                id: r.get("id"),
                title: r.get("title"),
                created_at: r.get("created_at"),
                updated_at: r.get("updated_at"),
            })
            .collect())
    }

    /// Append a turn and bump the conversation's `updated_at`
    pub async fn append_turn(
        &self,
        conversation_id: &str,
        turn: NewTurn<'_>,
    ) -> Result<ConversationTurn> {
        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = now_millis()?;

        let context_json = turn
            .context
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize turn context")?;
        let actions_json = turn
            .actions
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to serialize turn actions")?;

        sqlx::query(
            r#"
            INSERT INTO conversation_turns
                (id, conversation_id, role, content, timestamp, context_json, actions_json,
                 tokens_prompt, tokens_completion)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(conversation_id)
        .bind(turn.role.as_str())
        .bind(turn.content)
        .bind(timestamp)
        .bind(&context_json)
        .bind(&actions_json)
        .bind(turn.tokens.map(|t| t.prompt as i64))
        .bind(turn.tokens.map(|t| t.completion as i64))
        .execute(&self.pool)
        .await
        .context("Failed to append conversation turn")?;

        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(timestamp)
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .context("Failed to update conversation timestamp")?;

        Ok(ConversationTurn {
            id,
            conversation_id: conversation_id.to_string(),
            role: turn.role,
            content: turn.content.to_string(),
            timestamp,
            context: turn.context.cloned(),
            actions: turn.actions.map(|a| a.to_vec()),
            tokens: turn.tokens,
        })
    }

    /// All turns of a conversation in chronological order
    ///
    /// Turns sharing a timestamp keep their insertion order.
    pub async fn get_turns(&self, conversation_id: &str) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT id, conversation_id, role, content, timestamp, context_json, actions_json,
                   tokens_prompt, tokens_completion
            FROM conversation_turns
            WHERE conversation_id = ?
            ORDER BY timestamp ASC, rowid ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch conversation turns")?;

        rows.iter().map(turn_from_row).collect()
    }

    /// The last `limit` turns of a conversation, oldest first
    pub async fn get_recent_turns(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT rowid AS seq, id, conversation_id, role, content, timestamp, context_json,
                       actions_json, tokens_prompt, tokens_completion
                FROM conversation_turns
                WHERE conversation_id = ?
                ORDER BY timestamp DESC, rowid DESC
                LIMIT ?
            )
            ORDER BY timestamp ASC, seq ASC
            "#,
        )
        .bind(conversation_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent conversation turns")?;

        rows.iter().map(turn_from_row).collect()
    }
}

fn turn_from_row(r: &SqliteRow) -> Result<ConversationTurn> {
    let role: String = r.get("role");
    let context_json: Option<String> = r.get("context_json");
    let actions_json: Option<String> = r.get("actions_json");
    let tokens_prompt: Option<i64> = r.get("tokens_prompt");
    let tokens_completion: Option<i64> = r.get("tokens_completion");

    let tokens = match (tokens_prompt, tokens_completion) {
        (None, None) => None,
        (p, c) => Some(TokenUsage {
            prompt: p.unwrap_or(0) as u32,
            completion: c.unwrap_or(0) as u32,
        }),
    };

    Ok(ConversationTurn {
        id: r.get("id"),
        conversation_id: r.get("conversation_id"),
        role: role.parse()?,
        content: r.get("content"),
        timestamp: r.get("timestamp"),
        context: context_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .context("Failed to parse turn context")?,
        actions: actions_json
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .context("Failed to parse turn actions")?,
        tokens,
    })
}
