//! Conversation Memory Repository
//!
//! Full-text search over previously persisted conversation turns. Backs the
//! default knowledge search so the agent can pull earlier exchanges into its
//! context window.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};

/// A past turn matching a search
#[derive(Debug, Clone)]
pub struct TurnMemoryEntry {
    pub turn_id: String,
    pub conversation_id: String,
    pub role: String,
    pub content: String,
    /// bm25 rank; lower is better
    pub rank: f64,
}

/// Repository for searching past turns
pub struct TurnMemory {
    pool: SqlitePool,
}

impl TurnMemory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Search for past turns matching the query text.
    /// Orders results by FTS bm25 rank, limiting to `limit`.
    pub async fn search(&self, query_text: &str, limit: i64) -> Result<Vec<TurnMemoryEntry>> {
        let Some(match_expr) = fts_match_expression(query_text) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(
            r#"
            SELECT turn_id, conversation_id, role, content, rank
            FROM conversation_turns_fts
            WHERE conversation_turns_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(match_expr)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to execute FTS query on conversation_turns_fts")?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(TurnMemoryEntry {
                turn_id: row.get("turn_id"),
                conversation_id: row.get("conversation_id"),
                role: row.get("role"),
                content: row.get("content"),
                rank: row.get("rank"),
            });
        }

        Ok(entries)
    }
}

/// Build an FTS5 expression matching any word of free text
///
/// Each word is quoted so punctuation in user input cannot form FTS syntax.
fn fts_match_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 2)
        .map(|w| format!("\"{}\"", w.to_lowercase()))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}
