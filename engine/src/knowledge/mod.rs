//! Knowledge search
//!
//! The orchestrator retrieves context snippets through [`KnowledgeSearch`].
//! Indexing and ranking belong to the implementation; the default one
//! searches past conversation turns in the local database.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::TurnMemory;

/// Source tag of documents produced by [`ConversationKnowledge`]
pub const CONVERSATION_SOURCE: &str = "conversation";

/// Options for one search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: usize,
    /// Only return documents from this source (e.g. "email", "calendar")
    pub source: Option<String>,
}

impl SearchOptions {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Document a search hit belongs to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub source: String,
    /// Source specific fields, e.g. `start`/`end` for calendar events
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub document: Document,
    /// Matching text
    pub chunk: String,
    /// Higher is more relevant
    pub score: f64,
}

/// Search over the user's indexed data
#[async_trait]
pub trait KnowledgeSearch: Send + Sync {
    async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>>;
}

/// Knowledge search over previously persisted conversation turns
pub struct ConversationKnowledge {
    memory: TurnMemory,
}

impl ConversationKnowledge {
    pub fn new(memory: TurnMemory) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl KnowledgeSearch for ConversationKnowledge {
    async fn search(&self, query: &str, options: SearchOptions) -> Result<Vec<SearchResult>> {
        if let Some(source) = &options.source {
            if source != CONVERSATION_SOURCE {
                return Ok(Vec::new());
            }
        }

        let entries = self.memory.search(query, options.limit as i64).await?;

        Ok(entries
            .into_iter()
            .map(|e| SearchResult {
                document: Document {
                    id: e.turn_id,
                    title: format!("Earlier {} message", e.role),
                    source: CONVERSATION_SOURCE.to_string(),
                    metadata: serde_json::json!({ "conversation_id": e.conversation_id }),
                },
                chunk: e.content,
                // bm25 ranks are negative, more negative is better
                score: -e.rank,
            })
            .collect())
    }
}
