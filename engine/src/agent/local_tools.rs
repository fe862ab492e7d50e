//! Local tool handlers
//!
//! These answer from indexed data and never leave the device, so they run
//! without an autonomy check. Output is a JSON string for the model; errors
//! are returned as `ERROR: ...` text so the model can see and correct them.

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::tools::LocalTool;
use crate::knowledge::{KnowledgeSearch, SearchOptions, SearchResult};

/// Upper bound on results a search tool returns
const MAX_SEARCH_LIMIT: usize = 20;

/// Calendar events scanned for conflicts
const CONFLICT_SCAN_LIMIT: usize = 50;

pub struct LocalToolRunner {
    knowledge: Arc<dyn KnowledgeSearch>,
    default_limit: usize,
}

impl LocalToolRunner {
    pub fn new(knowledge: Arc<dyn KnowledgeSearch>, default_limit: usize) -> Self {
        Self {
            knowledge,
            default_limit: default_limit.max(1),
        }
    }

    pub async fn run(&self, tool: LocalTool, args: &Value) -> String {
        debug!("Running local tool {:?}", tool);

        match tool {
            LocalTool::SearchFiles => self.search(args, "files").await,
            LocalTool::SearchEmails => self.search(args, "email").await,
            LocalTool::CheckCalendar => self.search(args, "calendar").await,
            LocalTool::CategorizeEmail => categorize_email(args).to_string(),
            LocalTool::DetectCalendarConflicts => self.detect_conflicts(args).await,
        }
    }

    async fn search(&self, args: &Value, source: &str) -> String {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return "ERROR: missing required field 'query'".to_string();
        };
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| (n as usize).clamp(1, MAX_SEARCH_LIMIT))
            .unwrap_or(self.default_limit);

        match self
            .knowledge
            .search(query, SearchOptions::new(limit).with_source(source))
            .await
        {
            Ok(results) => json!({
                "results": results.iter().map(result_json).collect::<Vec<_>>()
            })
            .to_string(),
            Err(e) => {
                warn!("{} search failed: {:#}", source, e);
                format!("ERROR: {} search failed: {}", source, e)
            }
        }
    }

    async fn detect_conflicts(&self, args: &Value) -> String {
        let (start, end) = match (parse_time(args, "start"), parse_time(args, "end")) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(e), _) | (_, Err(e)) => return format!("ERROR: {}", e),
        };
        if end <= start {
            return "ERROR: end must be after start".to_string();
        }

        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| start.format("%Y-%m-%d").to_string());

        let events = match self
            .knowledge
            .search(
                &query,
                SearchOptions::new(CONFLICT_SCAN_LIMIT).with_source("calendar"),
            )
            .await
        {
            Ok(events) => events,
            Err(e) => return format!("ERROR: calendar search failed: {}", e),
        };

        let conflicts: Vec<Value> = find_conflicts(start, end, &events)
            .into_iter()
            .map(|r| {
                json!({
                    "title": r.document.title,
                    "start": r.document.metadata.get("start"),
                    "end": r.document.metadata.get("end"),
                })
            })
            .collect();

        json!({
            "has_conflict": !conflicts.is_empty(),
            "conflicts": conflicts,
        })
        .to_string()
    }
}

fn result_json(r: &SearchResult) -> Value {
    json!({
        "title": r.document.title,
        "source": r.document.source,
        "snippet": r.chunk,
        "metadata": r.document.metadata,
    })
}

fn parse_time(args: &Value, field: &str) -> Result<DateTime<FixedOffset>, String> {
    let raw = args
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| format!("missing required field '{}'", field))?;
    DateTime::parse_from_rfc3339(raw).map_err(|e| format!("invalid {} '{}': {}", field, raw, e))
}

/// Events whose `[start, end)` interval overlaps the proposed one
///
/// Results without parseable `start`/`end` metadata are ignored.
pub fn find_conflicts<'a>(
    start: DateTime<FixedOffset>,
    end: DateTime<FixedOffset>,
    events: &'a [SearchResult],
) -> Vec<&'a SearchResult> {
    events
        .iter()
        .filter(|r| {
            let meta = &r.document.metadata;
            match (parse_time(meta, "start"), parse_time(meta, "end")) {
                (Ok(event_start), Ok(event_end)) => event_start < end && start < event_end,
                _ => false,
            }
        })
        .collect()
}

/// Keyword heuristics, checked in priority order
const CATEGORY_RULES: &[(&str, &[&str])] = &[
    (
        "receipt",
        &["receipt", "order confirmation", "invoice", "payment received", "your order"],
    ),
    (
        "meeting",
        &["meeting", "invitation:", "calendar", "agenda", "call at", "zoom.us", "meet.google"],
    ),
    (
        "newsletter",
        &["unsubscribe", "newsletter", "weekly digest", "view in browser", "no-reply", "noreply"],
    ),
    (
        "actionable",
        &["please", "can you", "could you", "action required", "deadline", "asap", "by friday", "?"],
    ),
];

/// Classify an email by keyword heuristics
pub fn categorize_email(args: &Value) -> Value {
    let text = ["from", "subject", "body"]
        .iter()
        .filter_map(|f| args.get(*f).and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    for (category, keywords) in CATEGORY_RULES {
        let signals: Vec<&str> = keywords
            .iter()
            .copied()
            .filter(|k| text.contains(k))
            .collect();
        if !signals.is_empty() {
            return json!({"category": category, "signals": signals});
        }
    }

    json!({"category": "personal", "signals": []})
}
