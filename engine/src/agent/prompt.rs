//! Prompt assembly for the orchestrator loop

use std::fmt::Write;

use crate::knowledge::SearchResult;
use crate::style::prompts::INACTIVE_PROFILE_INSTRUCTION;

const SYSTEM_PROMPT: &str = "You are Semblance, a personal assistant that runs on the user's own device. \
You can search the user's files, email and calendar, and you can act on their behalf: \
send and draft email, archive messages, manage calendar events, create reminders and use the web. \
Use a tool whenever it helps. Some actions need the user's approval before they run; \
when that happens, tell the user the action is waiting for them instead of claiming it is done. \
Answer concisely.";

/// Longest snippet copied into the context block
const MAX_SNIPPET_CHARS: usize = 500;

/// System prompt, with neutral writing guidance until a style profile is active
pub fn build_system_prompt(style_active: bool) -> String {
    if style_active {
        SYSTEM_PROMPT.to_string()
    } else {
        format!("{}\n\n{}", SYSTEM_PROMPT, INACTIVE_PROFILE_INSTRUCTION)
    }
}

/// Retrieved snippets rendered for the prompt, `None` when there are none
pub fn context_block(results: &[SearchResult]) -> Option<String> {
    if results.is_empty() {
        return None;
    }

    let mut out = String::from("Relevant information from the user's data:\n");
    for (i, r) in results.iter().enumerate() {
        let snippet: String = r.chunk.chars().take(MAX_SNIPPET_CHARS).collect();
        let _ = writeln!(
            out,
            "[{}] {} ({}): {}",
            i + 1,
            r.document.title,
            r.document.source,
            snippet.trim()
        );
    }
    Some(out)
}

/// Tool outputs folded into a synthetic user turn for the second model call
pub fn tool_results_message(outputs: &[(String, String)]) -> String {
    let mut out = String::from("Tool results:\n");
    for (name, output) in outputs {
        let _ = writeln!(out, "- {}: {}", name, output);
    }
    out.push_str("\nUsing these results, write the final reply to the user.");
    out
}

/// Append a note about actions still waiting for approval
pub fn annotate_pending(reply: &str, pending: usize) -> String {
    match pending {
        0 => reply.to_string(),
        1 => format!("{}\n\n(1 action is awaiting your approval.)", reply.trim_end()),
        n => format!(
            "{}\n\n({} actions are awaiting your approval.)",
            reply.trim_end(),
            n
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::Document;
    use serde_json::json;

    #[test]
    fn test_inactive_profile_adds_generic_guidance() {
        assert!(!build_system_prompt(true).contains(INACTIVE_PROFILE_INSTRUCTION));
        assert!(build_system_prompt(false).ends_with(INACTIVE_PROFILE_INSTRUCTION));
    }

    #[test]
    fn test_context_block() {
        assert!(context_block(&[]).is_none());

        let results = vec![SearchResult {
            document: Document {
                id: "d1".into(),
                title: "Q3 plan".into(),
                source: "files".into(),
                metadata: json!({}),
            },
            chunk: "x".repeat(MAX_SNIPPET_CHARS + 100),
            score: 1.0,
        }];
        let block = context_block(&results).unwrap();
        assert!(block.contains("[1] Q3 plan (files): "));
        assert!(block.len() < MAX_SNIPPET_CHARS + 100);
    }

    #[test]
    fn test_annotate_pending() {
        assert_eq!(annotate_pending("Done.", 0), "Done.");
        assert!(annotate_pending("Done.", 1).ends_with("(1 action is awaiting your approval.)"));
        assert!(annotate_pending("Done.", 3).contains("3 actions"));
    }

    #[test]
    fn test_tool_results_message() {
        let text = tool_results_message(&[("search_files".into(), "{\"results\":[]}".into())]);
        assert!(text.contains("- search_files: {\"results\":[]}"));
    }
}
