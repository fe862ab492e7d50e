//! Tool catalog
//!
//! Every tool the model can call is a row of [`TOOL_CATALOG`]. Local tools
//! answer from the user's indexed data and run immediately. Gated tools map
//! to an [`ActionType`] and go through the autonomy engine.

use sdk::actions::ActionType;
use sdk::errors::EngineError;
use serde_json::{json, Value};

use crate::llm::ToolDefinition;

/// Tools answered inside the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalTool {
    SearchFiles,
    SearchEmails,
    CheckCalendar,
    CategorizeEmail,
    DetectCalendarConflicts,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Local(LocalTool),
    Gated(ActionType),
}

#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: ToolKind,
}

pub const TOOL_CATALOG: &[ToolSpec] = &[
    ToolSpec {
        name: "search_files",
        description: "Search the user's local documents and notes",
        kind: ToolKind::Local(LocalTool::SearchFiles),
    },
    ToolSpec {
        name: "search_emails",
        description: "Search the user's email",
        kind: ToolKind::Local(LocalTool::SearchEmails),
    },
    ToolSpec {
        name: "check_calendar",
        description: "Look up events on the user's calendar",
        kind: ToolKind::Local(LocalTool::CheckCalendar),
    },
    ToolSpec {
        name: "categorize_email",
        description: "Classify an email as newsletter, receipt, meeting, actionable or personal",
        kind: ToolKind::Local(LocalTool::CategorizeEmail),
    },
    ToolSpec {
        name: "detect_calendar_conflicts",
        description: "Check whether a proposed time overlaps existing calendar events",
        kind: ToolKind::Local(LocalTool::DetectCalendarConflicts),
    },
    ToolSpec {
        name: "send_email",
        description: "Send an email on the user's behalf",
        kind: ToolKind::Gated(ActionType::EmailSend),
    },
    ToolSpec {
        name: "draft_email",
        description: "Save an email draft for the user to review",
        kind: ToolKind::Gated(ActionType::EmailDraft),
    },
    ToolSpec {
        name: "archive_email",
        description: "Archive an email",
        kind: ToolKind::Gated(ActionType::EmailArchive),
    },
    ToolSpec {
        name: "create_calendar_event",
        description: "Create a calendar event",
        kind: ToolKind::Gated(ActionType::CalendarCreate),
    },
    ToolSpec {
        name: "update_calendar_event",
        description: "Change an existing calendar event",
        kind: ToolKind::Gated(ActionType::CalendarUpdate),
    },
    ToolSpec {
        name: "delete_calendar_event",
        description: "Delete a calendar event",
        kind: ToolKind::Gated(ActionType::CalendarDelete),
    },
    ToolSpec {
        name: "create_reminder",
        description: "Create a reminder",
        kind: ToolKind::Gated(ActionType::ReminderCreate),
    },
    ToolSpec {
        name: "search_web",
        description: "Search the web",
        kind: ToolKind::Gated(ActionType::WebSearch),
    },
    ToolSpec {
        name: "fetch_url",
        description: "Fetch the contents of a web page",
        kind: ToolKind::Gated(ActionType::WebFetch),
    },
];

/// Look up a tool by name
pub fn lookup(name: &str) -> Option<&'static ToolSpec> {
    TOOL_CATALOG.iter().find(|t| t.name == name)
}

pub fn classify(name: &str) -> Option<ToolKind> {
    lookup(name).map(|t| t.kind)
}

/// Definitions sent to the model
pub fn tool_definitions() -> Vec<ToolDefinition> {
    TOOL_CATALOG
        .iter()
        .map(|t| ToolDefinition {
            name: t.name.to_string(),
            description: t.description.to_string(),
            parameters: parameters(t.name),
        })
        .collect()
}

fn string_list() -> Value {
    json!({"type": "array", "items": {"type": "string"}})
}

fn search_schema(what: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "query": {"type": "string", "description": format!("What to look for in {}", what)},
            "limit": {"type": "integer", "minimum": 1}
        },
        "required": ["query"]
    })
}

fn email_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "to": string_list(),
            "cc": string_list(),
            "subject": {"type": "string"},
            "body": {"type": "string"}
        },
        "required": ["to", "subject", "body"]
    })
}

/// JSON schema of a tool's arguments
pub fn parameters(name: &str) -> Value {
    match name {
        "search_files" => search_schema("documents"),
        "search_emails" => search_schema("email"),
        "check_calendar" => search_schema("calendar events"),
        "categorize_email" => json!({
            "type": "object",
            "properties": {
                "from": {"type": "string"},
                "subject": {"type": "string"},
                "body": {"type": "string"}
            },
            "required": ["subject"]
        }),
        "detect_calendar_conflicts" => json!({
            "type": "object",
            "properties": {
                "start": {"type": "string", "format": "date-time"},
                "end": {"type": "string", "format": "date-time"},
                "query": {"type": "string"}
            },
            "required": ["start", "end"]
        }),
        "send_email" | "draft_email" => email_schema(),
        "archive_email" => json!({
            "type": "object",
            "properties": {
                "message_id": {"type": "string"},
                "from": {"type": "string"},
                "category": {"type": "string"}
            },
            "required": ["message_id"]
        }),
        "create_calendar_event" => json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "start": {"type": "string", "format": "date-time"},
                "end": {"type": "string", "format": "date-time"},
                "calendar_id": {"type": "string"},
                "attendees": string_list(),
                "location": {"type": "string"},
                "description": {"type": "string"}
            },
            "required": ["title", "start", "end"]
        }),
        "update_calendar_event" => json!({
            "type": "object",
            "properties": {
                "event_id": {"type": "string"},
                "calendar_id": {"type": "string"},
                "title": {"type": "string"},
                "start": {"type": "string", "format": "date-time"},
                "end": {"type": "string", "format": "date-time"}
            },
            "required": ["event_id"]
        }),
        "delete_calendar_event" => json!({
            "type": "object",
            "properties": {
                "event_id": {"type": "string"},
                "calendar_id": {"type": "string"}
            },
            "required": ["event_id"]
        }),
        "create_reminder" => json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"},
                "due": {"type": "string", "format": "date-time"}
            },
            "required": ["text"]
        }),
        "search_web" => json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        }),
        "fetch_url" => json!({
            "type": "object",
            "properties": {"url": {"type": "string"}},
            "required": ["url"]
        }),
        _ => json!({"type": "object", "properties": {}}),
    }
}

/// Check that arguments are an object carrying every required field
pub fn validate_arguments(name: &str, args: &Value) -> Result<(), EngineError> {
    let Some(obj) = args.as_object() else {
        return Err(EngineError::InvalidToolArguments {
            tool: name.to_string(),
            reason: "arguments must be a JSON object".to_string(),
        });
    };

    let schema = parameters(name);
    let required = schema
        .get("required")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for field in required.iter().filter_map(Value::as_str) {
        match obj.get(field) {
            None | Some(Value::Null) => {
                return Err(EngineError::InvalidToolArguments {
                    tool: name.to_string(),
                    reason: format!("missing required field '{}'", field),
                })
            }
            _ => {}
        }
    }

    Ok(())
}
