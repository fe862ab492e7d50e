//! Agent action types
//!
//! An [`AgentAction`] is one requested effect on the world: sending an email,
//! creating a calendar event, fetching a web page. Every action type belongs to
//! exactly one [`Domain`] (used to look up the autonomy tier) and one
//! [`ActionClass`] (used by tiers that only auto-approve routine work).
//!
//! Both mappings live in [`ACTION_TABLE`]; adding an action type is a table
//! row, not a new branch.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

/// Coarse category grouping related action types for policy purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Email,
    Calendar,
    Reminders,
    Web,
}

impl Domain {
    /// All domains, in display order
    pub const ALL: [Domain; 4] = [
        Domain::Email,
        Domain::Calendar,
        Domain::Reminders,
        Domain::Web,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Email => "email",
            Domain::Calendar => "calendar",
            Domain::Reminders => "reminders",
            Domain::Web => "web",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| EngineError::UnknownDomain(s.to_string()))
    }
}

/// How far-reaching an action is
///
/// - **Read**: fetches information, changes nothing
/// - **Write**: changes state in a reversible way (drafts, archive, events)
/// - **Execute**: irreversible or externally visible (sending, deleting)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionClass {
    Read,
    Write,
    Execute,
}

/// Closed set of externally-executed action types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "email.send")]
    EmailSend,
    #[serde(rename = "email.draft")]
    EmailDraft,
    #[serde(rename = "email.archive")]
    EmailArchive,
    #[serde(rename = "calendar.create")]
    CalendarCreate,
    #[serde(rename = "calendar.update")]
    CalendarUpdate,
    #[serde(rename = "calendar.delete")]
    CalendarDelete,
    #[serde(rename = "reminder.create")]
    ReminderCreate,
    #[serde(rename = "web.search")]
    WebSearch,
    #[serde(rename = "web.fetch")]
    WebFetch,
}

/// Action type → (wire name, domain, class)
pub const ACTION_TABLE: &[(ActionType, &str, Domain, ActionClass)] = &[
    (ActionType::EmailSend, "email.send", Domain::Email, ActionClass::Execute),
    (ActionType::EmailDraft, "email.draft", Domain::Email, ActionClass::Write),
    (ActionType::EmailArchive, "email.archive", Domain::Email, ActionClass::Write),
    (ActionType::CalendarCreate, "calendar.create", Domain::Calendar, ActionClass::Write),
    (ActionType::CalendarUpdate, "calendar.update", Domain::Calendar, ActionClass::Write),
    (ActionType::CalendarDelete, "calendar.delete", Domain::Calendar, ActionClass::Execute),
    (ActionType::ReminderCreate, "reminder.create", Domain::Reminders, ActionClass::Write),
    (ActionType::WebSearch, "web.search", Domain::Web, ActionClass::Read),
    (ActionType::WebFetch, "web.fetch", Domain::Web, ActionClass::Read),
];

impl ActionType {
    /// Table rows are in declaration order, so the discriminant is the index.
    fn row(&self) -> &'static (ActionType, &'static str, Domain, ActionClass) {
        &ACTION_TABLE[*self as usize]
    }

    pub fn as_str(&self) -> &'static str {
        self.row().1
    }

    pub fn domain(&self) -> Domain {
        self.row().2
    }

    pub fn class(&self) -> ActionClass {
        self.row().3
    }

    /// All action types in table order
    pub fn all() -> impl Iterator<Item = ActionType> {
        ACTION_TABLE.iter().map(|(t, _, _, _)| *t)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ACTION_TABLE
            .iter()
            .find(|(_, name, _, _)| *name == s)
            .map(|(t, _, _, _)| *t)
            .ok_or_else(|| EngineError::UnknownActionType(s.to_string()))
    }
}

/// Lifecycle state of an action
///
/// Transitions only move forward:
/// `PendingApproval → {Executed, Failed, Rejected}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    PendingApproval,
    Executed,
    Failed,
    Rejected,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::PendingApproval => "pending_approval",
            ActionStatus::Executed => "executed",
            ActionStatus::Failed => "failed",
            ActionStatus::Rejected => "rejected",
        }
    }

    /// Whether `self → next` is a legal transition
    pub fn can_transition_to(&self, next: ActionStatus) -> bool {
        matches!(
            (self, next),
            (
                ActionStatus::PendingApproval,
                ActionStatus::Executed | ActionStatus::Failed | ActionStatus::Rejected
            )
        )
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ActionStatus::PendingApproval)
    }
}

impl FromStr for ActionStatus {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending_approval" => Ok(ActionStatus::PendingApproval),
            "executed" => Ok(ActionStatus::Executed),
            "failed" => Ok(ActionStatus::Failed),
            "rejected" => Ok(ActionStatus::Rejected),
            other => Err(EngineError::Database(format!(
                "unknown action status '{}'",
                other
            ))),
        }
    }
}

/// One requested effect on the world
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentAction {
    pub id: String,
    pub action: ActionType,
    pub payload: serde_json::Value,
    pub reasoning: String,
    pub domain: Domain,
    /// Autonomy tier active for the domain when the decision was made
    pub tier: String,
    pub status: ActionStatus,
    /// Unix epoch milliseconds
    pub created_at: i64,
    pub executed_at: Option<i64>,
    pub response: Option<ActionOutcome>,
}

/// Result status reported by the action executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Outcome of executing an action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionOutcome {
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ActionOutcome {
    pub fn success(data: Option<serde_json::Value>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            data,
        }
    }

    /// Failure carrying an error message under `data.error`
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Failure,
            data: Some(serde_json::json!({ "error": message.into() })),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Status an action moves to after this outcome
    pub fn resulting_status(&self) -> ActionStatus {
        match self.status {
            OutcomeStatus::Success => ActionStatus::Executed,
            OutcomeStatus::Failure => ActionStatus::Failed,
        }
    }
}
