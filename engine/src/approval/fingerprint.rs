//! Action fingerprints
//!
//! A fingerprint identifies "this kind of request" rather than one exact
//! request: sending mail to anyone at `example.com` is one pattern, whatever
//! the body says. Which payload fields take part, and how each is
//! normalized, is a table of [`FingerprintRule`]s. Free text (bodies,
//! subjects, descriptions) never takes part.
//!
//! The canonical descriptor is a map sorted by key, `{"action": ..., field: value...}`,
//! and the fingerprint is the hex SHA-256 of its JSON encoding.

use sdk::actions::ActionType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// How a payload field value is reduced before hashing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalizer {
    /// Trimmed value as-is
    #[default]
    Exact,
    /// Trimmed and lowercased
    Lowercase,
    /// Domain part of an email address, lowercased
    EmailDomain,
    /// Host of a URL, lowercased, without a leading `www.`
    UrlHost,
    /// Only whether the field is present and non-empty
    Presence,
}

impl Normalizer {
    fn apply(&self, raw: &str) -> String {
        let trimmed = raw.trim();
        match self {
            Normalizer::Exact => trimmed.to_string(),
            Normalizer::Lowercase | Normalizer::Presence => trimmed.to_lowercase(),
            Normalizer::EmailDomain => email_domain(trimmed),
            Normalizer::UrlHost => url_host(trimmed),
        }
    }
}

fn email_domain(address: &str) -> String {
    let lowered = address.to_lowercase();
    match lowered.rsplit_once('@') {
        Some((_, domain)) => domain.trim_end_matches('>').trim().to_string(),
        None => lowered,
    }
}

fn url_host(url: &str) -> String {
    let host = reqwest::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| url.to_string())
        .to_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// One payload field taking part in a fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: String,
    #[serde(default)]
    pub normalizer: Normalizer,
}

impl FieldRule {
    pub fn new(field: impl Into<String>, normalizer: Normalizer) -> Self {
        Self {
            field: field.into(),
            normalizer,
        }
    }
}

/// Fields of one action type that identify its pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerprintRule {
    pub action: ActionType,
    #[serde(default)]
    pub fields: Vec<FieldRule>,
}

/// Built-in rules for every action type
pub fn default_rules() -> Vec<FingerprintRule> {
    use Normalizer::*;

    let rule = |action, fields: Vec<FieldRule>| FingerprintRule { action, fields };

    vec![
        rule(ActionType::EmailSend, vec![FieldRule::new("to", EmailDomain)]),
        rule(ActionType::EmailDraft, vec![FieldRule::new("to", EmailDomain)]),
        rule(
            ActionType::EmailArchive,
            vec![
                FieldRule::new("from", EmailDomain),
                FieldRule::new("category", Lowercase),
            ],
        ),
        rule(
            ActionType::CalendarCreate,
            vec![
                FieldRule::new("calendar_id", Exact),
                FieldRule::new("attendees", EmailDomain),
            ],
        ),
        rule(
            ActionType::CalendarUpdate,
            vec![FieldRule::new("calendar_id", Exact)],
        ),
        rule(
            ActionType::CalendarDelete,
            vec![FieldRule::new("calendar_id", Exact)],
        ),
        rule(ActionType::ReminderCreate, vec![]),
        rule(ActionType::WebSearch, vec![]),
        rule(ActionType::WebFetch, vec![FieldRule::new("url", UrlHost)]),
    ]
}

/// A computed fingerprint and the descriptor it was hashed from
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    pub hash: String,
    pub descriptor: Value,
}

/// Computes fingerprints from the rule table
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    rules: HashMap<ActionType, Vec<FieldRule>>,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl Fingerprinter {
    /// Built-in rules, with `overrides` replacing the rule of their action type
    pub fn new(overrides: &[FingerprintRule]) -> Self {
        let mut rules: HashMap<ActionType, Vec<FieldRule>> = default_rules()
            .into_iter()
            .map(|r| (r.action, r.fields))
            .collect();

        for rule in overrides {
            rules.insert(rule.action, rule.fields.clone());
        }

        Self { rules }
    }

    /// Normalized descriptor of a request
    pub fn descriptor(&self, action: ActionType, payload: &Value) -> Value {
        let mut map: BTreeMap<String, Value> = BTreeMap::new();
        map.insert("action".to_string(), Value::String(action.as_str().to_string()));

        for rule in self.rules.get(&action).map(Vec::as_slice).unwrap_or(&[]) {
            let raw = payload.get(&rule.field);
            if let Some(value) = normalize_field(raw, rule.normalizer) {
                map.insert(rule.field.clone(), value);
            }
        }

        Value::Object(map.into_iter().collect())
    }

    pub fn fingerprint(&self, action: ActionType, payload: &Value) -> Fingerprint {
        let descriptor = self.descriptor(action, payload);
        let canonical = canonical_json(&descriptor);
        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        Fingerprint { hash, descriptor }
    }
}

fn normalize_field(raw: Option<&Value>, normalizer: Normalizer) -> Option<Value> {
    if normalizer == Normalizer::Presence {
        let present = match raw {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(_) => true,
        };
        return Some(Value::Bool(present));
    }

    match raw? {
        Value::Null => None,
        Value::Array(items) => {
            // Order and duplicates of recipients do not change the pattern
            let set: BTreeSet<String> = items
                .iter()
                .filter(|v| !v.is_null())
                .map(|v| normalizer.apply(&scalar_text(v)))
                .filter(|s| !s.is_empty())
                .collect();
            Some(Value::Array(set.into_iter().map(Value::String).collect()))
        }
        other => Some(Value::String(normalizer.apply(&scalar_text(other)))),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// JSON text with object keys sorted at every level
fn canonical_json(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, String> =
                map.iter().map(|(k, v)| (k, canonical_json(v))).collect();
            let body: Vec<String> = sorted
                .into_iter()
                .map(|(k, v)| format!("{}:{}", Value::String(k.clone()), v))
                .collect();
            format!("{{{}}}", body.join(","))
        }
        Value::Array(items) => {
            let body: Vec<String> = items.iter().map(canonical_json).collect();
            format!("[{}]", body.join(","))
        }
        scalar => scalar.to_string(),
    }
}
