//! Writing style types
//!
//! A [`StyleProfile`] is the learned model of how the user writes email:
//! which greetings and signoffs they reach for, how formal they are, how long
//! their sentences run. It becomes active once enough sent mail has been
//! analyzed. A [`StyleScore`] is the result of comparing one draft against a
//! profile and lives only for the duration of a request.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A phrase the user habitually uses, with its relative frequency (0.0-1.0)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhrasePattern {
    pub text: String,
    #[serde(default)]
    pub frequency: f64,
}

impl PhrasePattern {
    pub fn new(text: impl Into<String>, frequency: f64) -> Self {
        Self {
            text: text.into(),
            frequency,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GreetingPatterns {
    #[serde(default)]
    pub patterns: Vec<PhrasePattern>,
    /// Whether the greeting usually includes the recipient's name
    #[serde(default)]
    pub uses_recipient_name: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SignoffPatterns {
    #[serde(default)]
    pub patterns: Vec<PhrasePattern>,
    /// Whether the signoff is followed by the user's name
    #[serde(default)]
    pub includes_name: bool,
}

/// Tone on 0-100 scales
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToneProfile {
    /// 0 = very casual, 100 = very formal
    pub formality_score: u32,
    #[serde(default = "default_midpoint")]
    pub directness: u32,
    #[serde(default = "default_midpoint")]
    pub warmth: u32,
}

impl Default for ToneProfile {
    fn default() -> Self {
        Self {
            formality_score: default_midpoint(),
            directness: default_midpoint(),
            warmth: default_midpoint(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructureProfile {
    /// Average words per sentence
    pub avg_sentence_length: f64,
    #[serde(default)]
    pub avg_email_length: u32,
    #[serde(default)]
    pub uses_lists: bool,
}

impl Default for StructureProfile {
    fn default() -> Self {
        Self {
            avg_sentence_length: 14.0,
            avg_email_length: 0,
            uses_lists: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VocabularyProfile {
    #[serde(default)]
    pub common_phrases: Vec<String>,
    #[serde(default)]
    pub avoided_words: Vec<String>,
    #[serde(default)]
    pub uses_contractions: bool,
}

/// Learned writing style of the user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleProfile {
    pub id: String,
    /// Whether enough samples were analyzed for the profile to be trusted
    pub is_active: bool,
    #[serde(default)]
    pub emails_analyzed: u32,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub greetings: GreetingPatterns,
    #[serde(default)]
    pub signoffs: SignoffPatterns,
    #[serde(default)]
    pub tone: ToneProfile,
    #[serde(default)]
    pub structure: StructureProfile,
    #[serde(default)]
    pub vocabulary: VocabularyProfile,
}

impl StyleProfile {
    /// Most frequent greeting, if any
    pub fn top_greeting(&self) -> Option<&PhrasePattern> {
        top_pattern(&self.greetings.patterns)
    }

    /// Most frequent signoff, if any
    pub fn top_signoff(&self) -> Option<&PhrasePattern> {
        top_pattern(&self.signoffs.patterns)
    }
}

fn top_pattern(patterns: &[PhrasePattern]) -> Option<&PhrasePattern> {
    patterns
        .iter()
        .max_by(|a, b| a.frequency.total_cmp(&b.frequency))
}

fn default_midpoint() -> u32 {
    50
}

/// Scored dimension of a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StyleDimension {
    Greeting,
    Signoff,
    SentenceLength,
    Formality,
    Vocabulary,
}

impl StyleDimension {
    pub const ALL: [StyleDimension; 5] = [
        StyleDimension::Greeting,
        StyleDimension::Signoff,
        StyleDimension::SentenceLength,
        StyleDimension::Formality,
        StyleDimension::Vocabulary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StyleDimension::Greeting => "greeting",
            StyleDimension::Signoff => "signoff",
            StyleDimension::SentenceLength => "sentence_length",
            StyleDimension::Formality => "formality",
            StyleDimension::Vocabulary => "vocabulary",
        }
    }
}

impl fmt::Display for StyleDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score of one candidate draft against a profile
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StyleScore {
    /// 0-100
    pub overall: u32,
    pub breakdown: BTreeMap<StyleDimension, u32>,
}

impl StyleScore {
    pub fn new(overall: u32, breakdown: BTreeMap<StyleDimension, u32>) -> Self {
        Self {
            overall: overall.min(100),
            breakdown,
        }
    }

    /// Dimensions sorted ascending by score (weakest first)
    ///
    /// Ties keep dimension declaration order.
    pub fn weakest(&self, n: usize) -> Vec<(StyleDimension, u32)> {
        let mut dims: Vec<(StyleDimension, u32)> =
            self.breakdown.iter().map(|(d, s)| (*d, *s)).collect();
        dims.sort_by_key(|(d, s)| (*s, *d));
        dims.truncate(n);
        dims
    }
}
