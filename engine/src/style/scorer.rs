//! Draft scoring
//!
//! Compares a candidate email body with a [`StyleProfile`] on five
//! dimensions, each 0-100. The overall score is their mean.

use regex::Regex;
use sdk::style::{PhrasePattern, StyleDimension, StyleProfile, StyleScore};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Scores a draft against a profile
pub trait DraftScorer: Send + Sync {
    fn score(&self, draft: &str, profile: &StyleProfile) -> StyleScore;
}

/// Rule-based scorer
#[derive(Debug, Default, Clone)]
pub struct HeuristicScorer;

/// Score given to a dimension the profile has no data for
const NEUTRAL: u32 = 70;

/// Signoffs are looked for in this many trailing lines
const SIGNOFF_WINDOW: usize = 3;

static GREETING: OnceLock<Regex> = OnceLock::new();
static SIGNOFF: OnceLock<Regex> = OnceLock::new();
static CONTRACTION: OnceLock<Regex> = OnceLock::new();
static CASUAL: OnceLock<Regex> = OnceLock::new();
static FORMAL: OnceLock<Regex> = OnceLock::new();

fn greeting_re() -> &'static Regex {
    GREETING.get_or_init(|| {
        Regex::new(r"(?i)^(hi|hello|hey|dear|greetings|good (morning|afternoon|evening))\b")
            .expect("Invalid greeting pattern")
    })
}

fn signoff_re() -> &'static Regex {
    SIGNOFF.get_or_init(|| {
        Regex::new(
            r"(?i)^(best|thanks|thank you|cheers|regards|kind regards|best regards|sincerely|talk soon|warmly|all the best)\b",
        )
        .expect("Invalid signoff pattern")
    })
}

fn contraction_re() -> &'static Regex {
    CONTRACTION.get_or_init(|| {
        Regex::new(r"(?i)\b\w+'(s|t|re|ve|ll|d|m)\b").expect("Invalid contraction pattern")
    })
}

fn casual_re() -> &'static Regex {
    CASUAL.get_or_init(|| {
        Regex::new(r"(?i)\b(hey|yeah|gonna|wanna|lol|btw|cool|awesome|cheers)\b|!")
            .expect("Invalid casual pattern")
    })
}

fn formal_re() -> &'static Regex {
    FORMAL.get_or_init(|| {
        Regex::new(
            r"(?i)\b(dear|sincerely|regards|kindly|please find|furthermore|therefore|accordingly|i would appreciate)\b",
        )
        .expect("Invalid formal pattern")
    })
}

impl DraftScorer for HeuristicScorer {
    fn score(&self, draft: &str, profile: &StyleProfile) -> StyleScore {
        let lines: Vec<&str> = draft
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();

        let mut breakdown = BTreeMap::new();
        breakdown.insert(StyleDimension::Greeting, score_greeting(&lines, profile));
        breakdown.insert(StyleDimension::Signoff, score_signoff(&lines, profile));
        breakdown.insert(
            StyleDimension::SentenceLength,
            score_sentence_length(draft, profile),
        );
        breakdown.insert(StyleDimension::Formality, score_formality(draft, profile));
        breakdown.insert(StyleDimension::Vocabulary, score_vocabulary(draft, profile));

        let sum: u32 = breakdown.values().sum();
        let overall = (sum as f64 / breakdown.len() as f64).round() as u32;

        StyleScore::new(overall, breakdown)
    }
}

fn starts_with_any(line: &str, patterns: &[PhrasePattern]) -> bool {
    let lowered = line.to_lowercase();
    patterns
        .iter()
        .map(|p| p.text.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .any(|p| lowered.starts_with(&p))
}

fn score_greeting(lines: &[&str], profile: &StyleProfile) -> u32 {
    let patterns = &profile.greetings.patterns;
    if patterns.is_empty() {
        return NEUTRAL;
    }

    match lines.first() {
        Some(first) if starts_with_any(first, patterns) => 100,
        Some(first) if greeting_re().is_match(first) => 60,
        _ => 20,
    }
}

fn score_signoff(lines: &[&str], profile: &StyleProfile) -> u32 {
    let patterns = &profile.signoffs.patterns;
    if patterns.is_empty() {
        return NEUTRAL;
    }

    let tail = &lines[lines.len().saturating_sub(SIGNOFF_WINDOW)..];
    let base: u32 = if tail.iter().any(|l| starts_with_any(l, patterns)) {
        100
    } else if tail.iter().any(|l| signoff_re().is_match(l)) {
        60
    } else {
        20
    };

    let missing_name = match (&profile.user_name, profile.signoffs.includes_name) {
        (Some(name), true) => {
            let name = name.to_lowercase();
            !tail.iter().any(|l| l.to_lowercase().contains(&name))
        }
        _ => false,
    };

    if missing_name {
        base.saturating_sub(15)
    } else {
        base
    }
}

/// Mean words per sentence, or `None` for an empty draft
fn average_sentence_length(text: &str) -> Option<f64> {
    let sentences: Vec<usize> = text
        .split(['.', '!', '?', '\n'])
        .map(|s| s.split_whitespace().count())
        .filter(|&n| n > 0)
        .collect();

    if sentences.is_empty() {
        None
    } else {
        Some(sentences.iter().sum::<usize>() as f64 / sentences.len() as f64)
    }
}

fn score_sentence_length(draft: &str, profile: &StyleProfile) -> u32 {
    let target = profile.structure.avg_sentence_length;
    if target <= 0.0 {
        return NEUTRAL;
    }
    let Some(actual) = average_sentence_length(draft) else {
        return 0;
    };

    let deviation = ((actual - target).abs() / target).min(1.0);
    (100.0 * (1.0 - deviation)).round() as u32
}

/// Estimated formality of a text on a 0-100 scale
fn estimate_formality(text: &str) -> u32 {
    let mut estimate: i64 = 50;
    estimate += 10 * formal_re().find_iter(text).count() as i64;
    estimate -= 10 * casual_re().find_iter(text).count() as i64;
    estimate -= 5 * contraction_re().find_iter(text).count() as i64;
    estimate.clamp(0, 100) as u32
}

fn score_formality(draft: &str, profile: &StyleProfile) -> u32 {
    let estimate = estimate_formality(draft);
    let target = profile.tone.formality_score.min(100);
    100 - estimate.abs_diff(target)
}

fn score_vocabulary(draft: &str, profile: &StyleProfile) -> u32 {
    let lowered = draft.to_lowercase();
    let vocab = &profile.vocabulary;

    let mut score: i64 = NEUTRAL as i64;

    let common_hits = vocab
        .common_phrases
        .iter()
        .filter(|p| !p.is_empty() && lowered.contains(&p.to_lowercase()))
        .count() as i64;
    score += (10 * common_hits).min(30);

    let avoided_hits = vocab
        .avoided_words
        .iter()
        .filter(|w| !w.is_empty() && contains_word(&lowered, &w.to_lowercase()))
        .count() as i64;
    score -= 25 * avoided_hits;

    if contraction_re().is_match(draft) != vocab.uses_contractions {
        score -= 20;
    }

    score.clamp(0, 100) as u32
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|w| w == word)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::style::{GreetingPatterns, SignoffPatterns, StructureProfile, ToneProfile, VocabularyProfile};

    fn profile() -> StyleProfile {
        StyleProfile {
            id: "p1".to_string(),
            is_active: true,
            emails_analyzed: 40,
            user_name: Some("Sam".to_string()),
            greetings: GreetingPatterns {
                patterns: vec![PhrasePattern::new("Hi", 0.8)],
                uses_recipient_name: true,
            },
            signoffs: SignoffPatterns {
                patterns: vec![PhrasePattern::new("Cheers", 0.7)],
                includes_name: true,
            },
            tone: ToneProfile {
                formality_score: 30,
                directness: 70,
                warmth: 60,
            },
            structure: StructureProfile {
                avg_sentence_length: 8.0,
                avg_email_length: 60,
                uses_lists: false,
            },
            vocabulary: VocabularyProfile {
                common_phrases: vec!["sounds good".to_string()],
                avoided_words: vec!["synergy".to_string()],
                uses_contractions: true,
            },
        }
    }

    #[test]
    fn test_matching_draft_scores_high() {
        let draft = "Hi Alex,\n\nSounds good to me. I'll send the notes tomorrow.\n\nCheers,\nSam";
        let score = HeuristicScorer.score(draft, &profile());

        assert_eq!(score.breakdown[&StyleDimension::Greeting], 100);
        assert_eq!(score.breakdown[&StyleDimension::Signoff], 100);
        assert!(score.overall >= 70, "overall {}", score.overall);
    }

    #[test]
    fn test_mismatched_draft_scores_lower() {
        let good = "Hi Alex,\n\nSounds good to me. I'll send the notes tomorrow.\n\nCheers,\nSam";
        let bad = "Dear Sir or Madam,\n\nPlease find attached the document regarding our synergy initiative, which I would appreciate you reviewing at your earliest convenience. Furthermore, kindly confirm receipt.\n\nSincerely";

        let p = profile();
        let good_score = HeuristicScorer.score(good, &p);
        let bad_score = HeuristicScorer.score(bad, &p);

        assert!(bad_score.overall < good_score.overall);
        assert_eq!(bad_score.breakdown[&StyleDimension::Greeting], 60);
        assert!(bad_score.breakdown[&StyleDimension::Vocabulary] < 50);
    }

    #[test]
    fn test_missing_name_in_signoff_penalized() {
        let draft = "Hi Alex,\n\nSounds good.\n\nCheers";
        let score = HeuristicScorer.score(draft, &profile());
        assert_eq!(score.breakdown[&StyleDimension::Signoff], 85);
    }

    #[test]
    fn test_empty_profile_patterns_are_neutral() {
        let mut p = profile();
        p.greetings.patterns.clear();
        p.signoffs.patterns.clear();

        let score = HeuristicScorer.score("Anything.", &p);
        assert_eq!(score.breakdown[&StyleDimension::Greeting], NEUTRAL);
        assert_eq!(score.breakdown[&StyleDimension::Signoff], NEUTRAL);
    }

    #[test]
    fn test_sentence_length() {
        assert_eq!(average_sentence_length("One two three. Four five six seven eight!"), Some(4.0));
        assert_eq!(average_sentence_length("   "), None);

        let mut p = profile();
        p.structure.avg_sentence_length = 4.0;
        assert_eq!(score_sentence_length("One two three four.", &p), 100);
        assert_eq!(score_sentence_length("", &p), 0);
    }

    #[test]
    fn test_scores_stay_in_range() {
        let p = profile();
        for draft in ["", "!!!!!!!!", "synergy synergy synergy", "a\n\n\nb"] {
            let score = HeuristicScorer.score(draft, &p);
            assert!(score.overall <= 100);
            assert!(score.breakdown.values().all(|&v| v <= 100));
            assert_eq!(score.breakdown.len(), 5);
        }
    }
}
