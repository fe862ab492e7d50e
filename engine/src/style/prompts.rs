//! Prompt text for draft generation

use sdk::style::{StyleDimension, StyleProfile};
use std::fmt::Write;

/// Guidance used while no trusted profile exists
pub const INACTIVE_PROFILE_INSTRUCTION: &str = "The user's writing style has not been learned yet. \
Write emails in a clear, friendly and professional tone: a short greeting, concise sentences, \
and a simple signoff.";

pub const DRAFT_SYSTEM_PROMPT: &str = "You rewrite email drafts so they read as if the user wrote them. \
Keep every fact, date, name and request of the original. Reply with the email body only, \
without a subject line or commentary.";

/// Instructions describing the user's style
pub fn style_instructions(profile: &StyleProfile) -> String {
    let mut out = String::from("Match the user's writing style:\n");

    if let Some(greeting) = profile.top_greeting() {
        let _ = write!(out, "- Open with \"{}\"", greeting.text);
        if profile.greetings.uses_recipient_name {
            out.push_str(" followed by the recipient's first name");
        }
        out.push('\n');
    }

    if let Some(signoff) = profile.top_signoff() {
        let _ = write!(out, "- Close with \"{}\"", signoff.text);
        if let (Some(name), true) = (&profile.user_name, profile.signoffs.includes_name) {
            let _ = write!(out, " and the name \"{}\" on the next line", name);
        }
        out.push('\n');
    }

    let _ = writeln!(
        out,
        "- Formality: {} on a 0-100 scale ({})",
        profile.tone.formality_score,
        formality_label(profile.tone.formality_score)
    );
    let _ = writeln!(
        out,
        "- Sentences average about {:.0} words",
        profile.structure.avg_sentence_length
    );

    let vocab = &profile.vocabulary;
    if vocab.uses_contractions {
        out.push_str("- Use contractions (I'm, don't, we'll)\n");
    } else {
        out.push_str("- Avoid contractions\n");
    }
    if !vocab.common_phrases.is_empty() {
        let _ = writeln!(out, "- Phrases the user often uses: {}", vocab.common_phrases.join(", "));
    }
    if !vocab.avoided_words.is_empty() {
        let _ = writeln!(out, "- Never use: {}", vocab.avoided_words.join(", "));
    }

    out
}

fn formality_label(score: u32) -> &'static str {
    match score {
        0..=33 => "casual",
        34..=66 => "neutral",
        _ => "formal",
    }
}

/// First generation request
pub fn draft_prompt(instructions: &str, recipient: Option<&str>, subject: Option<&str>, body: &str) -> String {
    let mut out = String::new();
    out.push_str(instructions);
    out.push('\n');
    if let Some(recipient) = recipient {
        let _ = writeln!(out, "Recipient: {}", recipient);
    }
    if let Some(subject) = subject {
        let _ = writeln!(out, "Subject: {}", subject);
    }
    let _ = write!(out, "\nOriginal draft:\n{}\n", body);
    out
}

/// Follow-up request naming the weakest dimensions of the best draft so far
pub fn retry_prompt(instructions: &str, best_draft: &str, weakest: &[(StyleDimension, u32)]) -> String {
    let mut out = String::new();
    out.push_str(instructions);
    out.push_str("\nThe previous draft did not match the user's style closely enough. Improve:\n");
    for (dimension, score) in weakest {
        let _ = writeln!(out, "- {} (scored {}/100): {}", dimension, score, dimension_hint(*dimension));
    }
    let _ = write!(out, "\nPrevious draft:\n{}\n", best_draft);
    out
}

fn dimension_hint(dimension: StyleDimension) -> &'static str {
    match dimension {
        StyleDimension::Greeting => "use the user's usual greeting",
        StyleDimension::Signoff => "use the user's usual signoff",
        StyleDimension::SentenceLength => "adjust sentence length to the user's average",
        StyleDimension::Formality => "match the user's level of formality",
        StyleDimension::Vocabulary => "use the user's phrasing and avoid words they never use",
    }
}
