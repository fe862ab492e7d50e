//! Style draft refiner
//!
//! Rewrites an email body in the user's style with a bounded best-of-N
//! loop: generate, score, and retry with feedback on the weakest
//! dimensions until a candidate reaches the threshold or attempts run out.
//! The best candidate is kept and only replaced by a strictly better one.

use anyhow::Result;
use sdk::errors::EngineError;
use sdk::style::{StyleProfile, StyleScore};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::prompts::{draft_prompt, retry_prompt, style_instructions, DRAFT_SYSTEM_PROMPT};
use super::scorer::DraftScorer;
use super::store::StyleProfileStore;
use crate::config::{StyleConfig, MAX_STYLE_ATTEMPTS};
use crate::llm::{ChatRequest, LLMProvider, Message};

/// Number of weak dimensions named in a retry prompt
const RETRY_FOCUS: usize = 2;

/// Per-call bound used until [`StyleRefiner::with_timeout`] sets one
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Draft to be styled
#[derive(Debug, Clone, Default)]
pub struct StyleDraftArgs {
    pub body: String,
    pub recipient: Option<String>,
    pub subject: Option<String>,
}

/// Result of styling a draft
#[derive(Debug, Clone, PartialEq)]
pub struct StyledDraft {
    pub body: String,
    /// Score of `body`; `None` when no active profile was available
    pub style_score: Option<StyleScore>,
    /// Model calls made
    pub attempts: u32,
}

impl StyledDraft {
    fn unchanged(body: String) -> Self {
        Self {
            body,
            style_score: None,
            attempts: 0,
        }
    }
}

pub struct StyleRefiner {
    llm: Arc<dyn LLMProvider>,
    profiles: Arc<dyn StyleProfileStore>,
    scorer: Arc<dyn DraftScorer>,
    score_threshold: u32,
    max_attempts: u32,
    temperature: f32,
    call_timeout: Duration,
}

impl StyleRefiner {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        profiles: Arc<dyn StyleProfileStore>,
        scorer: Arc<dyn DraftScorer>,
        config: &StyleConfig,
    ) -> Self {
        Self {
            llm,
            profiles,
            scorer,
            score_threshold: config.score_threshold,
            max_attempts: config.max_attempts.clamp(1, MAX_STYLE_ATTEMPTS),
            temperature: config.temperature,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Bound each generation call; a call that runs over counts as a failure
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// The user's profile if it is active
    pub async fn active_profile(&self) -> Option<StyleProfile> {
        match self.profiles.active_profile().await {
            Ok(Some(profile)) if profile.is_active => Some(profile),
            Ok(_) => None,
            Err(e) => {
                warn!("Style profile unavailable: {:#}", e);
                None
            }
        }
    }

    /// Rewrite `args.body` in the user's style
    ///
    /// Never fails: without an active profile, or when the first generation
    /// fails, the original body is returned unscored.
    pub async fn apply_style_to_draft(&self, args: StyleDraftArgs) -> StyledDraft {
        let Some(profile) = self.active_profile().await else {
            debug!("No active style profile, draft left unchanged");
            return StyledDraft::unchanged(args.body);
        };

        let instructions = style_instructions(&profile);
        let first = draft_prompt(
            &instructions,
            args.recipient.as_deref(),
            args.subject.as_deref(),
            &args.body,
        );

        let mut attempts = 1;
        let candidate = match self.generate(first).await {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Draft generation failed, keeping original: {:#}", e);
                return StyledDraft {
                    attempts,
                    ..StyledDraft::unchanged(args.body)
                };
            }
        };

        let score = self.scorer.score(&candidate, &profile);
        debug!("Draft attempt 1 scored {}", score.overall);
        let mut best = (candidate, score);

        while best.1.overall < self.score_threshold && attempts < self.max_attempts {
            let prompt = retry_prompt(&instructions, &best.0, &best.1.weakest(RETRY_FOCUS));
            attempts += 1;

            let candidate = match self.generate(prompt).await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!("Draft retry failed, keeping best candidate: {:#}", e);
                    break;
                }
            };

            let score = self.scorer.score(&candidate, &profile);
            debug!("Draft attempt {} scored {}", attempts, score.overall);
            if score.overall > best.1.overall {
                best = (candidate, score);
            }
        }

        info!(
            "Styled draft scored {} after {} attempt(s)",
            best.1.overall, attempts
        );

        StyledDraft {
            body: best.0,
            style_score: Some(best.1),
            attempts,
        }
    }

    async fn generate(&self, prompt: String) -> Result<String> {
        let request = ChatRequest::new(vec![
            Message::system(DRAFT_SYSTEM_PROMPT),
            Message::user(prompt),
        ])
        .with_temperature(self.temperature);

        let completion = timeout(self.call_timeout, self.llm.chat(request))
            .await
            .map_err(|_| EngineError::LLMTimeout)??;
        let text = completion.message.trim();
        if text.is_empty() {
            anyhow::bail!("model returned an empty draft");
        }
        Ok(text.to_string())
    }
}
