//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use sdk::actions::{ActionOutcome, ActionType};
use sdk::style::{StyleDimension, StyleProfile, StyleScore};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use semblance_engine::agent::{AgentCore, Collaborators};
use semblance_engine::autonomy::AutonomyTier;
use semblance_engine::config::Config;
use semblance_engine::db::Database;
use semblance_engine::executor::ActionExecutor;
use semblance_engine::knowledge::{KnowledgeSearch, SearchOptions, SearchResult};
use semblance_engine::llm::{self, ChatCompletion, ChatRequest, LLMError, LLMProvider, TokenUsage, ToolCall};
use semblance_engine::style::prompts::DRAFT_SYSTEM_PROMPT;
use semblance_engine::style::{DraftScorer, HeuristicScorer, StyleProfileStore};

/// Model double
///
/// Requests carrying tools get the next scripted tool-call batch, draft
/// requests get "styled draft N", and the follow-up call gets "All done."
#[derive(Default)]
pub struct ScriptedLLM {
    tool_batches: Mutex<VecDeque<Vec<ToolCall>>>,
    pub requests: Mutex<Vec<ChatRequest>>,
    pub tool_calls: AtomicUsize,
    pub draft_calls: AtomicUsize,
    pub final_calls: AtomicUsize,
    pub fail_main: bool,
}

impl ScriptedLLM {
    pub fn new(batches: Vec<Vec<ToolCall>>) -> Self {
        Self {
            tool_batches: Mutex::new(batches.into()),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_main: true,
            ..Default::default()
        }
    }

    pub fn push_batch(&self, batch: Vec<ToolCall>) {
        self.tool_batches.lock().unwrap().push_back(batch);
    }
}

#[async_trait]
impl LLMProvider for ScriptedLLM {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, request: ChatRequest) -> llm::Result<ChatCompletion> {
        self.requests.lock().unwrap().push(request.clone());
        let usage = TokenUsage {
            prompt: 10,
            completion: 5,
        };

        let is_draft = request
            .messages
            .first()
            .is_some_and(|m| m.content == DRAFT_SYSTEM_PROMPT);

        if is_draft {
            let n = self.draft_calls.fetch_add(1, Ordering::SeqCst) + 1;
            return Ok(ChatCompletion {
                message: format!("styled draft {}", n),
                tool_calls: Vec::new(),
                usage,
            });
        }

        if self.fail_main {
            return Err(LLMError::ProviderUnavailable("model offline".to_string()));
        }

        if !request.tools.is_empty() {
            self.tool_calls.fetch_add(1, Ordering::SeqCst);
            let batch = self.tool_batches.lock().unwrap().pop_front().unwrap_or_default();
            let message = if batch.is_empty() {
                "Here is what I found.".to_string()
            } else {
                String::new()
            };
            return Ok(ChatCompletion {
                message,
                tool_calls: batch,
                usage,
            });
        }

        self.final_calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatCompletion {
            message: "All done.".to_string(),
            tool_calls: Vec::new(),
            usage,
        })
    }
}

/// Executor that records what it was asked to do
#[derive(Default)]
pub struct RecordingExecutor {
    pub sent: Mutex<Vec<(ActionType, Value)>>,
    pub fail: bool,
}

impl RecordingExecutor {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn send_action(&self, action: ActionType, payload: &Value) -> anyhow::Result<ActionOutcome> {
        self.sent.lock().unwrap().push((action, payload.clone()));
        if self.fail {
            anyhow::bail!("gateway unreachable");
        }
        Ok(ActionOutcome::success(Some(json!({ "ok": true }))))
    }
}

/// Knowledge double returning fixed results
#[derive(Default)]
pub struct StaticKnowledge {
    pub results: Vec<SearchResult>,
    pub fail: bool,
}

#[async_trait]
impl KnowledgeSearch for StaticKnowledge {
    async fn search(&self, _query: &str, options: SearchOptions) -> anyhow::Result<Vec<SearchResult>> {
        if self.fail {
            anyhow::bail!("index unavailable");
        }
        Ok(self.results.iter().take(options.limit).cloned().collect())
    }
}

pub struct FixedProfile(pub Option<StyleProfile>);

#[async_trait]
impl StyleProfileStore for FixedProfile {
    async fn active_profile(&self) -> anyhow::Result<Option<StyleProfile>> {
        Ok(self.0.clone())
    }
}

/// Scorer returning scripted overall scores; greeting is always weakest
pub struct ScriptedScorer(Mutex<VecDeque<u32>>);

impl ScriptedScorer {
    pub fn new(scores: &[u32]) -> Self {
        Self(Mutex::new(scores.iter().copied().collect()))
    }
}

impl DraftScorer for ScriptedScorer {
    fn score(&self, _draft: &str, _profile: &StyleProfile) -> StyleScore {
        let overall = self.0.lock().unwrap().pop_front().unwrap_or(0);
        let breakdown: BTreeMap<StyleDimension, u32> = StyleDimension::ALL
            .into_iter()
            .map(|d| {
                let s = if d == StyleDimension::Greeting {
                    overall.saturating_sub(20)
                } else {
                    overall
                };
                (d, s)
            })
            .collect();
        StyleScore::new(overall, breakdown)
    }
}

pub fn profile(active: bool) -> StyleProfile {
    serde_json::from_value(json!({
        "id": "profile-1",
        "is_active": active,
        "user_name": "Sam",
        "greetings": {"patterns": [{"text": "Hi", "frequency": 0.8}]},
        "signoffs": {"patterns": [{"text": "Cheers", "frequency": 0.9}], "includes_name": true},
        "tone": {"formality_score": 30}
    }))
    .unwrap()
}

pub fn send_email(to: &str) -> ToolCall {
    ToolCall::generated(
        "send_email",
        json!({"to": [to], "subject": "Quarterly numbers", "body": "Numbers attached."}),
    )
}

pub fn test_config(tier: AutonomyTier) -> Config {
    let mut config = Config::default_config();
    config.autonomy.default_tier = tier;
    config
}

/// Agent wiring with every collaborator replaceable
pub struct Harness {
    pub _temp: TempDir,
    pub db: Database,
    pub agent: AgentCore,
    pub llm: Arc<ScriptedLLM>,
    pub executor: Arc<RecordingExecutor>,
}

pub struct HarnessBuilder {
    config: Config,
    llm: Arc<ScriptedLLM>,
    executor: Arc<RecordingExecutor>,
    knowledge: Arc<dyn KnowledgeSearch>,
    profile: Option<StyleProfile>,
    scorer: Arc<dyn DraftScorer>,
}

impl HarnessBuilder {
    pub fn new(tier: AutonomyTier) -> Self {
        Self {
            config: test_config(tier),
            llm: Arc::new(ScriptedLLM::default()),
            executor: Arc::new(RecordingExecutor::default()),
            knowledge: Arc::new(StaticKnowledge::default()),
            profile: None,
            scorer: Arc::new(HeuristicScorer),
        }
    }

    pub fn config(mut self, f: impl FnOnce(&mut Config)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn llm(mut self, llm: ScriptedLLM) -> Self {
        self.llm = Arc::new(llm);
        self
    }

    pub fn executor(mut self, executor: RecordingExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    pub fn knowledge(mut self, knowledge: StaticKnowledge) -> Self {
        self.knowledge = Arc::new(knowledge);
        self
    }

    pub fn profile(mut self, profile: StyleProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn scorer(mut self, scorer: impl DraftScorer + 'static) -> Self {
        self.scorer = Arc::new(scorer);
        self
    }

    pub async fn build(self) -> Harness {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("test.db")).await.unwrap();

        let agent = AgentCore::new(
            &db,
            &self.config,
            Collaborators {
                llm: self.llm.clone(),
                knowledge: self.knowledge,
                executor: self.executor.clone(),
                profiles: Arc::new(FixedProfile(self.profile)),
                scorer: self.scorer,
            },
        );

        Harness {
            _temp: temp,
            db,
            agent,
            llm: self.llm,
            executor: self.executor,
        }
    }
}
