//! Agent Core
//!
//! This module implements the request cycle that turns a user message into
//! a reply plus zero or more executed or queued actions:
//!
//! 1. Resolve or create the conversation and take its lock
//! 2. Retrieve context snippets from the knowledge collaborator
//! 3. Call the model with history, context and the tool catalog
//! 4. Dispatch each tool call in order: local tools run at once, gated
//!    tools pass through the autonomy engine and are executed or queued
//! 5. If any tool ran, call the model again to fold the results into a reply
//! 6. Persist the user and assistant turns
//!
//! A failed model call propagates. A failed action execution marks the
//! action `failed` and the loop continues.

use anyhow::{Context, Result};
use sdk::actions::{ActionOutcome, ActionStatus, ActionType, AgentAction, Domain};
use sdk::errors::EngineError;
use sdk::style::StyleScore;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::local_tools::LocalToolRunner;
use super::prompt::{annotate_pending, build_system_prompt, context_block, tool_results_message};
use super::tools::{classify, tool_definitions, validate_arguments, ToolKind};
use crate::approval::ApprovalPatternTracker;
use crate::autonomy::{AutonomyEngine, AutonomyTier, Decision};
use crate::config::Config;
use crate::db::{
    now_millis, ApprovalPattern, Conversation, ConversationRepository, ConversationTurn, Database,
    EscalationPrompt, NewTurn, PendingActionRepository, TokenUsage, TurnRole,
};
use crate::executor::ActionExecutor;
use crate::knowledge::{KnowledgeSearch, SearchOptions, SearchResult};
use crate::llm::{ChatCompletion, ChatRequest, LLMProvider, Message, ToolCall};
use crate::style::{DraftScorer, StyleDraftArgs, StyleProfileStore, StyleRefiner};

/// Longest slice of the user message quoted as fallback reasoning
const REASONING_QUOTE_CHARS: usize = 120;

/// External collaborators the core depends on
pub struct Collaborators {
    pub llm: Arc<dyn LLMProvider>,
    pub knowledge: Arc<dyn KnowledgeSearch>,
    pub executor: Arc<dyn ActionExecutor>,
    pub profiles: Arc<dyn StyleProfileStore>,
    pub scorer: Arc<dyn DraftScorer>,
}

/// Reply to one user message
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub message: String,
    pub conversation_id: String,
    /// Actions created while answering, in tool-call order
    pub actions: Vec<AgentAction>,
    /// Knowledge snippets shown to the model
    pub context: Vec<SearchResult>,
    pub tokens_used: TokenUsage,
    /// Score of the last styled email body, if any
    pub style_score: Option<StyleScore>,
}

/// A conversation with its turns in chronological order
#[derive(Debug, Clone, Serialize)]
pub struct ConversationHistory {
    pub conversation: Conversation,
    pub turns: Vec<ConversationTurn>,
}

/// Per-message accumulator for tool dispatch
#[derive(Default)]
struct DispatchState {
    outputs: Vec<(String, String)>,
    actions: Vec<AgentAction>,
    style_score: Option<StyleScore>,
}

/// Releases an action claim when dropped
struct ClaimGuard<'a> {
    claims: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.id);
    }
}

/// Agent Core that orchestrates the request cycle
pub struct AgentCore {
    llm: Arc<dyn LLMProvider>,
    knowledge: Arc<dyn KnowledgeSearch>,
    executor: Arc<dyn ActionExecutor>,
    refiner: StyleRefiner,
    local_tools: LocalToolRunner,
    autonomy: Arc<AutonomyEngine>,
    conversations: ConversationRepository,
    actions: PendingActionRepository,

    context_limit: usize,
    history_window: usize,
    temperature: f32,
    llm_timeout: Duration,

    /// One in-flight message per conversation
    conversation_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    /// Action ids currently being approved or rejected
    claims: Mutex<HashSet<String>>,
}

impl AgentCore {
    /// Create a new agent core over an open database
    pub fn new(db: &Database, config: &Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            llm,
            knowledge,
            executor,
            profiles,
            scorer,
        } = collaborators;

        let tracker = Arc::new(ApprovalPatternTracker::new(
            db.approval_patterns(),
            &config.autonomy,
        ));
        let autonomy = Arc::new(AutonomyEngine::new(
            config.autonomy.clone(),
            db.autonomy(),
            tracker,
        ));

        Self {
            refiner: StyleRefiner::new(Arc::clone(&llm), profiles, scorer, &config.style)
                .with_timeout(Duration::from_secs(config.llm.timeout_secs)),
            local_tools: LocalToolRunner::new(Arc::clone(&knowledge), config.agent.context_limit),
            llm,
            knowledge,
            executor,
            autonomy,
            conversations: db.conversations(),
            actions: db.pending_actions(),
            context_limit: config.agent.context_limit,
            history_window: config.agent.history_window,
            temperature: config.llm.temperature,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            conversation_locks: Mutex::new(HashMap::new()),
            claims: Mutex::new(HashSet::new()),
        }
    }

    /// Process one user message
    ///
    /// An unknown `conversation_id` starts a conversation with that id;
    /// `None` starts one with a fresh id.
    pub async fn process_message(
        &self,
        message: &str,
        conversation_id: Option<&str>,
    ) -> Result<ChatResponse> {
        let conversation_id = conversation_id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let lock = self.conversation_lock(&conversation_id);
        let _turn = lock.lock().await;

        if self
            .conversations
            .ensure_conversation(&conversation_id, message)
            .await?
        {
            info!("Started conversation {}", conversation_id);
        }

        let history = self
            .conversations
            .get_recent_turns(&conversation_id, self.history_window)
            .await?;
        let context = self.retrieve_context(message).await;

        let style_active = self.refiner.active_profile().await.is_some();
        let mut messages = vec![Message::system(build_system_prompt(style_active))];
        if let Some(block) = context_block(&context) {
            messages.push(Message::system(block));
        }
        for turn in &history {
            messages.push(match turn.role {
                TurnRole::User => Message::user(&turn.content),
                TurnRole::Assistant => Message::assistant(&turn.content),
            });
        }
        messages.push(Message::user(message));

        let mut usage = TokenUsage::default();
        let first = self
            .call_model(
                ChatRequest::new(messages.clone())
                    .with_tools(tool_definitions())
                    .with_temperature(self.temperature),
            )
            .await?;
        usage.add(first.usage);

        debug!(
            "Model requested {} tool call(s) in conversation {}",
            first.tool_calls.len(),
            conversation_id
        );

        let reasoning = reasoning_for(&first.message, message);
        let mut state = DispatchState::default();
        for call in &first.tool_calls {
            let output = self.dispatch(call, &reasoning, &mut state).await?;
            state.outputs.push((call.name.clone(), output));
        }

        let reply = if state.outputs.is_empty() {
            first.message
        } else {
            messages.push(Message::assistant(assistant_echo(&first)));
            messages.push(Message::user(tool_results_message(&state.outputs)));
            let second = self
                .call_model(ChatRequest::new(messages).with_temperature(self.temperature))
                .await?;
            usage.add(second.usage);
            second.message
        };

        let pending = state
            .actions
            .iter()
            .filter(|a| a.status == ActionStatus::PendingApproval)
            .count();
        let reply = annotate_pending(&reply, pending);

        let context_json = serde_json::to_value(&context).context("Failed to serialize context")?;
        let action_ids: Vec<String> = state.actions.iter().map(|a| a.id.clone()).collect();

        self.conversations
            .append_turn(
                &conversation_id,
                NewTurn {
                    role: TurnRole::User,
                    content: message,
                    context: (!context.is_empty()).then_some(&context_json),
                    actions: None,
                    tokens: None,
                },
            )
            .await?;
        self.conversations
            .append_turn(
                &conversation_id,
                NewTurn {
                    role: TurnRole::Assistant,
                    content: &reply,
                    context: None,
                    actions: Some(&action_ids),
                    tokens: Some(usage),
                },
            )
            .await?;

        info!(
            "Answered message in conversation {} ({} action(s), {} pending, {} tokens)",
            conversation_id,
            state.actions.len(),
            pending,
            usage.total()
        );

        Ok(ChatResponse {
            message: reply,
            conversation_id,
            actions: state.actions,
            context,
            tokens_used: usage,
            style_score: state.style_score,
        })
    }

    fn conversation_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .conversation_locks
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(id.to_string()).or_default())
    }

    async fn retrieve_context(&self, message: &str) -> Vec<SearchResult> {
        match self
            .knowledge
            .search(message, SearchOptions::new(self.context_limit))
            .await
        {
            Ok(mut results) => {
                results.truncate(self.context_limit);
                results
            }
            Err(e) => {
                warn!("Knowledge search failed, continuing without context: {:#}", e);
                Vec::new()
            }
        }
    }

    async fn call_model(&self, request: ChatRequest) -> Result<ChatCompletion> {
        match timeout(self.llm_timeout, self.llm.chat(request)).await {
            Ok(Ok(completion)) => Ok(completion),
            Ok(Err(e)) => {
                error!("LLM call failed: {}", e);
                Err(e.into())
            }
            Err(_) => {
                error!("LLM call timed out after {:?}", self.llm_timeout);
                Err(EngineError::LLMTimeout.into())
            }
        }
    }

    /// Run one tool call and return the text the model sees
    ///
    /// Storage errors propagate; everything else is reported to the model.
    async fn dispatch(
        &self,
        call: &ToolCall,
        reasoning: &str,
        state: &mut DispatchState,
    ) -> Result<String> {
        let Some(kind) = classify(&call.name) else {
            warn!("Model called unknown tool '{}'", call.name);
            return Ok(format!("ERROR: {}", EngineError::UnknownTool(call.name.clone())));
        };

        match kind {
            ToolKind::Local(tool) => Ok(self.local_tools.run(tool, &call.arguments).await),
            ToolKind::Gated(action_type) => {
                if let Err(e) = validate_arguments(&call.name, &call.arguments) {
                    warn!("Rejected tool call: {}", e);
                    return Ok(format!("ERROR: {}", e));
                }

                let mut payload = call.arguments.clone();
                if matches!(action_type, ActionType::EmailSend | ActionType::EmailDraft) {
                    self.style_email(&mut payload, &mut state.style_score).await;
                }

                let action = self.propose(action_type, payload, reasoning).await?;
                let output = action_summary(&action);
                state.actions.push(action);
                Ok(output)
            }
        }
    }

    /// Replace the email body with a styled version
    async fn style_email(&self, payload: &mut Value, style_score: &mut Option<StyleScore>) {
        let Some(body) = payload.get("body").and_then(Value::as_str) else {
            return;
        };

        let args = StyleDraftArgs {
            body: body.to_string(),
            recipient: first_recipient(payload),
            subject: payload
                .get("subject")
                .and_then(Value::as_str)
                .map(str::to_string),
        };
        let styled = self.refiner.apply_style_to_draft(args).await;

        if styled.style_score.is_some() {
            *style_score = styled.style_score;
        }
        payload["body"] = Value::String(styled.body);
    }

    /// Decide, then execute or queue a gated action
    async fn propose(
        &self,
        action_type: ActionType,
        payload: Value,
        reasoning: &str,
    ) -> Result<AgentAction> {
        let assessment = self.autonomy.assess(action_type, &payload).await?;

        let mut action = AgentAction {
            id: Uuid::new_v4().to_string(),
            action: action_type,
            payload,
            reasoning: reasoning.to_string(),
            domain: assessment.domain,
            tier: assessment.tier.as_str().to_string(),
            status: ActionStatus::PendingApproval,
            created_at: now_millis()?,
            executed_at: None,
            response: None,
        };

        match assessment.decision {
            Decision::AutoApprove => {
                let outcome = self.execute(action_type, &action.payload).await;
                action.status = outcome.resulting_status();
                action.executed_at = Some(now_millis()?);
                action.response = Some(outcome);
                info!(
                    "Auto-executed {} {} ({})",
                    action_type,
                    action.id,
                    action.status.as_str()
                );
            }
            Decision::RequireApproval => {
                info!("Queued {} {} for approval", action_type, action.id);
            }
        }

        self.actions
            .insert(&action)
            .await
            .context("Failed to record action")?;

        Ok(action)
    }

    /// Execute through the collaborator; transport errors become failures
    async fn execute(&self, action_type: ActionType, payload: &Value) -> ActionOutcome {
        match self.executor.send_action(action_type, payload).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Execution of {} failed: {:#}", action_type, e);
                ActionOutcome::failure(e.to_string())
            }
        }
    }

    fn claim(&self, id: &str) -> Option<ClaimGuard<'_>> {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        if !claims.insert(id.to_string()) {
            return None;
        }
        Some(ClaimGuard {
            claims: &self.claims,
            id: id.to_string(),
        })
    }

    /// Execute a pending action and record the approval
    ///
    /// Fails with [`EngineError::ActionNotPending`] when the action does not
    /// exist, was already handled, or is being handled concurrently.
    pub async fn approve_action(&self, id: &str) -> Result<AgentAction> {
        let Some(_claim) = self.claim(id) else {
            return Err(EngineError::ActionNotPending(id.to_string()).into());
        };

        let action = self
            .actions
            .get(id)
            .await?
            .filter(|a| a.status == ActionStatus::PendingApproval)
            .ok_or_else(|| EngineError::ActionNotPending(id.to_string()))?;

        let outcome = self.execute(action.action, &action.payload).await;
        let status = outcome.resulting_status();
        let moved = self
            .actions
            .transition(
                id,
                ActionStatus::PendingApproval,
                status,
                Some(now_millis()?),
                Some(&outcome),
            )
            .await?;
        if !moved {
            return Err(EngineError::ActionNotPending(id.to_string()).into());
        }

        let pattern = self
            .autonomy
            .tracker()
            .record_approval(action.action, &action.payload)
            .await?;
        info!(
            "Approved {} {} ({}), streak {}/{}",
            action.action,
            id,
            status.as_str(),
            pattern.consecutive_approvals,
            pattern.threshold
        );

        self.actions
            .get(id)
            .await?
            .ok_or_else(|| EngineError::Database(format!("action {} vanished", id)).into())
    }

    /// Reject a pending action
    ///
    /// Returns `false`, changing nothing, when the action is not pending.
    pub async fn reject_action(&self, id: &str) -> Result<bool> {
        let Some(_claim) = self.claim(id) else {
            return Ok(false);
        };
        let Some(action) = self.actions.get(id).await? else {
            return Ok(false);
        };

        let moved = self
            .actions
            .transition(id, ActionStatus::PendingApproval, ActionStatus::Rejected, None, None)
            .await?;
        if !moved {
            return Ok(false);
        }

        self.autonomy
            .tracker()
            .record_rejection(action.action, &action.payload)
            .await?;
        info!("Rejected {} {}", action.action, id);

        Ok(true)
    }

    pub async fn get_conversation(&self, id: &str) -> Result<Option<ConversationHistory>> {
        let Some(conversation) = self.conversations.get_conversation(id).await? else {
            return Ok(None);
        };
        let turns = self.conversations.get_turns(id).await?;
        Ok(Some(ConversationHistory {
            conversation,
            turns,
        }))
    }

    /// Most recently updated conversations first
    pub async fn list_conversations(&self, limit: i64) -> Result<Vec<Conversation>> {
        self.conversations.list_conversations(limit).await
    }

    pub async fn get_pending_actions(&self) -> Result<Vec<AgentAction>> {
        self.actions.list_pending().await
    }

    /// Recent actions of any status, newest first
    pub async fn get_action_log(&self, limit: i64) -> Result<Vec<AgentAction>> {
        self.actions.action_log(limit).await
    }

    pub async fn get_approval_count(&self, action: ActionType, payload: &Value) -> Result<u32> {
        self.autonomy
            .tracker()
            .get_consecutive_approvals(action, payload)
            .await
    }

    pub async fn get_approval_threshold(&self, action: ActionType, payload: &Value) -> Result<u32> {
        self.autonomy.tracker().get_threshold(action, payload).await
    }

    pub async fn get_all_patterns(&self) -> Result<Vec<ApprovalPattern>> {
        self.autonomy.tracker().get_all_patterns().await
    }

    pub async fn set_autonomy_tier(&self, domain: Domain, tier: AutonomyTier) -> Result<()> {
        self.autonomy.set_tier(domain, tier).await
    }

    pub async fn get_autonomy_config(&self) -> Result<BTreeMap<Domain, AutonomyTier>> {
        self.autonomy.tiers().await
    }

    pub async fn check_escalations(&self) -> Result<Vec<EscalationPrompt>> {
        self.autonomy.check_escalations().await
    }

    pub async fn get_active_escalations(&self) -> Result<Vec<EscalationPrompt>> {
        self.autonomy.active_escalations().await
    }

    pub async fn respond_to_escalation(
        &self,
        prompt_id: &str,
        accepted: bool,
    ) -> Result<EscalationPrompt> {
        self.autonomy.respond_to_escalation(prompt_id, accepted).await
    }
}

/// Reasoning stored with actions: the model's own text, or the request
fn reasoning_for(model_text: &str, user_message: &str) -> String {
    let text = model_text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    let quoted: String = user_message.chars().take(REASONING_QUOTE_CHARS).collect();
    format!("Requested by the user: \"{}\"", quoted.trim())
}

/// Assistant turn replayed before the tool results
fn assistant_echo(first: &ChatCompletion) -> String {
    if !first.message.trim().is_empty() {
        return first.message.clone();
    }
    let calls: Vec<Value> = first
        .tool_calls
        .iter()
        .map(|c| json!({"function": c.name, "arguments": c.arguments}))
        .collect();
    json!(calls).to_string()
}

fn first_recipient(payload: &Value) -> Option<String> {
    match payload.get("to")? {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn action_summary(action: &AgentAction) -> String {
    let mut out = json!({
        "action_id": action.id,
        "action": action.action,
        "status": action.status,
    });
    match action.status {
        ActionStatus::PendingApproval => {
            out["note"] = json!("Waiting for the user's approval");
        }
        _ => {
            if let Some(response) = &action.response {
                out["result"] = json!(response);
            }
        }
    }
    out.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_prefers_model_text() {
        assert_eq!(reasoning_for("  Sending it now. ", "send it"), "Sending it now.");
        assert_eq!(
            reasoning_for("", "email Dana the notes"),
            "Requested by the user: \"email Dana the notes\""
        );
    }

    #[test]
    fn test_first_recipient() {
        assert_eq!(
            first_recipient(&json!({"to": ["a@x.com", "b@x.com"]})).as_deref(),
            Some("a@x.com")
        );
        assert_eq!(first_recipient(&json!({"to": "c@x.com"})).as_deref(), Some("c@x.com"));
        assert_eq!(first_recipient(&json!({})), None);
    }

    #[test]
    fn test_assistant_echo_lists_calls_when_silent() {
        let completion = ChatCompletion {
            tool_calls: vec![ToolCall::new("c1", "search_files", json!({"query": "plan"}))],
            ..Default::default()
        };
        let echo = assistant_echo(&completion);
        assert!(echo.contains("\"function\":\"search_files\""));
    }

    #[test]
    fn test_claim_released_on_drop() {
        let claims = Mutex::new(HashSet::from(["a1".to_string()]));
        {
            let _guard = ClaimGuard {
                claims: &claims,
                id: "a1".to_string(),
            };
        }
        assert!(claims.lock().unwrap().is_empty());
    }
}
