//! Integration tests for the orchestrator loop
//!
//! Drives `AgentCore` end to end with scripted collaborators:
//! - gated actions queued or auto-executed per autonomy tier
//! - learned approval patterns promoting repeated requests
//! - style refinement of outgoing email
//! - conversation persistence

mod common;

use common::{profile, send_email, HarnessBuilder, RecordingExecutor, ScriptedLLM, ScriptedScorer, StaticKnowledge};
use sdk::actions::{ActionStatus, ActionType};
use sdk::errors::EngineError;
use semblance_engine::autonomy::AutonomyTier;
use semblance_engine::db::TurnRole;
use semblance_engine::knowledge::{Document, SearchResult};
use semblance_engine::llm::{MessageRole, ToolCall};
use serde_json::json;
use std::sync::atomic::Ordering;

// Scenario A: guardian tier, unseen fingerprint -> queued in FIFO order
#[tokio::test]
async fn test_guardian_queues_send_email() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .llm(ScriptedLLM::new(vec![
            vec![send_email("dana@acme.com")],
            vec![send_email("lee@other.org")],
        ]))
        .build()
        .await;

    let first = h.agent.process_message("Email Dana the numbers", None).await.unwrap();
    assert_eq!(first.actions.len(), 1);
    assert_eq!(first.actions[0].status, ActionStatus::PendingApproval);
    assert_eq!(first.actions[0].action, ActionType::EmailSend);
    assert_eq!(first.actions[0].tier, "guardian");
    assert!(first.message.contains("1 action is awaiting your approval"));

    let second = h
        .agent
        .process_message("And Lee too", Some(&first.conversation_id))
        .await
        .unwrap();

    let pending = h.agent.get_pending_actions().await.unwrap();
    let ids: Vec<_> = pending.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec![first.actions[0].id.as_str(), second.actions[0].id.as_str()]);
    assert_eq!(h.executor.count(), 0);
}

// Scenario B: three approvals with threshold 3 -> the 4th runs on its own
#[tokio::test]
async fn test_learned_pattern_auto_executes() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .config(|c| {
            c.autonomy.approval_thresholds.insert("email".to_string(), 3);
        })
        .build()
        .await;

    for i in 0..3 {
        h.llm.push_batch(vec![send_email("dana@acme.com")]);
        let response = h.agent.process_message(&format!("send #{}", i), None).await.unwrap();
        let id = &response.actions[0].id;
        assert_eq!(response.actions[0].status, ActionStatus::PendingApproval);

        let approved = h.agent.approve_action(id).await.unwrap();
        assert_eq!(approved.status, ActionStatus::Executed);
        assert!(approved.executed_at.is_some());
    }

    let payload = json!({"to": ["dana@acme.com"], "subject": "s", "body": "b"});
    assert_eq!(
        h.agent.get_approval_count(ActionType::EmailSend, &payload).await.unwrap(),
        3
    );

    h.llm.push_batch(vec![send_email("dana@acme.com")]);
    let fourth = h.agent.process_message("send #4", None).await.unwrap();
    assert_eq!(fourth.actions[0].status, ActionStatus::Executed);
    assert!(!fourth.message.contains("awaiting"));
    assert!(h.agent.get_pending_actions().await.unwrap().is_empty());
    assert_eq!(h.executor.count(), 4);

    // A different recipient domain is a different pattern
    h.llm.push_batch(vec![send_email("someone@elsewhere.net")]);
    let other = h.agent.process_message("send elsewhere", None).await.unwrap();
    assert_eq!(other.actions[0].status, ActionStatus::PendingApproval);
}

#[tokio::test]
async fn test_rejection_resets_streak() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian).build().await;

    for _ in 0..2 {
        h.llm.push_batch(vec![send_email("dana@acme.com")]);
        let r = h.agent.process_message("send", None).await.unwrap();
        h.agent.approve_action(&r.actions[0].id).await.unwrap();
    }

    h.llm.push_batch(vec![send_email("dana@acme.com")]);
    let r = h.agent.process_message("send", None).await.unwrap();
    assert!(h.agent.reject_action(&r.actions[0].id).await.unwrap());

    let patterns = h.agent.get_all_patterns().await.unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].consecutive_approvals, 0);
    assert_eq!(patterns[0].consecutive_rejections, 1);

    h.llm.push_batch(vec![send_email("dana@acme.com")]);
    let r = h.agent.process_message("send", None).await.unwrap();
    let approved = h.agent.approve_action(&r.actions[0].id).await.unwrap();
    assert_eq!(approved.status, ActionStatus::Executed);
    let payload = json!({"to": ["dana@acme.com"]});
    assert_eq!(
        h.agent.get_approval_count(ActionType::EmailSend, &payload).await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_partner_auto_approves_routine_actions_only() {
    let h = HarnessBuilder::new(AutonomyTier::Partner)
        .llm(ScriptedLLM::new(vec![vec![
            ToolCall::generated(
                "create_reminder",
                json!({"text": "Call the dentist"}),
            ),
            send_email("dana@acme.com"),
        ]]))
        .build()
        .await;

    let response = h.agent.process_message("Remind me and email Dana", None).await.unwrap();
    assert_eq!(response.actions.len(), 2);
    assert_eq!(response.actions[0].status, ActionStatus::Executed);
    assert_eq!(response.actions[1].status, ActionStatus::PendingApproval);
    assert_eq!(h.executor.count(), 1);
    assert_eq!(h.llm.final_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_execution_marks_action_failed_and_continues() {
    let h = HarnessBuilder::new(AutonomyTier::AlterEgo)
        .executor(RecordingExecutor::failing())
        .llm(ScriptedLLM::new(vec![vec![
            ToolCall::generated("fetch_url", json!({"url": "https://example.com"})),
            ToolCall::generated("search_web", json!({"query": "weather"})),
        ]]))
        .build()
        .await;

    let response = h.agent.process_message("look things up", None).await.unwrap();
    assert_eq!(response.actions.len(), 2);
    for action in &response.actions {
        assert_eq!(action.status, ActionStatus::Failed);
        let outcome = action.response.as_ref().unwrap();
        assert!(!outcome.is_success());
    }
    assert_eq!(response.message, "All done.");

    let log = h.agent.get_action_log(10).await.unwrap();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|a| a.status == ActionStatus::Failed));
}

#[tokio::test]
async fn test_unknown_and_invalid_tools_reported_to_model() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .llm(ScriptedLLM::new(vec![vec![
            ToolCall::generated("launch_rockets", json!({})),
            ToolCall::generated("send_email", json!({"to": ["a@b.com"]})),
        ]]))
        .build()
        .await;

    let response = h.agent.process_message("do something odd", None).await.unwrap();
    assert!(response.actions.is_empty());

    let requests = h.llm.requests.lock().unwrap();
    let follow_up = requests.last().unwrap();
    let tool_turn = &follow_up.messages.last().unwrap();
    assert_eq!(tool_turn.role, MessageRole::User);
    assert!(tool_turn.content.contains("launch_rockets: ERROR: Unknown tool"));
    assert!(tool_turn.content.contains("missing required field 'subject'"));
}

#[tokio::test]
async fn test_no_tool_calls_means_single_model_call() {
    let h = HarnessBuilder::new(AutonomyTier::Partner).build().await;

    let response = h.agent.process_message("hello", None).await.unwrap();
    assert_eq!(response.message, "Here is what I found.");
    assert_eq!(h.llm.tool_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.llm.final_calls.load(Ordering::SeqCst), 0);
    assert_eq!(response.tokens_used.total(), 15);
}

#[tokio::test]
async fn test_model_failure_propagates() {
    let h = HarnessBuilder::new(AutonomyTier::Partner)
        .llm(ScriptedLLM::failing())
        .build()
        .await;

    let err = h.agent.process_message("hello", Some("conv-x")).await.unwrap_err();
    assert!(err.to_string().contains("model offline"));

    let history = h.agent.get_conversation("conv-x").await.unwrap().unwrap();
    assert!(history.turns.is_empty());
}

#[tokio::test]
async fn test_knowledge_context_and_degraded_search() {
    let snippet = SearchResult {
        document: Document {
            id: "doc-1".into(),
            title: "Travel plan".into(),
            source: "files".into(),
            metadata: json!({}),
        },
        chunk: "Flight to Lisbon on May 3".into(),
        score: 2.0,
    };
    let h = HarnessBuilder::new(AutonomyTier::Partner)
        .knowledge(StaticKnowledge {
            results: vec![snippet; 8],
            fail: false,
        })
        .build()
        .await;

    let response = h.agent.process_message("when do I fly?", None).await.unwrap();
    assert_eq!(response.context.len(), 5);
    {
        let requests = h.llm.requests.lock().unwrap();
        assert!(requests[0]
            .messages
            .iter()
            .any(|m| m.role == MessageRole::System && m.content.contains("Flight to Lisbon")));
    }

    let broken = HarnessBuilder::new(AutonomyTier::Partner)
        .knowledge(StaticKnowledge {
            results: vec![],
            fail: true,
        })
        .build()
        .await;
    let response = broken.agent.process_message("when do I fly?", None).await.unwrap();
    assert!(response.context.is_empty());
}

// Scenario D: 55 then 82 -> second draft kept, two styling calls
#[tokio::test]
async fn test_email_body_styled_before_queueing() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .profile(profile(true))
        .scorer(ScriptedScorer::new(&[55, 82]))
        .llm(ScriptedLLM::new(vec![vec![ToolCall::generated(
            "draft_email",
            json!({"to": ["dana@acme.com"], "subject": "Lunch", "body": "lunch friday?"}),
        )]]))
        .build()
        .await;

    let response = h.agent.process_message("Ask Dana about lunch", None).await.unwrap();
    assert_eq!(h.llm.draft_calls.load(Ordering::SeqCst), 2);

    let score = response.style_score.unwrap();
    assert_eq!(score.overall, 82);
    assert_eq!(response.actions[0].payload["body"], "styled draft 2");

    let requests = h.llm.requests.lock().unwrap();
    let retry = requests
        .iter()
        .filter(|r| r.tools.is_empty())
        .nth(1)
        .unwrap();
    assert!(retry.messages[1].content.contains("greeting (scored 35/100)"));
}

// Scenario C through the loop: inactive profile leaves the body alone
#[tokio::test]
async fn test_inactive_profile_leaves_body_unchanged() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .profile(profile(false))
        .llm(ScriptedLLM::new(vec![vec![send_email("dana@acme.com")]]))
        .build()
        .await;

    let response = h.agent.process_message("Email Dana", None).await.unwrap();
    assert_eq!(h.llm.draft_calls.load(Ordering::SeqCst), 0);
    assert!(response.style_score.is_none());
    assert_eq!(response.actions[0].payload["body"], "Numbers attached.");

    let requests = h.llm.requests.lock().unwrap();
    assert!(requests[0].messages[0]
        .content
        .contains("writing style has not been learned yet"));
}

// Scenario E: two messages -> four turns in order
#[tokio::test]
async fn test_conversation_persists_four_turns() {
    let h = HarnessBuilder::new(AutonomyTier::Partner).build().await;

    let first = h.agent.process_message("first question", Some("conv-1")).await.unwrap();
    assert_eq!(first.conversation_id, "conv-1");
    h.agent.process_message("second question", Some("conv-1")).await.unwrap();

    let history = h.agent.get_conversation("conv-1").await.unwrap().unwrap();
    assert_eq!(history.conversation.title.as_deref(), Some("first question"));
    assert_eq!(history.turns.len(), 4);

    let roles: Vec<_> = history.turns.iter().map(|t| t.role).collect();
    assert_eq!(
        roles,
        vec![TurnRole::User, TurnRole::Assistant, TurnRole::User, TurnRole::Assistant]
    );
    assert!(history.turns.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    assert_eq!(history.turns[2].content, "second question");
    assert!(history.turns[1].tokens.is_some());

    // The second call saw the first exchange as history
    let requests = h.llm.requests.lock().unwrap();
    assert!(requests[1].messages.iter().any(|m| m.content == "first question"));
}

#[tokio::test]
async fn test_history_window_bounds_prompt() {
    let h = HarnessBuilder::new(AutonomyTier::Partner)
        .config(|c| c.agent.history_window = 2)
        .build()
        .await;

    for question in ["first question", "second question", "third question"] {
        h.agent.process_message(question, Some("conv-w")).await.unwrap();
    }

    let requests = h.llm.requests.lock().unwrap();
    assert_eq!(requests.len(), 3);
    let last = &requests[2].messages;
    assert!(!last.iter().any(|m| m.content == "first question"));
    assert!(last.iter().any(|m| m.content == "second question"));
    assert!(last.iter().any(|m| m.content == "third question"));
}

#[tokio::test]
async fn test_assistant_turn_lists_action_ids() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .llm(ScriptedLLM::new(vec![vec![send_email("dana@acme.com")]]))
        .build()
        .await;

    let response = h.agent.process_message("Email Dana", Some("conv-2")).await.unwrap();
    let history = h.agent.get_conversation("conv-2").await.unwrap().unwrap();
    assert_eq!(
        history.turns[1].actions.as_deref(),
        Some(&[response.actions[0].id.clone()][..])
    );
}

#[tokio::test]
async fn test_approving_handled_action_changes_nothing() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .llm(ScriptedLLM::new(vec![vec![send_email("dana@acme.com")]]))
        .build()
        .await;

    let response = h.agent.process_message("Email Dana", None).await.unwrap();
    let id = response.actions[0].id.clone();
    assert!(h.agent.reject_action(&id).await.unwrap());

    let err = h.agent.approve_action(&id).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ActionNotPending(_))
    ));
    assert!(!h.agent.reject_action(&id).await.unwrap());

    let stored = h.agent.get_action_log(1).await.unwrap();
    assert_eq!(stored[0].status, ActionStatus::Rejected);
    assert_eq!(h.executor.count(), 0);

    let err = h.agent.approve_action("no-such-id").await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::ActionNotPending(_))
    ));
}

#[tokio::test]
async fn test_concurrent_approvals_execute_once() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .llm(ScriptedLLM::new(vec![vec![send_email("dana@acme.com")]]))
        .build()
        .await;

    let response = h.agent.process_message("Email Dana", None).await.unwrap();
    let id = response.actions[0].id.clone();

    let (a, b) = tokio::join!(h.agent.approve_action(&id), h.agent.approve_action(&id));
    assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    assert_eq!(h.executor.count(), 1);
}

#[tokio::test]
async fn test_escalation_flow() {
    let h = HarnessBuilder::new(AutonomyTier::Guardian)
        .config(|c| {
            c.autonomy.approval_thresholds.insert("web".to_string(), 1);
        })
        .llm(ScriptedLLM::new(vec![vec![ToolCall::generated(
            "fetch_url",
            json!({"url": "https://news.example.com/today"}),
        )]]))
        .build()
        .await;

    let response = h.agent.process_message("read the news", None).await.unwrap();
    h.agent.approve_action(&response.actions[0].id).await.unwrap();

    let created = h.agent.check_escalations().await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].suggested_tier, AutonomyTier::Partner);
    assert!(h.agent.check_escalations().await.unwrap().is_empty());

    let prompt = h.agent.respond_to_escalation(&created[0].id, true).await.unwrap();
    assert_eq!(prompt.domain.as_str(), "web");

    let tiers = h.agent.get_autonomy_config().await.unwrap();
    assert_eq!(tiers[&prompt.domain], AutonomyTier::Partner);
    assert!(h.agent.get_active_escalations().await.unwrap().is_empty());

    let err = h.agent.respond_to_escalation(&created[0].id, false).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<EngineError>(),
        Some(EngineError::EscalationNotActive(_))
    ));
}
