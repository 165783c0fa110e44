//! End-to-end runs through the coordinator with a scripted model.

mod common;

use common::mocks::{AgentMode, MockLLMClient, MockLookup, TrackingAgent};
use common::*;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wayfinder::research::faq::{FAQ_APOLOGY, FAQ_FOLLOW_UP, FAQ_OPENING};
use wayfinder::types::{
    AppError, ProfileField, RunOptions, RunOutcome, RunRequest, Turn, TurnRole,
    GENERIC_FAILURE_MESSAGE,
};

fn request(conversation: Vec<Turn>) -> RunRequest {
    RunRequest {
        run_id: None,
        conversation,
        options: RunOptions::default(),
    }
}

/// Every stage scripted except the ones named.
fn llm_without(skip: &[&str]) -> MockLLMClient {
    let replies: Vec<(&str, String)> = vec![
        ("profile-extraction", PROFILE_JSON.to_string()),
        ("research-brief", BRIEF_JSON.to_string()),
        ("research-outline", OUTLINE_JSON.to_string()),
        ("supervisor-reflection", SUPERVISOR_CONTINUE.to_string()),
        ("researcher-reflection", researcher_reflection_all()),
        ("researcher-findings", researcher_findings()),
        ("report-synthesis", REPORT_JSON.to_string()),
        ("report-faq", FAQ_ANSWER.to_string()),
    ];
    replies
        .into_iter()
        .filter(|(stage, _)| !skip.contains(stage))
        .fold(MockLLMClient::new(), |llm, (stage, reply)| llm.on(stage, reply))
}

async fn completed_run(llm: Arc<MockLLMClient>) -> (wayfinder::ResearchCoordinator, String) {
    let coordinator = coordinator(llm);
    let outcome = coordinator
        .advance(request(full_conversation()), CancellationToken::new())
        .await
        .unwrap();
    let run_id = outcome.run_id().to_string();
    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    (coordinator, run_id)
}

#[tokio::test]
async fn test_complete_conversation_produces_both_artifacts() {
    let llm = Arc::new(happy_llm());
    let coordinator = coordinator(llm.clone());

    let outcome = coordinator
        .advance(request(full_conversation()), CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::Completed {
        run_id,
        artifacts,
        path_titles,
    } = outcome
    else {
        panic!("expected a completed run, got {:?}", outcome);
    };
    assert_eq!(path_titles, PATH_TITLES.to_vec());
    assert!(artifacts.preview.len() < artifacts.full.len());
    assert!(artifacts.full.contains("## Sources"));

    // Four researchers, one lookup each, one reflection before delegation.
    assert_eq!(llm.calls("supervisor-reflection"), 1);
    assert_eq!(llm.calls("researcher-findings"), 4);
    assert_eq!(llm.calls("report-synthesis"), 1);

    let store = coordinator.store();
    assert_eq!(store.load_artifacts(&run_id).await.unwrap(), Some(artifacts));
    let state = store.load_state(&run_id).await.unwrap().unwrap();
    assert!(state.brief.is_some());
    assert_eq!(state.outline.unwrap().cell_count(), 32);
    assert_eq!(state.conversation.last().unwrap().role, TurnRole::Assistant);
}

#[tokio::test]
async fn test_missing_field_asks_one_question() {
    let reply = r#"{"role": "Staff nurse", "experience": null, "skills": null,
        "location": null, "target_salary": null, "goals": null}"#;
    let llm = Arc::new(MockLLMClient::new().on("profile-extraction", reply));
    let coordinator = coordinator(llm.clone());

    let outcome = coordinator
        .advance(request(vec![Turn::user("I'm a staff nurse.")]), CancellationToken::new())
        .await
        .unwrap();

    let RunOutcome::AwaitingUser {
        question,
        conversation,
        ..
    } = outcome
    else {
        panic!("expected a clarifying question, got {:?}", outcome);
    };
    assert_eq!(question, ProfileField::Experience.question());
    assert_eq!(conversation.len(), 2);
    assert_eq!(conversation.last().unwrap().content, question);
    assert_eq!(llm.calls("research-brief"), 0);
}

#[tokio::test]
async fn test_supplied_run_id_is_kept() {
    let coordinator = coordinator(Arc::new(happy_llm()));
    let mut req = request(full_conversation());
    req.run_id = Some("run-42".to_string());

    let outcome = coordinator.advance(req, CancellationToken::new()).await.unwrap();

    assert_eq!(outcome.run_id(), "run-42");
}

#[tokio::test]
async fn test_degraded_research_still_reports() {
    let agent = Arc::new(TrackingAgent::new(AgentMode::Failing, Duration::ZERO));
    let coordinator = coordinator(Arc::new(happy_llm())).with_sub_agent(agent.clone());

    let outcome = coordinator
        .advance(request(full_conversation()), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { .. }));
    assert!(!agent.tasks().is_empty());
}

#[tokio::test]
async fn test_abort_on_empty_research_fails_the_run() {
    let mut config = test_config();
    config.research.abort_on_empty_research = true;
    let agent = Arc::new(TrackingAgent::new(AgentMode::Failing, Duration::ZERO));
    let coordinator = coordinator_with(Arc::new(happy_llm()), Arc::new(MockLookup::new(2)), config)
        .with_sub_agent(agent);

    let outcome = coordinator
        .advance(request(full_conversation()), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { .. }));
}

#[tokio::test]
async fn test_run_options_override_worker_ceiling() {
    let agent = Arc::new(TrackingAgent::new(AgentMode::Thorough, Duration::from_millis(20)));
    let coordinator = coordinator(Arc::new(happy_llm())).with_sub_agent(agent.clone());
    let mut req = request(full_conversation());
    req.options.max_parallel_workers = Some(1);

    coordinator.advance(req, CancellationToken::new()).await.unwrap();

    assert_eq!(agent.peak(), 1);
}

#[tokio::test]
async fn test_report_failure_is_a_generic_failed_outcome() {
    let coordinator = coordinator(Arc::new(llm_without(&["report-synthesis"])));

    let outcome = coordinator
        .advance(request(full_conversation()), CancellationToken::new())
        .await
        .unwrap();

    match outcome {
        RunOutcome::Failed { reason, .. } => assert_eq!(reason, GENERIC_FAILURE_MESSAGE),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_scoping_failure_is_a_failed_outcome() {
    let coordinator = coordinator(Arc::new(llm_without(&["research-outline"])));

    let outcome = coordinator
        .advance(request(full_conversation()), CancellationToken::new())
        .await
        .unwrap();

    assert!(matches!(outcome, RunOutcome::Failed { .. }));
}

#[tokio::test]
async fn test_cancelled_run_returns_cancelled() {
    let coordinator = coordinator(Arc::new(happy_llm()));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = coordinator.advance(request(full_conversation()), cancel).await;

    assert!(matches!(result, Err(AppError::Cancelled(_))));
}

#[tokio::test]
async fn test_malformed_conversation_is_rejected() {
    let coordinator = coordinator(Arc::new(happy_llm()));

    for conversation in [
        vec![],
        vec![Turn::user("  ")],
        vec![Turn::user("hello"), Turn::assistant("What is your role?")],
    ] {
        let result = coordinator
            .advance(request(conversation), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AppError::InvalidInput(_))));
    }
}

#[tokio::test]
async fn test_faq_answers_after_completion() {
    let (coordinator, run_id) = completed_run(Arc::new(happy_llm())).await;

    let opening = coordinator.answer_question(&run_id, "   ").await.unwrap();
    assert_eq!(opening, FAQ_OPENING);

    let answer = coordinator
        .answer_question(&run_id, "Which path pays most?")
        .await
        .unwrap();
    assert!(answer.starts_with(FAQ_ANSWER));
    assert!(answer.ends_with(FAQ_FOLLOW_UP));
}

#[tokio::test]
async fn test_faq_failure_apologises() {
    let (coordinator, run_id) = completed_run(Arc::new(llm_without(&["report-faq"]))).await;

    let answer = coordinator
        .answer_question(&run_id, "Which path pays most?")
        .await
        .unwrap();

    assert_eq!(answer, FAQ_APOLOGY);
}

#[tokio::test]
async fn test_faq_for_unknown_run_is_not_found() {
    let coordinator = coordinator(Arc::new(happy_llm()));

    let result = coordinator.answer_question("no-such-run", "hello").await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_faq_before_report_is_not_found() {
    let reply = r#"{"role": "Staff nurse"}"#;
    let coordinator = coordinator(Arc::new(MockLLMClient::new().on("profile-extraction", reply)));
    let outcome = coordinator
        .advance(request(vec![Turn::user("I'm a staff nurse.")]), CancellationToken::new())
        .await
        .unwrap();

    let result = coordinator
        .answer_question(outcome.run_id(), "What now?")
        .await;

    assert!(matches!(result, Err(AppError::NotFound(_))));
}
