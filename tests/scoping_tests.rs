mod common;

use common::mocks::MockLLMClient;
use common::{BRIEF_JSON, OUTLINE_JSON, PATH_TITLES};
use std::sync::Arc;
use std::time::Duration;
use wayfinder::research::scoping::ScopingStage;
use wayfinder::types::{AppError, ConversationState, FieldValue, ProfileField, UserProfile};

fn stage(llm: MockLLMClient) -> ScopingStage {
    ScopingStage::new(Arc::new(llm), Duration::from_secs(5))
}

fn conversation() -> ConversationState {
    ConversationState::from_turns(common::full_conversation())
}

#[tokio::test]
async fn test_outline_has_four_paths_of_eight_dimensions() {
    let llm = MockLLMClient::new()
        .on("research-brief", BRIEF_JSON)
        .on("research-outline", OUTLINE_JSON);

    let (brief, outline) = stage(llm)
        .scope(&conversation(), &UserProfile::new())
        .await
        .unwrap();

    assert_eq!(outline.titles(), PATH_TITLES.to_vec());
    assert_eq!(outline.cell_count(), 32);
    assert_eq!(
        outline.paths.iter().map(|p| p.index).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    assert_eq!(brief.headline(), "Staff nurse");
    assert!(brief.narrative.starts_with("I am a staff nurse in Leeds"));
}

#[tokio::test]
async fn test_unstated_fields_are_unconstrained() {
    let reply = r#"{"role": "Staff nurse", "experience": "6 years", "skills": "triage",
        "location": "not stated", "target_salary": "n/a", "goals": "Unconstrained",
        "brief": "Find a calmer role."}"#;
    let llm = MockLLMClient::new()
        .on("research-brief", reply)
        .on("research-outline", OUTLINE_JSON);

    let (brief, _) = stage(llm)
        .scope(&conversation(), &UserProfile::new())
        .await
        .unwrap();

    assert_eq!(brief.field(ProfileField::Location), FieldValue::Unconstrained);
    assert_eq!(brief.field(ProfileField::TargetSalary), FieldValue::Unconstrained);
    assert_eq!(brief.field(ProfileField::Goals), FieldValue::Unconstrained);
    assert!(brief.render().contains("- Location: unconstrained"));
}

#[tokio::test]
async fn test_clarified_values_win_over_the_brief_call() {
    let mut known = UserProfile::new();
    known.set(ProfileField::Location, "Harrogate");
    let llm = MockLLMClient::new()
        .on("research-brief", BRIEF_JSON)
        .on("research-outline", OUTLINE_JSON);

    let (brief, _) = stage(llm).scope(&conversation(), &known).await.unwrap();

    assert_eq!(
        brief.field(ProfileField::Location),
        FieldValue::Stated("Harrogate".to_string())
    );
}

#[tokio::test]
async fn test_fewer_than_four_paths_is_structural() {
    let outline = r#"{"paths": [
        {"title": "Nurse Educator", "rationale": "a"},
        {"title": "nurse educator", "rationale": "b"},
        {"title": "Practice Nurse", "rationale": "c"},
        {"title": " ", "rationale": "d"}
    ]}"#;
    let llm = MockLLMClient::new()
        .on("research-brief", BRIEF_JSON)
        .on("research-outline", outline);

    let result = stage(llm).scope(&conversation(), &UserProfile::new()).await;

    assert!(matches!(result, Err(AppError::Structural(_))));
}

#[tokio::test]
async fn test_brief_failure_is_structural_and_skips_the_outline() {
    let llm = Arc::new(
        MockLLMClient::new()
            .on("research-brief", r#"{"role": "Nurse", "brief": ""}"#)
            .on("research-outline", OUTLINE_JSON),
    );

    let result = ScopingStage::new(llm.clone(), Duration::from_secs(5))
        .scope(&conversation(), &UserProfile::new())
        .await;

    assert!(matches!(result, Err(AppError::Structural(_))));
    assert_eq!(llm.calls("research-outline"), 0);
}
