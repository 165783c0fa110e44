//! Clarification stage: ask for the next missing profile field or declare
//! the conversation ready for scoping.

use crate::llm::json::parse_json_response;
use crate::llm::{with_timeout, LLMClient};
use crate::memory::format_transcript;
use crate::research::prompts;
use crate::types::{
    ConversationState, FieldValue, ProfileField, Result, TurnRole, UserProfile,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Outcome of one clarification evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClarificationDecision {
    pub needs_more_info: bool,
    pub next_question: Option<String>,
    pub ready_acknowledgment: Option<String>,
    /// The field `next_question` asks for, when known.
    pub missing_field: Option<ProfileField>,
    pub profile: UserProfile,
}

impl ClarificationDecision {
    fn ask(field: Option<ProfileField>, question: String, profile: UserProfile) -> Self {
        Self {
            needs_more_info: true,
            next_question: Some(question),
            ready_acknowledgment: None,
            missing_field: field,
            profile,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionResponse {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    experience: Option<String>,
    #[serde(default)]
    skills: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    target_salary: Option<String>,
    #[serde(default)]
    goals: Option<String>,
    #[serde(default)]
    acknowledgment: Option<String>,
}

impl ExtractionResponse {
    fn into_profile(self) -> (UserProfile, Option<String>) {
        let mut profile = UserProfile::new();
        for (field, value) in [
            (ProfileField::Role, self.role),
            (ProfileField::Experience, self.experience),
            (ProfileField::Skills, self.skills),
            (ProfileField::Location, self.location),
            (ProfileField::TargetSalary, self.target_salary),
            (ProfileField::Goals, self.goals),
        ] {
            if let Some(value) = value.filter(|v| FieldValue::is_stated(v)) {
                profile.set(field, value);
            }
        }
        let ack = self.acknowledgment.filter(|a| !a.trim().is_empty());
        (profile, ack)
    }
}

/// Fields answered directly: a user turn that follows our own question for
/// that field counts as stating it.
pub fn answered_fields(conversation: &ConversationState) -> UserProfile {
    let mut profile = UserProfile::new();
    for pair in conversation.turns().windows(2) {
        let (asked, answer) = (&pair[0], &pair[1]);
        if asked.role != TurnRole::Assistant || answer.role != TurnRole::User {
            continue;
        }
        if let Some(field) = ProfileField::ALL
            .into_iter()
            .find(|f| asked.content.trim() == f.question())
        {
            profile.set(field, answer.content.clone());
        }
    }
    profile
}

fn acknowledgment_for(profile: &UserProfile) -> String {
    format!(
        "Thanks, I have everything I need. I'll research four automation-resistant career paths for you as a {}, taking into account your experience, skills, location, salary target and goals.",
        profile.get(ProfileField::Role).unwrap_or("professional")
    )
}

pub struct ClarificationStage {
    llm: Arc<dyn LLMClient>,
    call_timeout: Duration,
}

impl ClarificationStage {
    pub fn new(llm: Arc<dyn LLMClient>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Decides whether the conversation holds all six profile fields.
    ///
    /// Never fails: a model error yields "not ready" and re-asks the last
    /// question (or the first field's question when none was asked yet).
    #[instrument(skip_all, fields(turns = conversation.len()))]
    pub async fn evaluate(&self, conversation: &ConversationState) -> ClarificationDecision {
        let transcript = format_transcript(conversation);
        let prompt = prompts::clarify_prompt(&transcript);

        let extracted = match with_timeout(
            self.call_timeout,
            self.llm.generate_with_system(prompts::CLARIFY_SYSTEM, &prompt),
        )
        .await
        .and_then(|raw| parse_json_response::<ExtractionResponse>(&raw))
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "profile extraction failed, re-asking");
                return Self::reissue(conversation);
            }
        };

        let (mut profile, acknowledgment) = extracted.into_profile();
        profile.merge_missing(&answered_fields(conversation));
        debug!(missing = ?profile.missing(), "profile extracted");

        match profile.first_missing() {
            Some(field) => {
                ClarificationDecision::ask(Some(field), field.question().to_string(), profile)
            }
            None => ClarificationDecision {
                needs_more_info: false,
                next_question: None,
                ready_acknowledgment: Some(
                    acknowledgment.unwrap_or_else(|| acknowledgment_for(&profile)),
                ),
                missing_field: None,
                profile,
            },
        }
    }

    fn reissue(conversation: &ConversationState) -> ClarificationDecision {
        let profile = answered_fields(conversation);
        match conversation.last_assistant_turn() {
            Some(turn) if !turn.content.trim().is_empty() => {
                let field = ProfileField::ALL
                    .into_iter()
                    .find(|f| turn.content.trim() == f.question());
                ClarificationDecision::ask(field, turn.content.clone(), profile)
            }
            _ => {
                let field = profile.first_missing().unwrap_or(ProfileField::Role);
                ClarificationDecision::ask(Some(field), field.question().to_string(), profile)
            }
        }
    }
}
