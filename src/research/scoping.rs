//! Scoping stage: conversation in, research brief and four-path outline out.
//!
//! Both outputs are required downstream, so any failure here is structural
//! and ends the run.

use crate::llm::json::parse_json_response;
use crate::llm::{with_timeout, LLMClient};
use crate::memory::format_transcript;
use crate::research::prompts;
use crate::types::{
    AppError, ConversationState, Dimension, FieldValue, ProfileField, ResearchBrief,
    ResearchOutline, ResearchPath, Result, UserProfile,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
struct BriefResponse {
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
    brief: String,
}

#[derive(Debug, Deserialize)]
struct OutlineResponse {
    #[serde(default)]
    paths: Vec<PathProposal>,
}

#[derive(Debug, Deserialize)]
struct PathProposal {
    #[serde(default)]
    title: String,
    #[serde(default)]
    rationale: String,
}

pub struct ScopingStage {
    llm: Arc<dyn LLMClient>,
    call_timeout: Duration,
}

impl ScopingStage {
    pub fn new(llm: Arc<dyn LLMClient>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Builds the brief and outline.
    ///
    /// `known` holds fields clarification already established; the brief only
    /// ever carries values the user stated, everything else is unconstrained.
    #[instrument(skip_all)]
    pub async fn scope(
        &self,
        conversation: &ConversationState,
        known: &UserProfile,
    ) -> Result<(ResearchBrief, ResearchOutline)> {
        let brief = self.generate_brief(conversation, known).await?;
        let outline = self.generate_outline(&brief).await?;
        info!(
            role = %brief.headline(),
            paths = ?outline.titles(),
            "research scoped"
        );
        Ok((brief, outline))
    }

    async fn generate_brief(
        &self,
        conversation: &ConversationState,
        known: &UserProfile,
    ) -> Result<ResearchBrief> {
        let date = chrono::Utc::now().format("%B %-d, %Y").to_string();
        let prompt = prompts::brief_prompt(&format_transcript(conversation), &date);

        let response: BriefResponse = with_timeout(
            self.call_timeout,
            self.llm.generate_with_system(prompts::BRIEF_SYSTEM, &prompt),
        )
        .await
        .and_then(|raw| parse_json_response(&raw))
        .map_err(|e| AppError::Structural(format!("research brief generation failed: {}", e)))?;

        let narrative = response.brief.trim().to_string();
        if narrative.is_empty() {
            return Err(AppError::Structural(
                "research brief generation returned an empty brief".to_string(),
            ));
        }

        let mut profile = UserProfile::new();
        for (field, value) in [
            (ProfileField::Role, response.role),
            (ProfileField::Experience, response.experience),
            (ProfileField::Skills, response.skills),
            (ProfileField::Location, response.location),
            (ProfileField::TargetSalary, response.target_salary),
            (ProfileField::Goals, response.goals),
        ] {
            // Clarification's extraction wins; the brief call may only fill gaps.
            match known.get(field) {
                Some(stated) => profile.set(field, stated),
                None => {
                    if let Some(value) = value.filter(|v| FieldValue::is_stated(v)) {
                        profile.set(field, value);
                    }
                }
            }
        }

        Ok(ResearchBrief::new(profile, narrative))
    }

    async fn generate_outline(&self, brief: &ResearchBrief) -> Result<ResearchOutline> {
        let response: OutlineResponse = with_timeout(
            self.call_timeout,
            self.llm
                .generate_with_system(prompts::OUTLINE_SYSTEM, &prompts::outline_prompt(brief)),
        )
        .await
        .and_then(|raw| parse_json_response(&raw))
        .map_err(|e| AppError::Structural(format!("research outline generation failed: {}", e)))?;

        build_outline(response.paths)
    }
}

/// Keeps the first four distinct titled paths, each with all eight dimensions.
fn build_outline(proposals: Vec<PathProposal>) -> Result<ResearchOutline> {
    let mut seen = HashSet::new();
    let paths: Vec<ResearchPath> = proposals
        .into_iter()
        .filter_map(|p| {
            let title = p.title.trim().to_string();
            let key = title.to_lowercase();
            (!title.is_empty() && seen.insert(key)).then(|| (title, p.rationale.trim().to_string()))
        })
        .take(ResearchOutline::PATH_COUNT)
        .enumerate()
        .map(|(i, (title, rationale))| ResearchPath {
            index: i + 1,
            title,
            rationale,
            dimensions: Dimension::ALL.to_vec(),
        })
        .collect();

    if paths.len() < ResearchOutline::PATH_COUNT {
        return Err(AppError::Structural(format!(
            "research outline named {} distinct paths, {} required",
            paths.len(),
            ResearchOutline::PATH_COUNT
        )));
    }

    Ok(ResearchOutline { paths })
}
