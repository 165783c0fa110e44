//! Follow-up questions about a finished report.

use crate::llm::{with_timeout, LLMClient};
use crate::research::prompts;
use crate::types::{ReportArtifacts, ResearchBrief};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

pub const FAQ_OPENING: &str =
    "Do you have any questions about your career path report? How can I assist you?";

pub const FAQ_FOLLOW_UP: &str =
    "Do you have any other questions about your career path report? How can I assist you?";

pub const FAQ_APOLOGY: &str = "I apologize, but I encountered an error processing your question. Could you please rephrase it?";

pub struct FaqAgent {
    llm: Arc<dyn LLMClient>,
    call_timeout: Duration,
}

impl FaqAgent {
    pub fn new(llm: Arc<dyn LLMClient>, call_timeout: Duration) -> Self {
        Self { llm, call_timeout }
    }

    /// Answers from the report the user holds. Never fails.
    ///
    /// With `gated` set only the preview is visible to the model.
    #[instrument(skip_all, fields(gated = gated))]
    pub async fn answer(
        &self,
        question: &str,
        brief: &ResearchBrief,
        artifacts: &ReportArtifacts,
        gated: bool,
    ) -> String {
        if question.trim().is_empty() {
            return FAQ_OPENING.to_string();
        }

        let report = if gated {
            &artifacts.preview
        } else {
            &artifacts.full
        };
        let prompt = prompts::faq_prompt(question, brief, report, gated);

        match with_timeout(
            self.call_timeout,
            self.llm.generate_with_system(prompts::FAQ_SYSTEM, &prompt),
        )
        .await
        {
            Ok(answer) if !answer.trim().is_empty() => {
                format!("{}\n{}", answer.trim(), FAQ_FOLLOW_UP)
            }
            Ok(_) => {
                warn!("empty FAQ answer");
                FAQ_APOLOGY.to_string()
            }
            Err(e) => {
                warn!(error = %e, "FAQ answer failed");
                FAQ_APOLOGY.to_string()
            }
        }
    }
}
