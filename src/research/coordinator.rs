//! Orchestration controller.
//!
//! [`ResearchCoordinator::advance`] takes the whole conversation each call and
//! either asks the next clarifying question or runs the remaining stages to a
//! terminal outcome:
//!
//! ```text
//! Clarification -> Scoping -> Supervisor -> Compression -> Report Synthesis
//! ```
//!
//! Only malformed input and cancellation come back as `Err`. Every other
//! failure is terminal for the run and is reported as [`RunOutcome::Failed`]
//! with a user-safe message.
//!
//! Each run snapshots the configuration when it starts, so a hot reload only
//! affects runs started afterwards. Model clients and researcher settings are
//! fixed when the coordinator is built.

use crate::db::RunStore;
use crate::llm::{LLMClient, ProviderRegistry};
use crate::research::clarify::ClarificationStage;
use crate::research::compression::Compressor;
use crate::research::faq::FaqAgent;
use crate::research::report::ReportSynthesizer;
use crate::research::researcher::{ResearcherAgent, ResearcherConfig, SubAgent};
use crate::research::scoping::ScopingStage;
use crate::research::supervisor::{Supervisor, SupervisorConfig};
use crate::tools::{Lookup, ToolLookup, ToolRegistry};
use crate::types::{
    AppError, ConversationState, ProfileField, Result, RunOptions, RunOutcome, RunRequest,
    RunState, Turn, TurnRole,
};
use crate::utils::toml_config::{ConfigManager, StagesConfig, WayfinderConfig};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// One model client per model-backed stage.
#[derive(Clone)]
pub struct StageClients {
    pub clarify: Arc<dyn LLMClient>,
    pub scoping: Arc<dyn LLMClient>,
    pub supervisor: Arc<dyn LLMClient>,
    pub researcher: Arc<dyn LLMClient>,
    pub report: Arc<dyn LLMClient>,
    pub faq: Arc<dyn LLMClient>,
}

impl StageClients {
    /// The same client for every stage.
    pub fn uniform(llm: Arc<dyn LLMClient>) -> Self {
        Self {
            clarify: Arc::clone(&llm),
            scoping: Arc::clone(&llm),
            supervisor: Arc::clone(&llm),
            researcher: Arc::clone(&llm),
            report: Arc::clone(&llm),
            faq: llm,
        }
    }

    /// Builds clients from the stage bindings; stages sharing a model share a client.
    pub async fn from_registry(registry: &ProviderRegistry, stages: &StagesConfig) -> Result<Self> {
        let mut built: HashMap<String, Arc<dyn LLMClient>> = HashMap::new();
        for (_, model) in stages.bindings() {
            if !built.contains_key(model) {
                let client = registry.create_shared_client(model).await?;
                built.insert(model.to_string(), client);
            }
        }
        let get = |model: &str| {
            built.get(model).cloned().ok_or_else(|| {
                AppError::Configuration(format!("no client built for model '{}'", model))
            })
        };
        Ok(Self {
            clarify: get(&stages.clarify)?,
            scoping: get(&stages.scoping)?,
            supervisor: get(&stages.supervisor)?,
            researcher: get(&stages.researcher)?,
            report: get(&stages.report)?,
            faq: get(&stages.faq)?,
        })
    }
}

pub struct ResearchCoordinator {
    clients: StageClients,
    sub_agent: Arc<dyn SubAgent>,
    store: Arc<dyn RunStore>,
    settings: Arc<ConfigManager>,
}

impl ResearchCoordinator {
    pub fn new(
        clients: StageClients,
        lookup: Arc<dyn Lookup>,
        store: Arc<dyn RunStore>,
        settings: Arc<ConfigManager>,
    ) -> Self {
        let config = settings.config();
        let sub_agent = Arc::new(ResearcherAgent::new(
            Arc::clone(&clients.researcher),
            lookup,
            ResearcherConfig::from_research(&config.research),
        ));
        Self {
            clients,
            sub_agent,
            store,
            settings,
        }
    }

    /// Wires providers, stage clients and the configured lookup tool.
    pub async fn from_config(settings: Arc<ConfigManager>, store: Arc<dyn RunStore>) -> Result<Self> {
        let config = settings.config();
        let registry = ProviderRegistry::from_config(&config);
        let clients = StageClients::from_registry(&registry, &config.stages).await?;
        let lookup = ToolLookup::new(
            Arc::new(ToolRegistry::with_default_tools()),
            config.research.lookup_tool.clone(),
        )?;
        Ok(Self::new(clients, Arc::new(lookup), store, settings))
    }

    /// Replaces the researcher sub-agent.
    pub fn with_sub_agent(mut self, sub_agent: Arc<dyn SubAgent>) -> Self {
        self.sub_agent = sub_agent;
        self
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Advances a run by one caller interaction.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty))]
    pub async fn advance(&self, request: RunRequest, cancel: CancellationToken) -> Result<RunOutcome> {
        let conversation = validate_conversation(request.conversation)?;
        let run_id = request
            .run_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        tracing::Span::current().record("run_id", run_id.as_str());

        let config = self.settings.config();
        let mut state = RunState::new(run_id.clone(), conversation);
        state.purchasable = request
            .options
            .purchasable
            .unwrap_or(config.report.purchasable);

        match self
            .run_stages(&mut state, &config, &request.options, &cancel)
            .await
        {
            Ok(outcome) => Ok(outcome),
            Err(e @ (AppError::Cancelled(_) | AppError::InvalidInput(_))) => {
                warn!(error = %e, "run stopped");
                Err(e)
            }
            Err(e) => {
                error!(error = %e, "run failed");
                Ok(RunOutcome::Failed {
                    run_id,
                    reason: e.user_message(),
                })
            }
        }
    }

    async fn run_stages(
        &self,
        state: &mut RunState,
        config: &WayfinderConfig,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome> {
        let call_timeout = config.research.call_timeout();

        let clarifier = ClarificationStage::new(Arc::clone(&self.clients.clarify), call_timeout);
        let decision = until_cancelled(cancel, clarifier.evaluate(&state.conversation)).await?;

        if decision.needs_more_info {
            let question = decision
                .next_question
                .unwrap_or_else(|| ProfileField::Role.question().to_string());
            state.conversation.append(Turn::assistant(question.clone()));
            self.store.save_state(state).await?;
            info!(missing = ?decision.missing_field, "awaiting user");
            return Ok(RunOutcome::AwaitingUser {
                run_id: state.run_id.clone(),
                question,
                conversation: state.conversation.clone(),
            });
        }
        if let Some(ack) = decision.ready_acknowledgment {
            state.conversation.append(Turn::assistant(ack));
        }

        let scoping = ScopingStage::new(Arc::clone(&self.clients.scoping), call_timeout);
        let (brief, outline) =
            until_cancelled(cancel, scoping.scope(&state.conversation, &decision.profile)).await??;
        state.brief = Some(brief.clone());
        state.outline = Some(outline.clone());
        self.store.save_state(state).await?;

        let supervisor = Supervisor::new(
            Arc::clone(&self.clients.supervisor),
            Arc::clone(&self.sub_agent),
            SupervisorConfig::from_research(&config.research).with_options(options),
        );
        let research = supervisor.run(&brief, &outline, cancel).await?;

        if research.findings.iter().all(|f| f.degraded) {
            if config.research.abort_on_empty_research {
                return Err(AppError::Structural(
                    "every research task failed".to_string(),
                ));
            }
            warn!("every research task degraded, continuing with empty findings");
        }

        let budget = options
            .compression_token_budget
            .unwrap_or(config.research.compression_token_budget);
        let findings = Compressor::new(budget).compress(&brief, &outline, &research.findings);

        let synthesizer = ReportSynthesizer::new(
            Arc::clone(&self.clients.report),
            call_timeout,
            config.report.preview_summary_ratio,
        );
        let artifacts = until_cancelled(
            cancel,
            synthesizer.synthesize(&brief, &outline, &findings, state.purchasable),
        )
        .await??;

        self.store.save_artifacts(&state.run_id, &artifacts).await?;
        self.store.save_state(state).await?;

        info!(
            coverage = research.coverage,
            sources = findings.sources.len(),
            "run completed"
        );
        Ok(RunOutcome::Completed {
            run_id: state.run_id.clone(),
            path_titles: outline.titles().iter().map(|t| t.to_string()).collect(),
            artifacts,
        })
    }

    /// Answers a follow-up question about a completed run.
    #[instrument(skip(self, question))]
    pub async fn answer_question(&self, run_id: &str, question: &str) -> Result<String> {
        let state = self
            .store
            .load_state(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("run '{}' not found", run_id)))?;
        let artifacts = self
            .store
            .load_artifacts(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("run '{}' has no report yet", run_id)))?;
        let brief = state
            .brief
            .ok_or_else(|| AppError::NotFound(format!("run '{}' has no research brief", run_id)))?;

        let agent = FaqAgent::new(
            Arc::clone(&self.clients.faq),
            self.settings.config().research.call_timeout(),
        );
        Ok(agent
            .answer(question, &brief, &artifacts, state.purchasable)
            .await)
    }
}

/// Rejects input no stage can work with.
fn validate_conversation(turns: Vec<Turn>) -> Result<ConversationState> {
    if turns.is_empty() {
        return Err(AppError::InvalidInput("conversation is empty".to_string()));
    }
    let conversation = ConversationState::from_turns(turns);
    if !conversation.has_user_content() {
        return Err(AppError::InvalidInput(
            "conversation has no user message".to_string(),
        ));
    }
    if conversation.last().map(|t| t.role) != Some(TurnRole::User) {
        return Err(AppError::InvalidInput(
            "the last turn must come from the user".to_string(),
        ));
    }
    Ok(conversation)
}

async fn until_cancelled<F: Future>(cancel: &CancellationToken, work: F) -> Result<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(AppError::Cancelled("run cancelled".to_string())),
        output = work => Ok(output),
    }
}
