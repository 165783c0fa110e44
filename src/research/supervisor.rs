//! Supervisor: budget-gated rounds of parallel researcher sub-agents.
//!
//! The loop is an explicit state machine. Every phase change goes through
//! [`transition`], and a pair it does not know is an internal error rather
//! than a silent fallthrough:
//!
//! ```text
//! Planning -> Delegating -> AwaitingBatch -> Reflecting -> Delegating | Complete
//!                 ^               |
//!                 +-- more tasks -+
//! ```
//!
//! After a full round the gate stops on coverage, an empty call budget, or a
//! single reflection left: that last reflection could not lead to more
//! delegation, so it is not spent.
//!
//! The [`BudgetTracker`] lives on this task's stack and is only charged when a
//! reflection or a batch is issued, never as sub-agent results arrive.

use crate::llm::json::parse_json_response;
use crate::llm::{with_timeout, LLMClient};
use crate::research::budget::BudgetTracker;
use crate::research::prompts;
use crate::research::researcher::SubAgent;
use crate::types::{
    AppError, Dimension, FindingsDocument, ResearchBrief, ResearchOutline, ResearchTask, Result,
    RunOptions,
};
use crate::utils::toml_config::{ResearchConfig, MAX_REFLECTIONS};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_parallel_workers: usize,
    pub total_calls_budget: usize,
    pub max_reflections: usize,
    pub coverage_threshold: f32,
    pub degraded_coverage_weight: f32,
    pub call_timeout: Duration,
    pub stage_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from_research(&ResearchConfig::default())
    }
}

impl SupervisorConfig {
    pub fn from_research(config: &ResearchConfig) -> Self {
        Self {
            max_parallel_workers: config.max_parallel_workers.max(1),
            total_calls_budget: config.total_calls_budget,
            max_reflections: config.max_reflections.min(MAX_REFLECTIONS),
            coverage_threshold: config.coverage_threshold,
            degraded_coverage_weight: config.degraded_coverage_weight,
            call_timeout: config.call_timeout(),
            stage_timeout: config.stage_timeout(),
        }
    }

    /// Applies per-run overrides from the caller.
    pub fn with_options(mut self, options: &RunOptions) -> Self {
        if let Some(workers) = options.max_parallel_workers {
            self.max_parallel_workers = workers.max(1);
        }
        if let Some(budget) = options.total_calls_budget {
            self.total_calls_budget = budget;
        }
        self
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    CoverageReached,
    CallBudgetExhausted,
    ReflectionBudgetExhausted,
    NothingToDelegate,
    StageTimeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorPhase {
    Planning,
    Delegating,
    AwaitingBatch,
    Reflecting,
    Complete(CompletionReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    Planned,
    BatchDispatched,
    BatchCollected { more: bool },
    Replanned,
    Halt(CompletionReason),
}

/// The only legal phase changes. `None` marks an impossible pair.
pub fn transition(phase: SupervisorPhase, event: SupervisorEvent) -> Option<SupervisorPhase> {
    use SupervisorEvent as E;
    use SupervisorPhase as P;

    match (phase, event) {
        (P::Planning, E::Planned) => Some(P::Delegating),
        (P::Delegating, E::BatchDispatched) => Some(P::AwaitingBatch),
        (P::AwaitingBatch, E::BatchCollected { more: true }) => Some(P::Delegating),
        (P::AwaitingBatch, E::BatchCollected { more: false }) => Some(P::Reflecting),
        (P::Reflecting, E::Replanned) => Some(P::Delegating),
        (P::Complete(_), _) => None,
        (_, E::Halt(reason)) => Some(P::Complete(reason)),
        _ => None,
    }
}

/// What the supervisor does next.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorAction {
    Reflect,
    Delegate(Vec<ResearchTask>),
    Complete(CompletionReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReflectionDecision {
    #[default]
    Continue,
    GapFill,
    Complete,
}

impl ReflectionDecision {
    pub fn parse(text: &str) -> Option<Self> {
        let normalized: String = text
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();
        match normalized.as_str() {
            "continue" => Some(Self::Continue),
            "gapfill" => Some(Self::GapFill),
            "complete" | "done" | "stop" => Some(Self::Complete),
            _ => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReflectionResponse {
    #[serde(default)]
    assessment: String,
    #[serde(default)]
    decision: String,
    #[serde(default)]
    priority: Vec<usize>,
    #[serde(default)]
    focus: Vec<String>,
}

/// A parsed reflection; the default is "continue in outline order".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReflectionPlan {
    pub decision: ReflectionDecision,
    pub priority: Vec<usize>,
    pub focus: Vec<String>,
}

/// Per-cell coverage value: 1.0 for a non-degraded finding that covers the
/// dimension, `degraded_weight` for a degraded one assigned to it.
fn cell_value(
    findings: &[FindingsDocument],
    path_index: usize,
    dimension: Dimension,
    degraded_weight: f32,
) -> f32 {
    findings
        .iter()
        .filter(|f| f.path_index == Some(path_index))
        .map(|f| {
            if !f.degraded && f.covered.contains(&dimension) {
                1.0
            } else if f.degraded && f.assigned.contains(&dimension) {
                degraded_weight
            } else {
                0.0
            }
        })
        .fold(0.0, f32::max)
}

/// Fraction of the outline's (path, dimension) cells covered by the findings.
pub fn coverage(outline: &ResearchOutline, findings: &[FindingsDocument], degraded_weight: f32) -> f32 {
    let cells = outline.cell_count();
    if cells == 0 {
        return 0.0;
    }
    let covered: f32 = outline
        .paths
        .iter()
        .flat_map(|p| p.dimensions.iter().map(move |d| (p.index, *d)))
        .map(|(index, dimension)| cell_value(findings, index, dimension, degraded_weight))
        .sum();
    covered / cells as f32
}

/// Dimensions of each path that no non-degraded finding covers yet.
pub fn uncovered_cells(
    outline: &ResearchOutline,
    findings: &[FindingsDocument],
) -> Vec<(usize, Vec<Dimension>)> {
    outline
        .paths
        .iter()
        .map(|p| {
            let missing = p
                .dimensions
                .iter()
                .copied()
                .filter(|d| cell_value(findings, p.index, *d, 0.0) < 1.0)
                .collect();
            (p.index, missing)
        })
        .filter(|(_, missing): &(usize, Vec<Dimension>)| !missing.is_empty())
        .collect()
}

fn coverage_summary(outline: &ResearchOutline, findings: &[FindingsDocument]) -> String {
    let gaps: HashMap<usize, Vec<Dimension>> = uncovered_cells(outline, findings).into_iter().collect();
    outline
        .paths
        .iter()
        .map(|p| match gaps.get(&p.index) {
            Some(missing) => format!(
                "{}. {}: {}/{} dimensions covered; missing {}",
                p.index,
                p.title,
                p.dimensions.len() - missing.len(),
                p.dimensions.len(),
                missing.iter().map(|d| d.key()).collect::<Vec<_>>().join(", ")
            ),
            None => format!("{}. {}: fully covered", p.index, p.title),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary of one supervisor loop.
#[derive(Debug, Clone)]
pub struct SupervisorReport {
    /// Every collected finding, in task id order.
    pub findings: Vec<FindingsDocument>,
    pub rounds: usize,
    pub reflections_used: usize,
    pub calls_used: usize,
    pub coverage: f32,
    pub completion: CompletionReason,
}

pub struct Supervisor {
    llm: Arc<dyn LLMClient>,
    sub_agent: Arc<dyn SubAgent>,
    config: SupervisorConfig,
}

impl Supervisor {
    pub fn new(llm: Arc<dyn LLMClient>, sub_agent: Arc<dyn SubAgent>, config: SupervisorConfig) -> Self {
        Self {
            llm,
            sub_agent,
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    fn step(phase: SupervisorPhase, event: SupervisorEvent) -> Result<SupervisorPhase> {
        transition(phase, event).ok_or_else(|| {
            AppError::Internal(format!("illegal supervisor transition {:?} on {:?}", phase, event))
        })
    }

    /// Runs rounds until the completion gate fires.
    ///
    /// Only cancellation and an illegal transition produce an error; failed or
    /// slow sub-agents become degraded findings.
    #[instrument(skip_all, fields(paths = outline.paths.len()))]
    pub async fn run(
        &self,
        brief: &ResearchBrief,
        outline: &ResearchOutline,
        cancel: &CancellationToken,
    ) -> Result<SupervisorReport> {
        let deadline = Instant::now() + self.config.stage_timeout;
        let mut budget = BudgetTracker::new(
            self.config.total_calls_budget,
            self.config.max_parallel_workers,
        )
        .with_reflections(self.config.max_reflections);

        let mut phase = SupervisorPhase::Planning;
        let mut findings: Vec<FindingsDocument> = Vec::new();
        let mut pending: VecDeque<ResearchTask> = VecDeque::new();
        let mut batch: Vec<ResearchTask> = Vec::new();
        let mut next_task_id = 1;
        let mut rounds = 0;

        let completion = loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled("run cancelled during research".to_string()));
            }

            let action = match phase {
                SupervisorPhase::Complete(reason) => break reason,
                SupervisorPhase::Planning => SupervisorAction::Reflect,
                SupervisorPhase::Reflecting => {
                    self.gate(outline, &findings, &budget)
                        .map(SupervisorAction::Complete)
                        .unwrap_or(SupervisorAction::Reflect)
                }
                SupervisorPhase::Delegating => {
                    if Instant::now() >= deadline {
                        SupervisorAction::Complete(CompletionReason::StageTimeout)
                    } else {
                        let granted = budget.grant_delegations(pending.len());
                        if granted == 0 {
                            SupervisorAction::Complete(CompletionReason::CallBudgetExhausted)
                        } else {
                            SupervisorAction::Delegate(pending.drain(..granted).collect())
                        }
                    }
                }
                SupervisorPhase::AwaitingBatch => {
                    let dispatched = std::mem::take(&mut batch);
                    let (docs, timed_out) = self.collect_batch(dispatched, deadline, cancel).await?;
                    findings.extend(docs);
                    phase = if timed_out {
                        warn!("research stage deadline reached");
                        Self::step(phase, SupervisorEvent::Halt(CompletionReason::StageTimeout))?
                    } else if pending.is_empty() {
                        rounds += 1;
                        Self::step(phase, SupervisorEvent::BatchCollected { more: false })?
                    } else {
                        Self::step(phase, SupervisorEvent::BatchCollected { more: true })?
                    };
                    continue;
                }
            };

            phase = match action {
                SupervisorAction::Complete(reason) => {
                    Self::step(phase, SupervisorEvent::Halt(reason))?
                }
                SupervisorAction::Delegate(tasks) => {
                    debug!(batch = tasks.len(), calls_remaining = budget.total_calls_remaining(), "dispatching batch");
                    batch = tasks;
                    Self::step(phase, SupervisorEvent::BatchDispatched)?
                }
                SupervisorAction::Reflect => {
                    let planning = phase == SupervisorPhase::Planning;
                    let plan = self
                        .reflect(&mut budget, brief, outline, &findings)
                        .await
                        .unwrap_or_default();

                    let tasks = self.plan_tasks(brief, outline, &findings, &plan, &mut next_task_id, planning);
                    if tasks.is_empty() {
                        Self::step(phase, SupervisorEvent::Halt(CompletionReason::NothingToDelegate))?
                    } else {
                        pending.extend(tasks);
                        let event = if planning {
                            SupervisorEvent::Planned
                        } else {
                            SupervisorEvent::Replanned
                        };
                        Self::step(phase, event)?
                    }
                }
            };
        };

        let report = SupervisorReport {
            coverage: coverage(outline, &findings, self.config.degraded_coverage_weight),
            findings,
            rounds,
            reflections_used: budget.reflections_used(),
            calls_used: budget.calls_used(),
            completion,
        };
        info!(
            rounds = report.rounds,
            reflections = report.reflections_used,
            calls = report.calls_used,
            coverage = report.coverage,
            completion = ?report.completion,
            "supervisor complete"
        );
        Ok(report)
    }

    /// Completion gate checked after every full round.
    fn gate(
        &self,
        outline: &ResearchOutline,
        findings: &[FindingsDocument],
        budget: &BudgetTracker,
    ) -> Option<CompletionReason> {
        let covered = coverage(outline, findings, self.config.degraded_coverage_weight);
        if covered >= self.config.coverage_threshold {
            Some(CompletionReason::CoverageReached)
        } else if budget.is_exhausted() {
            Some(CompletionReason::CallBudgetExhausted)
        } else if budget.reflections_remaining() <= 1 {
            // The final reflection could only confirm the stop, so it is never issued.
            Some(CompletionReason::ReflectionBudgetExhausted)
        } else {
            None
        }
    }

    /// One budget-charged reflection. `None` when no budget is left; a failed
    /// call still costs its unit and falls back to the default plan.
    async fn reflect(
        &self,
        budget: &mut BudgetTracker,
        brief: &ResearchBrief,
        outline: &ResearchOutline,
        findings: &[FindingsDocument],
    ) -> Option<ReflectionPlan> {
        if let Err(exhausted) = budget.try_reflect() {
            debug!(%exhausted, "skipping reflection");
            return None;
        }

        let prompt = prompts::supervisor_prompt(
            brief,
            outline,
            &coverage_summary(outline, findings),
            budget.reflections_remaining(),
            budget.total_calls_remaining(),
        );
        let parsed = with_timeout(
            self.config.call_timeout,
            self.llm.generate_with_system(prompts::SUPERVISOR_SYSTEM, &prompt),
        )
        .await
        .and_then(|raw| parse_json_response::<ReflectionResponse>(&raw));

        match parsed {
            Ok(response) => {
                let decision = ReflectionDecision::parse(&response.decision).unwrap_or_default();
                debug!(?decision, assessment = %response.assessment, "supervisor reflected");
                Some(ReflectionPlan {
                    decision,
                    priority: response.priority,
                    focus: response
                        .focus
                        .into_iter()
                        .map(|f| f.trim().to_string())
                        .filter(|f| !f.is_empty())
                        .collect(),
                })
            }
            Err(e) => {
                warn!(error = %e, "supervisor reflection failed, using outline order");
                Some(ReflectionPlan::default())
            }
        }
    }

    /// One task per path that still has uncovered cells, priority paths first.
    ///
    /// A model `complete` is only reached here while the gate is unmet, so it
    /// is treated as a gap fill.
    fn plan_tasks(
        &self,
        brief: &ResearchBrief,
        outline: &ResearchOutline,
        findings: &[FindingsDocument],
        plan: &ReflectionPlan,
        next_task_id: &mut usize,
        planning: bool,
    ) -> Vec<ResearchTask> {
        let decision = match plan.decision {
            ReflectionDecision::Complete => ReflectionDecision::GapFill,
            other => other,
        };

        let mut gaps = uncovered_cells(outline, findings);
        gaps.sort_by_key(|(index, _)| {
            plan.priority
                .iter()
                .position(|p| p == index)
                .unwrap_or(usize::MAX)
        });

        let context = brief.render();
        gaps.into_iter()
            .filter_map(|(index, missing)| {
                let path = outline.path(index)?;
                let mut focus = plan.focus.clone();
                if !planning && decision == ReflectionDecision::GapFill {
                    focus.push(format!(
                        "Earlier research left these dimensions uncovered: {}",
                        missing.iter().map(|d| d.title()).collect::<Vec<_>>().join(", ")
                    ));
                }
                let id = *next_task_id;
                *next_task_id += 1;
                Some(ResearchTask {
                    id,
                    topic: format!(
                        "{}: {}",
                        path.title,
                        missing.iter().map(|d| d.title()).collect::<Vec<_>>().join(", ")
                    ),
                    path_index: Some(index),
                    path_title: path.title.clone(),
                    dimensions: missing,
                    context: context.clone(),
                    focus,
                })
            })
            .collect()
    }

    /// Spawns the whole batch, then waits for every task or the stage deadline.
    ///
    /// Results come back in task id order; any task that panicked or was still
    /// running at the deadline is replaced by a degraded placeholder.
    async fn collect_batch(
        &self,
        batch: Vec<ResearchTask>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(Vec<FindingsDocument>, bool)> {
        let mut set = JoinSet::new();
        for task in batch.iter().cloned() {
            let agent = Arc::clone(&self.sub_agent);
            set.spawn(async move { agent.research(task).await });
        }

        let mut collected: HashMap<usize, FindingsDocument> = HashMap::new();
        let mut timed_out = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    set.abort_all();
                    return Err(AppError::Cancelled("run cancelled during research".to_string()));
                }
                next = tokio::time::timeout_at(deadline, set.join_next()) => match next {
                    Ok(Some(Ok(doc))) => {
                        collected.insert(doc.task_id, doc);
                    }
                    Ok(Some(Err(e))) => warn!(error = %e, "sub-agent task failed to complete"),
                    Ok(None) => break,
                    Err(_) => {
                        set.abort_all();
                        timed_out = true;
                        break;
                    }
                }
            }
        }

        let docs = batch
            .iter()
            .map(|task| {
                collected.remove(&task.id).unwrap_or_else(|| {
                    warn!(task_id = task.id, "no findings returned, using degraded placeholder");
                    FindingsDocument::degraded(task)
                })
            })
            .collect();
        Ok((docs, timed_out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ResearchPath, UserProfile};
    use async_trait::async_trait;

    struct FixedLLM(String);

    #[async_trait]
    impl LLMClient for FixedLLM {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
        async fn generate_with_system(&self, _system: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.clone())
        }
        async fn generate_with_history(&self, _messages: &[(String, String)]) -> Result<String> {
            Ok(self.0.clone())
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Covers every assigned dimension.
    struct ThoroughAgent;

    #[async_trait]
    impl SubAgent for ThoroughAgent {
        async fn research(&self, task: ResearchTask) -> FindingsDocument {
            FindingsDocument {
                task_id: task.id,
                topic: task.topic.clone(),
                path_index: task.path_index,
                assigned: task.dimensions.clone(),
                covered: task.dimensions.clone(),
                body: "### Salary\nPays well.".to_string(),
                sources: Vec::new(),
                lookups: 1,
                degraded: false,
            }
        }
    }

    fn outline() -> ResearchOutline {
        ResearchOutline {
            paths: (1..=4)
                .map(|i| ResearchPath {
                    index: i,
                    title: format!("Path {}", i),
                    rationale: String::new(),
                    dimensions: Dimension::ALL.to_vec(),
                })
                .collect(),
        }
    }

    fn supervisor(workers: usize, budget: usize) -> Supervisor {
        let config = SupervisorConfig {
            max_parallel_workers: workers,
            total_calls_budget: budget,
            ..SupervisorConfig::default()
        };
        Supervisor::new(
            Arc::new(FixedLLM("{\"decision\": \"continue\"}".to_string())),
            Arc::new(ThoroughAgent),
            config,
        )
    }

    #[test]
    fn test_transition_table() {
        use SupervisorEvent as E;
        use SupervisorPhase as P;

        assert_eq!(transition(P::Planning, E::Planned), Some(P::Delegating));
        assert_eq!(
            transition(P::AwaitingBatch, E::BatchCollected { more: false }),
            Some(P::Reflecting)
        );
        assert_eq!(
            transition(P::Reflecting, E::Halt(CompletionReason::CoverageReached)),
            Some(P::Complete(CompletionReason::CoverageReached))
        );
        assert_eq!(transition(P::Planning, E::BatchDispatched), None);
        assert_eq!(
            transition(P::Complete(CompletionReason::StageTimeout), E::Planned),
            None
        );
    }

    #[test]
    fn test_decision_parse() {
        assert_eq!(ReflectionDecision::parse("gap_fill"), Some(ReflectionDecision::GapFill));
        assert_eq!(ReflectionDecision::parse("Gap Fill"), Some(ReflectionDecision::GapFill));
        assert_eq!(ReflectionDecision::parse("COMPLETE"), Some(ReflectionDecision::Complete));
        assert_eq!(ReflectionDecision::parse("maybe"), None);
    }

    #[test]
    fn test_coverage_weights_degraded_findings() {
        let outline = outline();
        let task = ResearchTask {
            id: 1,
            topic: "t".to_string(),
            path_index: Some(1),
            path_title: "Path 1".to_string(),
            dimensions: Dimension::ALL.to_vec(),
            context: String::new(),
            focus: Vec::new(),
        };
        let degraded = FindingsDocument::degraded(&task);
        assert_eq!(coverage(&outline, std::slice::from_ref(&degraded), 0.0), 0.0);
        assert_eq!(coverage(&outline, std::slice::from_ref(&degraded), 0.5), 0.125);

        let mut good = FindingsDocument::degraded(&task);
        good.degraded = false;
        good.covered = vec![Dimension::Salary, Dimension::Employers];
        assert_eq!(coverage(&outline, &[good.clone()], 0.0), 2.0 / 32.0);

        let gaps = uncovered_cells(&outline, &[good]);
        assert_eq!(gaps.len(), 4);
        assert_eq!(gaps[0].1.len(), 6);
    }

    #[tokio::test]
    async fn test_single_round_when_workers_cover_outline() {
        let brief = ResearchBrief::new(UserProfile::new(), "brief");
        let report = supervisor(4, 12)
            .run(&brief, &outline(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.completion, CompletionReason::CoverageReached);
        assert_eq!(report.rounds, 1);
        assert_eq!(report.reflections_used, 1);
        assert_eq!(report.calls_used, 5);
        assert_eq!(report.coverage, 1.0);
        assert_eq!(
            report.findings.iter().map(|f| f.task_id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4]
        );
    }

    #[tokio::test]
    async fn test_call_budget_stops_between_batches() {
        let brief = ResearchBrief::new(UserProfile::new(), "brief");
        let report = supervisor(2, 3)
            .run(&brief, &outline(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.completion, CompletionReason::CallBudgetExhausted);
        assert_eq!(report.calls_used, 3);
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.coverage, 0.5);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_error() {
        let brief = ResearchBrief::new(UserProfile::new(), "brief");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = supervisor(4, 12).run(&brief, &outline(), &cancel).await;
        assert!(matches!(result, Err(AppError::Cancelled(_))));
    }
}
