//! Researcher sub-agent: one bounded lookup/reflect loop for one task.
//!
//! Lookups and reflections strictly alternate; nothing inside a sub-agent runs
//! concurrently. The loop stops after the first lookup that satisfies any of:
//!
//! 1. the lookup limit is reached
//! 2. enough distinct sources were collected
//! 3. the last two lookups overlap materially
//! 4. self-assessed coverage of the assigned dimensions meets the threshold
//!
//! A failed write-up call produces a degraded [`FindingsDocument`] instead of
//! an error, so one sub-agent can never fail its supervisor's round.

use crate::llm::json::parse_json_response;
use crate::llm::{with_timeout, LLMClient};
use crate::research::citations::{is_sources_heading, normalize_locator, remap_citations};
use crate::research::prompts;
use crate::tools::{Lookup, LookupHit};
use crate::types::{Dimension, FindingsDocument, ResearchTask, Result, SourceRef};
use crate::utils::toml_config::{ResearchConfig, MAX_RESEARCHER_LOOKUPS};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Executes one [`ResearchTask`]. Implementations must not fail.
#[async_trait]
pub trait SubAgent: Send + Sync {
    async fn research(&self, task: ResearchTask) -> FindingsDocument;
}

#[derive(Debug, Clone)]
pub struct ResearcherConfig {
    pub max_lookups: usize,
    pub min_sources: usize,
    pub coverage_threshold: f32,
    pub overlap_threshold: f32,
    pub results_per_lookup: usize,
    pub call_timeout: Duration,
}

impl Default for ResearcherConfig {
    fn default() -> Self {
        Self::from_research(&ResearchConfig::default())
    }
}

impl ResearcherConfig {
    pub fn from_research(config: &ResearchConfig) -> Self {
        Self {
            max_lookups: config.researcher_max_lookups.clamp(1, MAX_RESEARCHER_LOOKUPS),
            min_sources: config.researcher_min_sources.max(1),
            coverage_threshold: config.researcher_coverage_threshold,
            overlap_threshold: config.overlap_threshold,
            results_per_lookup: config.results_per_lookup.max(1),
            call_timeout: config.call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    LookupLimit,
    EnoughSources,
    Overlap,
    Coverage,
}

/// First satisfied stop condition, if any.
pub fn stop_reason(
    config: &ResearcherConfig,
    lookups: usize,
    sources: usize,
    overlapping: bool,
    coverage: f32,
) -> Option<StopReason> {
    if lookups >= config.max_lookups {
        Some(StopReason::LookupLimit)
    } else if sources >= config.min_sources {
        Some(StopReason::EnoughSources)
    } else if overlapping {
        Some(StopReason::Overlap)
    } else if coverage >= config.coverage_threshold {
        Some(StopReason::Coverage)
    } else {
        None
    }
}

/// Jaccard similarity; two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count() as f32;
    let union = a.union(b).count() as f32;
    intersection / union
}

/// Identity of a lookup's results: locators, or title words when any locator is missing.
pub fn lookup_signature(hits: &[LookupHit]) -> HashSet<String> {
    if hits.iter().all(|h| !h.locator.trim().is_empty()) {
        hits.iter().map(|h| normalize_locator(&h.locator)).collect()
    } else {
        hits.iter()
            .flat_map(|h| {
                h.title
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|w| w.len() > 2)
                    .map(str::to_lowercase)
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReflectionResponse {
    #[serde(default)]
    covered: Vec<String>,
    #[serde(default)]
    next_query: Option<String>,
    #[serde(default)]
    note: String,
}

/// Parsed reflection, reduced to the task's assigned dimensions.
#[derive(Debug, Clone, Default)]
struct Reflection {
    covered: BTreeSet<Dimension>,
    next_query: Option<String>,
    note: String,
}

pub struct ResearcherAgent {
    llm: Arc<dyn LLMClient>,
    lookup: Arc<dyn Lookup>,
    config: ResearcherConfig,
}

impl ResearcherAgent {
    pub fn new(llm: Arc<dyn LLMClient>, lookup: Arc<dyn Lookup>, config: ResearcherConfig) -> Self {
        Self {
            llm,
            lookup,
            config,
        }
    }

    async fn run_lookup(&self, query: &str) -> Vec<LookupHit> {
        match tokio::time::timeout(
            self.config.call_timeout,
            self.lookup.lookup(query, self.config.results_per_lookup),
        )
        .await
        {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(query, error = %e, "lookup failed, treating as empty");
                Vec::new()
            }
            Err(_) => {
                warn!(query, "lookup timed out, treating as empty");
                Vec::new()
            }
        }
    }

    async fn reflect(&self, task: &ResearchTask, hits: &[LookupHit], notes: &[String]) -> Reflection {
        let prompt = prompts::researcher_reflect_prompt(task, hits, notes);
        let parsed = with_timeout(
            self.config.call_timeout,
            self.llm
                .generate_with_system(prompts::RESEARCHER_REFLECT_SYSTEM, &prompt),
        )
        .await
        .and_then(|raw| parse_json_response::<ReflectionResponse>(&raw));

        match parsed {
            Ok(response) => Reflection {
                covered: response
                    .covered
                    .iter()
                    .filter_map(|d| Dimension::parse(d))
                    .filter(|d| task.dimensions.contains(d))
                    .collect(),
                next_query: response
                    .next_query
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty()),
                note: response.note.trim().to_string(),
            },
            Err(e) => {
                warn!(task_id = task.id, error = %e, "reflection failed, assuming no coverage");
                Reflection::default()
            }
        }
    }

    fn fallback_query(task: &ResearchTask, covered: &BTreeSet<Dimension>, attempt: usize) -> String {
        let uncovered: Vec<&Dimension> = task
            .dimensions
            .iter()
            .filter(|d| !covered.contains(d))
            .collect();
        let dimension = if uncovered.is_empty() {
            task.dimensions.get(attempt % task.dimensions.len().max(1))
        } else {
            uncovered.get(attempt % uncovered.len()).copied()
        };
        match dimension {
            Some(d) => format!("{} career {}", task.path_title, d.title().to_lowercase()),
            None => format!("{} career", task.path_title),
        }
    }

    /// The full loop; errors here mean the write-up itself failed.
    async fn run(&self, task: &ResearchTask) -> Result<FindingsDocument> {
        let mut sources: Vec<LookupHit> = Vec::new();
        let mut seen_locators: HashSet<String> = HashSet::new();
        let mut notes: Vec<String> = Vec::new();
        let mut covered: BTreeSet<Dimension> = BTreeSet::new();
        let mut previous: Option<HashSet<String>> = None;
        let mut query = Self::fallback_query(task, &covered, 0);
        let mut lookups = 0;

        loop {
            let hits = self.run_lookup(&query).await;
            lookups += 1;

            let signature = lookup_signature(&hits);
            let overlapping = previous
                .as_ref()
                .is_some_and(|prev| jaccard(prev, &signature) >= self.config.overlap_threshold);

            for hit in hits.into_iter().take(self.config.results_per_lookup) {
                let key = if hit.locator.trim().is_empty() {
                    hit.title.to_lowercase()
                } else {
                    normalize_locator(&hit.locator)
                };
                if seen_locators.insert(key) {
                    sources.push(hit);
                }
            }

            let reflection = self.reflect(task, &sources, &notes).await;
            covered.extend(reflection.covered.iter().copied());
            if !reflection.note.is_empty() {
                notes.push(reflection.note.clone());
            }
            let coverage = if task.dimensions.is_empty() {
                1.0
            } else {
                covered.len() as f32 / task.dimensions.len() as f32
            };

            if let Some(reason) =
                stop_reason(&self.config, lookups, sources.len(), overlapping, coverage)
            {
                debug!(task_id = task.id, lookups, sources = sources.len(), coverage, ?reason, "research loop stopped");
                break;
            }

            query = reflection
                .next_query
                .unwrap_or_else(|| Self::fallback_query(task, &covered, lookups));
            previous = Some(signature);
        }

        let prompt = prompts::researcher_findings_prompt(task, &sources, &notes);
        let raw = with_timeout(
            self.config.call_timeout,
            self.llm
                .generate_with_system(prompts::RESEARCHER_FINDINGS_SYSTEM, &prompt),
        )
        .await?;

        let body = clean_body(&raw, sources.len());
        let mut body_covered = headed_dimensions(&body, &task.dimensions);
        if body_covered.is_empty() {
            body_covered = covered;
        }

        Ok(FindingsDocument {
            task_id: task.id,
            topic: task.topic.clone(),
            path_index: task.path_index,
            assigned: task.dimensions.clone(),
            covered: body_covered.into_iter().collect(),
            body,
            sources: sources
                .into_iter()
                .enumerate()
                .map(|(i, hit)| SourceRef {
                    index: i + 1,
                    title: hit.title,
                    locator: hit.locator,
                })
                .collect(),
            lookups,
            degraded: false,
        })
    }
}

#[async_trait]
impl SubAgent for ResearcherAgent {
    #[instrument(skip_all, fields(task_id = task.id, path = %task.path_title))]
    async fn research(&self, task: ResearchTask) -> FindingsDocument {
        match self.run(&task).await {
            Ok(doc) => {
                info!(
                    sources = doc.sources.len(),
                    covered = doc.covered.len(),
                    lookups = doc.lookups,
                    "findings collected"
                );
                doc
            }
            Err(e) => {
                warn!(error = %e, "researcher failed, returning degraded findings");
                FindingsDocument::degraded(&task)
            }
        }
    }
}

/// Drops any model-written source list and citations outside `1..=source_count`.
fn clean_body(raw: &str, source_count: usize) -> String {
    let mut kept = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') && is_sources_heading(trimmed) {
            break;
        }
        kept.push(line);
    }
    let body = kept.join("\n");
    remap_citations(body.trim(), |n| (1..=source_count).contains(&n).then_some(n))
}

/// Assigned dimensions that have their own heading in `body`.
fn headed_dimensions(body: &str, assigned: &[Dimension]) -> BTreeSet<Dimension> {
    body.lines()
        .map(str::trim)
        .filter(|l| l.starts_with('#'))
        .filter_map(|l| Dimension::from_heading(l.trim_start_matches('#')))
        .filter(|d| assigned.contains(d))
        .collect()
}
