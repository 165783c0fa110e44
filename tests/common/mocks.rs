//! Mock implementations for testing.
//!
//! Scripted stand-ins for the model, the lookup tool and the researcher
//! sub-agent, shared across test files.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use wayfinder::llm::LLMClient;
use wayfinder::research::SubAgent;
use wayfinder::tools::{Lookup, LookupHit};
use wayfinder::types::{AppError, Dimension, FindingsDocument, ResearchTask, Result, SourceRef};

/// Stage marker of a system prompt: `Task: research-outline.` gives `research-outline`.
pub fn stage_of(system: &str) -> String {
    system
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("Task: "))
        .map(|rest| rest.trim_end_matches('.').to_string())
        .unwrap_or_default()
}

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail,
    Slow(Duration, String),
}

struct Rule {
    stage: String,
    needle: Option<String>,
    reply: Reply,
    remaining: Option<usize>,
}

/// Mock LLM client that routes by stage marker.
///
/// Rules are tried in the order they were added; the first whose stage
/// matches, whose needle (if any) occurs in the prompt and which has uses
/// left answers the call. A call no rule matches fails.
///
/// # Examples
///
/// ```ignore
/// let llm = MockLLMClient::new()
///     .once("supervisor-reflection", r#"{"decision": "gap_fill"}"#)
///     .on("supervisor-reflection", r#"{"decision": "continue"}"#)
///     .fail_on("report-synthesis");
/// ```
#[derive(Default)]
pub struct MockLLMClient {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockLLMClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, stage: &str, needle: Option<&str>, reply: Reply, remaining: Option<usize>) -> Self {
        self.rules.lock().push(Rule {
            stage: stage.to_string(),
            needle: needle.map(str::to_string),
            reply,
            remaining,
        });
        self
    }

    /// Always answer `stage` with `reply`.
    pub fn on(self, stage: &str, reply: impl Into<String>) -> Self {
        self.push(stage, None, Reply::Text(reply.into()), None)
    }

    /// Answer `stage` with `reply` for prompts containing `needle`.
    pub fn on_containing(self, stage: &str, needle: &str, reply: impl Into<String>) -> Self {
        self.push(stage, Some(needle), Reply::Text(reply.into()), None)
    }

    /// Answer the next call for `stage` only.
    pub fn once(self, stage: &str, reply: impl Into<String>) -> Self {
        self.push(stage, None, Reply::Text(reply.into()), Some(1))
    }

    /// Fail every call for `stage`.
    pub fn fail_on(self, stage: &str) -> Self {
        self.push(stage, None, Reply::Fail, None)
    }

    /// Fail calls for `stage` whose prompt contains `needle`.
    pub fn fail_containing(self, stage: &str, needle: &str) -> Self {
        self.push(stage, Some(needle), Reply::Fail, None)
    }

    /// Answer `stage` after sleeping for `delay`.
    pub fn slow(self, stage: &str, delay: Duration, reply: impl Into<String>) -> Self {
        self.push(stage, None, Reply::Slow(delay, reply.into()), None)
    }

    /// Number of calls made for `stage`.
    pub fn calls(&self, stage: &str) -> usize {
        self.calls.lock().iter().filter(|(s, _)| s == stage).count()
    }

    /// Prompts sent for `stage`, in call order.
    pub fn prompts(&self, stage: &str) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter(|(s, _)| s == stage)
            .map(|(_, p)| p.clone())
            .collect()
    }

    async fn respond(&self, system: &str, prompt: &str) -> Result<String> {
        let stage = stage_of(system);
        self.calls.lock().push((stage.clone(), prompt.to_string()));

        let reply = {
            let mut rules = self.rules.lock();
            let rule = rules.iter_mut().find(|r| {
                r.stage == stage
                    && r.remaining != Some(0)
                    && r.needle.as_ref().is_none_or(|n| prompt.contains(n.as_str()))
            });
            match rule {
                Some(rule) => {
                    if let Some(left) = rule.remaining.as_mut() {
                        *left -= 1;
                    }
                    rule.reply.clone()
                }
                None => {
                    return Err(AppError::LLM(format!(
                        "no scripted reply for stage '{}'",
                        stage
                    )))
                }
            }
        };

        match reply {
            Reply::Text(text) => Ok(text),
            Reply::Fail => Err(AppError::LLM(format!("scripted failure for '{}'", stage))),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text)
            }
        }
    }
}

#[async_trait]
impl LLMClient for MockLLMClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.respond("", prompt).await
    }

    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String> {
        self.respond(system, prompt).await
    }

    async fn generate_with_history(&self, messages: &[(String, String)]) -> Result<String> {
        let system = messages
            .iter()
            .find(|(role, _)| role == "system")
            .map(|(_, content)| content.as_str())
            .unwrap_or("");
        let prompt = messages
            .iter()
            .filter(|(role, _)| role != "system")
            .map(|(_, content)| content.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        self.respond(system, &prompt).await
    }

    fn model_name(&self) -> &str {
        "mock-model"
    }
}

/// Lookup that returns `per_call` fresh hits per query, or fails.
pub struct MockLookup {
    per_call: usize,
    fail: bool,
    counter: AtomicUsize,
    queries: Mutex<Vec<String>>,
}

impl MockLookup {
    pub fn new(per_call: usize) -> Self {
        Self {
            per_call,
            fail: false,
            counter: AtomicUsize::new(0),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0)
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl Lookup for MockLookup {
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<LookupHit>> {
        self.queries.lock().push(query.to_string());
        if self.fail {
            return Err(AppError::Internal("search backend unavailable".to_string()));
        }
        Ok((0..self.per_call.min(limit))
            .map(|_| {
                let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                LookupHit {
                    title: format!("Source {}", n),
                    locator: format!("https://example.org/articles/{}", n),
                    snippet: format!("Snippet for {}", query),
                }
            })
            .collect())
    }
}

/// How a [`TrackingAgent`] answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    /// Covers every assigned dimension with one cited source.
    Thorough,
    /// Covers only the first `n` assigned dimensions.
    Partial(usize),
    /// Always returns degraded findings.
    Failing,
}

/// Sub-agent that records tasks and peak concurrency.
pub struct TrackingAgent {
    mode: AgentMode,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    tasks: Mutex<Vec<ResearchTask>>,
}

impl TrackingAgent {
    pub fn new(mode: AgentMode, delay: Duration) -> Self {
        Self {
            mode,
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn tasks(&self) -> Vec<ResearchTask> {
        self.tasks.lock().clone()
    }
}

/// Findings body with one cited line per dimension under its own heading.
pub fn findings_body(path_title: &str, dimensions: &[Dimension]) -> String {
    dimensions
        .iter()
        .map(|d| format!("### {}\n{} data point for {} is 42% [1].\n", d.title(), path_title, d.key()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[async_trait]
impl SubAgent for TrackingAgent {
    async fn research(&self, task: ResearchTask) -> FindingsDocument {
        self.tasks.lock().push(task.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let covered: Vec<Dimension> = match self.mode {
            AgentMode::Failing => return FindingsDocument::degraded(&task),
            AgentMode::Thorough => task.dimensions.clone(),
            AgentMode::Partial(n) => task.dimensions.iter().copied().take(n).collect(),
        };
        FindingsDocument {
            task_id: task.id,
            topic: task.topic.clone(),
            path_index: task.path_index,
            assigned: task.dimensions.clone(),
            body: findings_body(&task.path_title, &covered),
            covered,
            sources: vec![SourceRef {
                index: 1,
                title: format!("{} guide", task.path_title),
                locator: format!("https://example.org/{}/{}", task.path_index.unwrap_or(0), task.id),
            }],
            lookups: 1,
            degraded: false,
        }
    }
}
