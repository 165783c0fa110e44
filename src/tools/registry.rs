use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<Value>;
}

/// One result of an external lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupHit {
    pub title: String,
    pub locator: String,
    #[serde(default)]
    pub snippet: String,
}

/// The external lookup a researcher sub-agent performs between reflections.
#[async_trait]
pub trait Lookup: Send + Sync {
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<LookupHit>>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a new registry with the daedra-powered web search tool
    pub fn with_default_tools() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(crate::tools::search::SearchTool::new()));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<Value> {
        if let Some(tool) = self.tools.get(name) {
            tool.execute(args).await
        } else {
            Err(AppError::NotFound(format!("Tool not found: {}", name)))
        }
    }

    /// Get a list of all registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a tool is registered
    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

/// Exposes a registered search-style tool as a [`Lookup`].
///
/// The tool must accept `{"query", "num_results"}` and answer with a
/// `results` array of `{title, url, description}` objects.
pub struct ToolLookup {
    registry: Arc<ToolRegistry>,
    tool_name: String,
}

impl ToolLookup {
    pub fn new(registry: Arc<ToolRegistry>, tool_name: impl Into<String>) -> Result<Self> {
        let tool_name = tool_name.into();
        if !registry.has_tool(&tool_name) {
            return Err(AppError::Configuration(format!(
                "Lookup tool '{}' is not registered",
                tool_name
            )));
        }
        Ok(Self {
            registry,
            tool_name,
        })
    }
}

#[async_trait]
impl Lookup for ToolLookup {
    async fn lookup(&self, query: &str, limit: usize) -> Result<Vec<LookupHit>> {
        let output = self
            .registry
            .execute(
                &self.tool_name,
                json!({ "query": query, "num_results": limit }),
            )
            .await?;

        let hits = output
            .get("results")
            .and_then(Value::as_array)
            .map(|results| {
                results
                    .iter()
                    .filter_map(|r| {
                        let locator = r.get("url")?.as_str()?.trim().to_string();
                        let title = r
                            .get("title")
                            .and_then(Value::as_str)
                            .unwrap_or(&locator)
                            .trim()
                            .to_string();
                        let snippet = r
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .trim()
                            .to_string();
                        Some(LookupHit {
                            title,
                            locator,
                            snippet,
                        })
                    })
                    .take(limit)
                    .collect()
            })
            .unwrap_or_default();

        Ok(hits)
    }
}
