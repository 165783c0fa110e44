//! TOML-based configuration for Wayfinder
//!
//! This module provides declarative configuration for providers, models,
//! per-stage model bindings, research budgets and report options via a TOML
//! file (`wayfinder.toml`). Every field has a default, so an empty file is a
//! valid configuration that talks to a local Ollama server.
//!
//! # Hot Reloading
//!
//! Configuration changes are automatically detected and applied at runtime.
//! Use `ConfigManager` for thread-safe access to the current configuration.

use arc_swap::ArcSwap;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Root configuration structure loaded from wayfinder.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WayfinderConfig {
    #[serde(default)]
    pub server: ServerConfig,

    /// Named LLM provider configurations
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,

    /// Named model configurations that reference providers
    #[serde(default = "default_models")]
    pub models: HashMap<String, ModelConfig>,

    /// Which model each stage uses
    #[serde(default)]
    pub stages: StagesConfig,

    /// Budgets, thresholds and timeouts of the research pipeline
    #[serde(default)]
    pub research: ResearchConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl Default for WayfinderConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            providers: default_providers(),
            models: default_models(),
            stages: StagesConfig::default(),
            research: ResearchConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

const DEFAULT_PROVIDER: &str = "ollama-local";
const DEFAULT_MODEL: &str = "default";

fn default_providers() -> HashMap<String, ProviderConfig> {
    HashMap::from([(
        DEFAULT_PROVIDER.to_string(),
        ProviderConfig::Ollama {
            base_url: default_ollama_url(),
        },
    )])
}

fn default_models() -> HashMap<String, ModelConfig> {
    HashMap::from([(
        DEFAULT_MODEL.to_string(),
        ModelConfig {
            provider: DEFAULT_PROVIDER.to_string(),
            model: "llama3.2".to_string(),
            temperature: default_temperature(),
            max_tokens: default_model_max_tokens(),
        },
    )])
}

// ============= Server Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

// ============= Provider Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderConfig {
    Ollama {
        #[serde(default = "default_ollama_url")]
        base_url: String,
    },
    OpenAI {
        /// Environment variable containing API key
        api_key_env: String,
        #[serde(default = "default_openai_base")]
        api_base: String,
    },
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".to_string()
}

// ============= Model Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Reference to a provider name defined in [providers]
    pub provider: String,

    /// Model name/identifier to use with the provider
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.3
}

fn default_model_max_tokens() -> u32 {
    4096
}

// ============= Stage Bindings =============

/// Model name per model-backed stage. Compression is algorithmic and has none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default = "default_stage_model")]
    pub clarify: String,
    #[serde(default = "default_stage_model")]
    pub scoping: String,
    #[serde(default = "default_stage_model")]
    pub supervisor: String,
    #[serde(default = "default_stage_model")]
    pub researcher: String,
    #[serde(default = "default_stage_model")]
    pub report: String,
    #[serde(default = "default_stage_model")]
    pub faq: String,
}

fn default_stage_model() -> String {
    DEFAULT_MODEL.to_string()
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            clarify: default_stage_model(),
            scoping: default_stage_model(),
            supervisor: default_stage_model(),
            researcher: default_stage_model(),
            report: default_stage_model(),
            faq: default_stage_model(),
        }
    }
}

impl StagesConfig {
    /// `(stage, model)` pairs, in pipeline order.
    pub fn bindings(&self) -> [(&'static str, &str); 6] {
        [
            ("clarify", self.clarify.as_str()),
            ("scoping", self.scoping.as_str()),
            ("supervisor", self.supervisor.as_str()),
            ("researcher", self.researcher.as_str()),
            ("report", self.report.as_str()),
            ("faq", self.faq.as_str()),
        ]
    }
}

// ============= Research Configuration =============

/// Hard ceiling on supervisor reflections, planning included.
pub const MAX_REFLECTIONS: usize = 3;

/// Hard ceiling on lookups per researcher sub-agent.
pub const MAX_RESEARCHER_LOOKUPS: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    #[serde(default = "default_max_parallel_workers")]
    pub max_parallel_workers: usize,

    /// Reflections plus delegations the supervisor may issue in one run
    #[serde(default = "default_total_calls_budget")]
    pub total_calls_budget: usize,

    #[serde(default = "default_max_reflections")]
    pub max_reflections: usize,

    /// Outline coverage at which the supervisor completes
    #[serde(default = "default_threshold")]
    pub coverage_threshold: f32,

    /// Coverage credit a degraded finding earns for its assigned cells
    #[serde(default)]
    pub degraded_coverage_weight: f32,

    #[serde(default = "default_researcher_max_lookups")]
    pub researcher_max_lookups: usize,

    #[serde(default = "default_researcher_min_sources")]
    pub researcher_min_sources: usize,

    #[serde(default = "default_threshold")]
    pub researcher_coverage_threshold: f32,

    /// Jaccard similarity at which two consecutive lookups count as overlapping
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f32,

    #[serde(default = "default_results_per_lookup")]
    pub results_per_lookup: usize,

    #[serde(default = "default_compression_token_budget")]
    pub compression_token_budget: usize,

    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Deadline for the whole supervisor stage
    #[serde(default = "default_stage_timeout_secs")]
    pub stage_timeout_secs: u64,

    /// Fail the run when every finding came back degraded
    #[serde(default)]
    pub abort_on_empty_research: bool,

    /// Registered tool the researchers use for lookups
    #[serde(default = "default_lookup_tool")]
    pub lookup_tool: String,
}

fn default_max_parallel_workers() -> usize {
    4
}

fn default_total_calls_budget() -> usize {
    12
}

fn default_max_reflections() -> usize {
    MAX_REFLECTIONS
}

fn default_threshold() -> f32 {
    0.8
}

fn default_researcher_max_lookups() -> usize {
    MAX_RESEARCHER_LOOKUPS
}

fn default_researcher_min_sources() -> usize {
    4
}

fn default_overlap_threshold() -> f32 {
    0.5
}

fn default_results_per_lookup() -> usize {
    2
}

fn default_compression_token_budget() -> usize {
    6_000
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_stage_timeout_secs() -> u64 {
    900
}

fn default_lookup_tool() -> String {
    "web_search".to_string()
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_parallel_workers: default_max_parallel_workers(),
            total_calls_budget: default_total_calls_budget(),
            max_reflections: default_max_reflections(),
            coverage_threshold: default_threshold(),
            degraded_coverage_weight: 0.0,
            researcher_max_lookups: default_researcher_max_lookups(),
            researcher_min_sources: default_researcher_min_sources(),
            researcher_coverage_threshold: default_threshold(),
            overlap_threshold: default_overlap_threshold(),
            results_per_lookup: default_results_per_lookup(),
            compression_token_budget: default_compression_token_budget(),
            call_timeout_secs: default_call_timeout_secs(),
            stage_timeout_secs: default_stage_timeout_secs(),
            abort_on_empty_research: false,
            lookup_tool: default_lookup_tool(),
        }
    }
}

impl ResearchConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }
}

// ============= Report Configuration =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Produce the purchase-gated teaser by default
    #[serde(default)]
    pub purchasable: bool,

    /// Share of the executive summary kept in the preview
    #[serde(default = "default_preview_summary_ratio")]
    pub preview_summary_ratio: f32,
}

fn default_preview_summary_ratio() -> f32 {
    0.5
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            purchasable: false,
            preview_summary_ratio: default_preview_summary_ratio(),
        }
    }
}

// ============= Configuration Loading & Validation =============

/// Configuration warnings that don't prevent operation but may indicate issues
#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub kind: ConfigWarningKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigWarningKind {
    UnusedProvider,
    UnusedModel,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Errors that can occur during configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Environment variable '{0}' referenced in config is not set")]
    MissingEnvVar(String),

    #[error("Provider '{0}' referenced by model '{1}' does not exist")]
    MissingProvider(String, String),

    #[error("Model '{0}' referenced by stage '{1}' does not exist")]
    MissingModel(String, String),

    #[error("Watch error: {0}")]
    WatchError(#[from] notify::Error),
}

impl From<ConfigError> for crate::types::AppError {
    fn from(err: ConfigError) -> Self {
        crate::types::AppError::Configuration(err.to_string())
    }
}

impl WayfinderConfig {
    /// Load configuration from a TOML file and validate it
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Parse without validating
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Validate the configuration for internal consistency and env var availability
    pub fn validate(&self) -> Result<(), ConfigError> {
        let research = &self.research;

        if research.max_parallel_workers == 0 {
            return Err(ConfigError::ValidationError(
                "research.max_parallel_workers must be at least 1".to_string(),
            ));
        }
        if research.total_calls_budget == 0 {
            return Err(ConfigError::ValidationError(
                "research.total_calls_budget must be at least 1".to_string(),
            ));
        }
        if !(1..=MAX_REFLECTIONS).contains(&research.max_reflections) {
            return Err(ConfigError::ValidationError(format!(
                "research.max_reflections must be between 1 and {}",
                MAX_REFLECTIONS
            )));
        }
        if !(1..=MAX_RESEARCHER_LOOKUPS).contains(&research.researcher_max_lookups) {
            return Err(ConfigError::ValidationError(format!(
                "research.researcher_max_lookups must be between 1 and {}",
                MAX_RESEARCHER_LOOKUPS
            )));
        }
        if research.results_per_lookup == 0 || research.researcher_min_sources == 0 {
            return Err(ConfigError::ValidationError(
                "research.results_per_lookup and research.researcher_min_sources must be at least 1"
                    .to_string(),
            ));
        }
        for (name, value) in [
            ("research.coverage_threshold", research.coverage_threshold),
            (
                "research.researcher_coverage_threshold",
                research.researcher_coverage_threshold,
            ),
            ("research.overlap_threshold", research.overlap_threshold),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&research.degraded_coverage_weight) {
            return Err(ConfigError::ValidationError(format!(
                "research.degraded_coverage_weight must be in [0, 1], got {}",
                research.degraded_coverage_weight
            )));
        }
        if research.call_timeout_secs == 0 || research.stage_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "research timeouts must be greater than zero".to_string(),
            ));
        }
        let ratio = self.report.preview_summary_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(ConfigError::ValidationError(format!(
                "report.preview_summary_ratio must be in (0, 1), got {}",
                ratio
            )));
        }

        // Validate provider env vars
        for provider in self.providers.values() {
            match provider {
                ProviderConfig::OpenAI { api_key_env, .. } => {
                    self.validate_env_var(api_key_env)?;
                }
                ProviderConfig::Ollama { .. } => {}
            }
        }

        // Validate model -> provider references
        for (model_name, model_config) in &self.models {
            if !self.providers.contains_key(&model_config.provider) {
                return Err(ConfigError::MissingProvider(
                    model_config.provider.clone(),
                    model_name.clone(),
                ));
            }
        }

        // Validate stage -> model references
        for (stage, model) in self.stages.bindings() {
            if !self.models.contains_key(model) {
                return Err(ConfigError::MissingModel(
                    model.to_string(),
                    stage.to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Validate configuration with warnings for unused items
    ///
    /// Returns Ok with warnings, or Err if validation fails
    pub fn validate_with_warnings(&self) -> Result<Vec<ConfigWarning>, ConfigError> {
        self.validate()?;

        let mut warnings = Vec::new();
        warnings.extend(self.check_unused_providers());
        warnings.extend(self.check_unused_models());
        warnings.sort_by(|a, b| a.message.cmp(&b.message));

        Ok(warnings)
    }

    /// Check for providers that aren't referenced by any model
    fn check_unused_providers(&self) -> Vec<ConfigWarning> {
        let referenced: HashSet<_> = self.models.values().map(|m| m.provider.as_str()).collect();

        self.providers
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedProvider,
                message: format!(
                    "Provider '{}' is defined but not referenced by any model",
                    name
                ),
            })
            .collect()
    }

    /// Check for models that aren't bound to any stage
    fn check_unused_models(&self) -> Vec<ConfigWarning> {
        let referenced: HashSet<&str> =
            self.stages.bindings().iter().map(|(_, model)| *model).collect();

        self.models
            .keys()
            .filter(|name| !referenced.contains(name.as_str()))
            .map(|name| ConfigWarning {
                kind: ConfigWarningKind::UnusedModel,
                message: format!("Model '{}' is defined but not bound to any stage", name),
            })
            .collect()
    }

    fn validate_env_var(&self, name: &str) -> Result<(), ConfigError> {
        std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        Ok(())
    }

    pub fn get_provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.get(name)
    }

    pub fn get_model(&self, name: &str) -> Option<&ModelConfig> {
        self.models.get(name)
    }
}

// ============= Hot Reloading Configuration Manager =============

/// Thread-safe configuration manager with hot reloading support
pub struct ConfigManager {
    config: Arc<ArcSwap<WayfinderConfig>>,
    config_path: PathBuf,
    watcher: RwLock<Option<RecommendedWatcher>>,
    reload_tx: Option<mpsc::UnboundedSender<()>>,
}

impl ConfigManager {
    /// Create a new configuration manager and load the initial config
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        // Convert to absolute path for reliable file watching
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(ConfigError::ReadError)?
                .join(path)
        };

        let config = WayfinderConfig::load(&path)?;

        Ok(Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: path,
            watcher: RwLock::new(None),
            reload_tx: None,
        })
    }

    /// Create a config manager directly from a config (useful for testing)
    /// This won't have file watching capabilities.
    pub fn from_config(config: WayfinderConfig) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(config)),
            config_path: PathBuf::from("wayfinder.toml"),
            watcher: RwLock::new(None),
            reload_tx: None,
        }
    }

    /// Get the current configuration (lockless read)
    pub fn config(&self) -> Arc<WayfinderConfig> {
        self.config.load_full()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Manually reload the configuration from disk
    pub fn reload(&self) -> Result<(), ConfigError> {
        info!("Reloading configuration from {:?}", self.config_path);

        let new_config = WayfinderConfig::load(&self.config_path)?;
        self.config.store(Arc::new(new_config));

        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Start watching for configuration file changes
    pub fn start_watching(&mut self) -> Result<(), ConfigError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();
        self.reload_tx = Some(tx.clone());

        let config_path = self.config_path.clone();
        let config_arc = Arc::clone(&self.config);

        let watched_file = config_path.clone();
        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) => {
                    let touches_config = event.paths.iter().any(|p| p == &watched_file);
                    if touches_config && (event.kind.is_modify() || event.kind.is_create()) {
                        // Send reload signal (debounced in the receiver)
                        let _ = tx.send(());
                    }
                }
                Err(e) => {
                    error!("Config watcher error: {:?}", e);
                }
            }
        })?;

        // Watch the config file's parent directory
        if let Some(parent) = self.config_path.parent() {
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        }

        *self.watcher.write() = Some(watcher);

        tokio::spawn(async move {
            let mut last_reload: Option<std::time::Instant> = None;
            let debounce_duration = Duration::from_millis(500);

            while rx.recv().await.is_some() {
                if last_reload.is_some_and(|t| t.elapsed() < debounce_duration) {
                    continue;
                }

                // Wait a bit for file write to complete
                tokio::time::sleep(Duration::from_millis(100)).await;

                match WayfinderConfig::load(&config_path) {
                    Ok(new_config) => {
                        config_arc.store(Arc::new(new_config));
                        info!("Configuration hot-reloaded successfully");
                        last_reload = Some(std::time::Instant::now());
                    }
                    Err(e) => {
                        warn!(
                            "Failed to hot-reload config: {}. Keeping previous config.",
                            e
                        );
                    }
                }
            }
        });

        info!("Configuration hot-reload watcher started");
        Ok(())
    }

    /// Stop watching for configuration changes
    pub fn stop_watching(&self) {
        *self.watcher.write() = None;
        info!("Configuration hot-reload watcher stopped");
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            config_path: self.config_path.clone(),
            watcher: RwLock::new(None), // Watcher is not cloned
            reload_tx: self.reload_tx.clone(),
        }
    }
}
