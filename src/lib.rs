//! # Wayfinder - career research orchestration
//!
//! Wayfinder turns a conversation about someone's career into a
//! citation-backed report. A run moves through five stages:
//!
//! 1. **Clarification** - gather role, experience, skills, location,
//!    target salary and goals, asking one question per turn
//! 2. **Scoping** - a research brief and an outline of four career paths
//! 3. **Supervision** - budgeted rounds of parallel researcher sub-agents
//! 4. **Compression** - merge, deduplicate and renumber the findings
//! 5. **Synthesis** - a short `preview` and a `full` markdown report
//!
//! ## Overview
//!
//! Wayfinder can be used in two ways:
//!
//! 1. **As a standalone server** - Run the `wayfinder` binary
//! 2. **As a library** - Embed the [`ResearchCoordinator`] in your own service
//!
//! ## Quick Start (Library Usage)
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use wayfinder::{ConfigManager, InMemoryRunStore, ResearchCoordinator};
//! use wayfinder::types::{RunOutcome, RunRequest, Turn};
//!
//! let settings = Arc::new(ConfigManager::new("wayfinder.toml")?);
//! let coordinator =
//!     ResearchCoordinator::from_config(settings, Arc::new(InMemoryRunStore::new())).await?;
//!
//! let request = RunRequest {
//!     run_id: None,
//!     conversation: vec![Turn::user("I'm a staff nurse in Leeds, five years on wards")],
//!     options: Default::default(),
//! };
//! match coordinator.advance(request, CancellationToken::new()).await? {
//!     RunOutcome::AwaitingUser { question, .. } => println!("{}", question),
//!     RunOutcome::Completed { artifacts, .. } => println!("{}", artifacts.full),
//!     RunOutcome::Failed { reason, .. } => eprintln!("{}", reason),
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `ollama` | Ollama local inference (default) |
//!
//! OpenAI-compatible endpoints are always available.
//!
//! ## Modules
//!
//! - [`api`] - REST API handlers and routes
//! - [`db`] - Run persistence
//! - [`llm`] - LLM client implementations
//! - [`research`] - The staged research pipeline
//! - [`tools`] - Lookup tools used by researchers
//! - [`types`] - Common types and error handling
//!
//! ## Configuration
//!
//! Everything lives in `wayfinder.toml`: providers, models, per-stage model
//! bindings, budgets and report options. The file is hot-reloaded; runs
//! already in flight keep the configuration they started with.

#![cfg_attr(docsrs, feature(doc_cfg))]

/// HTTP API handlers and routes.
pub mod api;
/// Run persistence.
pub mod db;
/// LLM provider clients and abstractions.
pub mod llm;
/// Conversation transcript and token helpers.
pub mod memory;
/// Staged career research pipeline.
pub mod research;
/// Lookup tools (web search).
pub mod tools;
/// Core types (conversation, findings, run outcomes, errors).
pub mod types;
/// Configuration utilities.
pub mod utils;

// Re-export commonly used types
pub use db::{InMemoryRunStore, RunStore};
pub use llm::{LLMClient, Provider, ProviderRegistry};
pub use research::{ResearchCoordinator, StageClients};
pub use tools::{Lookup, LookupHit, ToolRegistry};
pub use types::{AppError, Result};
pub use utils::toml_config::{ConfigManager, WayfinderConfig};

use axum::Router;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// TOML-based configuration with hot-reload support
    pub config_manager: Arc<ConfigManager>,
    /// Pipeline that advances runs and answers follow-up questions
    pub coordinator: Arc<ResearchCoordinator>,
}

/// Builds the full HTTP application: `/api` routes plus tracing, CORS and body limits.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api::routes::create_router())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
