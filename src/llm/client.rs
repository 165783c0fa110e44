//! Model client trait, per-call deadlines and provider selection
//!
//! This module provides a unified interface for interacting with the supported providers:
//! - **OpenAI**: any OpenAI-compatible chat-completions endpoint (OpenAI, OpenRouter, vLLM)
//! - **Ollama**: local inference through an Ollama server (feature `ollama`)

use crate::types::{AppError, Result};
use crate::utils::toml_config::{ModelConfig, ProviderConfig};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

/// A chat model as the research stages see it.
///
/// Every stage talks to models only through this trait, so stages can be
/// bound to different providers in `wayfinder.toml` and scripted in tests.
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Single user message, no system prompt
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with system prompt
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// `(role, content)` pairs, oldest first
    async fn generate_with_history(&self, messages: &[(String, String)]) -> Result<String>;

    /// Model identifier as the provider knows it
    fn model_name(&self) -> &str;
}

/// Runs one model call under a deadline.
///
/// An elapsed deadline becomes [`AppError::Timeout`]; the call's own error is
/// returned unchanged.
pub async fn with_timeout<F>(limit: Duration, call: F) -> Result<String>
where
    F: Future<Output = Result<String>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!(
            "model call exceeded {}ms",
            limit.as_millis()
        ))),
    }
}

/// Provider enum for runtime selection
///
/// # Supported Providers
///
/// | Provider | Transport | Notes |
/// |----------|-----------|-------|
/// | OpenAI | `reqwest` | Any `/chat/completions` compatible API |
/// | Ollama | `ollama-rs` | Recommended for local development |
#[derive(Debug, Clone)]
pub enum Provider {
    /// OpenAI API provider (including OpenRouter and other compatible APIs)
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::OpenAI {
    ///     api_key: "sk-...".to_string(),
    ///     api_base: "https://api.openai.com/v1".to_string(),
    ///     model: "gpt-4o-mini".to_string(),
    ///     temperature: 0.3,
    ///     max_tokens: 4096,
    /// };
    /// ```
    OpenAI {
        api_key: String,
        api_base: String,
        model: String,
        temperature: f32,
        max_tokens: u32,
    },

    /// Ollama local LLM provider
    ///
    /// # Example
    /// ```rust,ignore
    /// let provider = Provider::Ollama {
    ///     base_url: "http://localhost:11434".to_string(),
    ///     model: "llama3.2".to_string(),
    /// };
    /// ```
    Ollama { base_url: String, model: String },
}

impl Provider {
    /// Create a client instance for this provider
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, or if the Ollama
    /// provider is requested in a build without the `ollama` feature.
    pub async fn create_client(&self) -> Result<Box<dyn LLMClient>> {
        match self {
            Provider::OpenAI {
                api_key,
                api_base,
                model,
                temperature,
                max_tokens,
            } => Ok(Box::new(
                super::openai::OpenAIClient::new(api_key.clone(), api_base.clone(), model.clone())?
                    .with_sampling(*temperature, *max_tokens),
            )),

            #[cfg(feature = "ollama")]
            Provider::Ollama { base_url, model } => Ok(Box::new(
                super::ollama::OllamaClient::new(base_url.clone(), model.clone()).await?,
            )),

            #[cfg(not(feature = "ollama"))]
            Provider::Ollama { model, .. } => Err(AppError::Configuration(format!(
                "Model '{}' uses the Ollama provider, but this build has the `ollama` feature disabled",
                model
            ))),
        }
    }

    /// Resolve a `[models.<name>]` entry against its provider entry.
    ///
    /// API keys are read from the environment variable the provider names.
    pub fn from_model_config(model: &ModelConfig, provider: &ProviderConfig) -> Result<Self> {
        match provider {
            ProviderConfig::Ollama { base_url, .. } => Ok(Provider::Ollama {
                base_url: base_url.clone(),
                model: model.model.clone(),
            }),
            ProviderConfig::OpenAI {
                api_key_env,
                api_base,
                ..
            } => {
                let api_key = std::env::var(api_key_env).map_err(|_| {
                    AppError::Configuration(format!(
                        "Environment variable '{}' for model '{}' is not set",
                        api_key_env, model.model
                    ))
                })?;
                Ok(Provider::OpenAI {
                    api_key,
                    api_base: api_base.clone(),
                    model: model.model.clone(),
                    temperature: model.temperature,
                    max_tokens: model.max_tokens,
                })
            }
        }
    }

    /// Check if this provider is usable in the current build
    pub fn is_implemented(&self) -> bool {
        match self {
            Provider::OpenAI { .. } => true,
            Provider::Ollama { .. } => cfg!(feature = "ollama"),
        }
    }

    /// Get a human-readable name for this provider
    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAI { .. } => "OpenAI",
            Provider::Ollama { .. } => "Ollama",
        }
    }
}
