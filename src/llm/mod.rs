//! LLM Provider Clients and Abstractions
//!
//! This module provides a unified interface for interacting with the supported
//! Large Language Model (LLM) providers. It abstracts provider-specific
//! implementations behind common traits, so every research stage works with any
//! configured model.
//!
//! # Architecture
//!
//! The module follows a factory pattern:
//! - [`LLMClient`] - The core trait that all providers implement
//! - [`Provider`] - A resolved provider that builds clients
//! - [`ProviderRegistry`] - Resolves `[models.*]` names from `wayfinder.toml`
//! - [`json`] - Extracts structured JSON answers from model output
//!
//! # Supported Providers
//!
//! - OpenAI-compatible endpoints (always available)
//! - `ollama` - Local Ollama server (default feature)
//!
//! # Example
//!
//! ```ignore
//! use wayfinder::llm::ProviderRegistry;
//!
//! let registry = ProviderRegistry::from_config(&config);
//! let client = registry.create_client_for_model("fast").await?;
//! let response = client.generate("What is 2+2?").await?;
//! ```

/// Core LLM client trait and provider selection.
pub mod client;
/// JSON extraction from model responses.
pub mod json;
/// Registry for managing multiple LLM provider instances.
pub mod provider_registry;

#[cfg(feature = "ollama")]
pub mod ollama;

pub mod openai;

pub use client::{with_timeout, LLMClient, Provider};
pub use provider_registry::ProviderRegistry;
