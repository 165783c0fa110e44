//! Configuration utilities.

/// `wayfinder.toml` loading, validation and hot reload.
pub mod toml_config;
