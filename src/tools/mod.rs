//! Built-in Tools for Researcher Sub-Agents
//!
//! This module provides the tool infrastructure researchers use to gather
//! evidence beyond what the model already knows.
//!
//! # Module Structure
//!
//! - [`search`](crate::tools::search) - Web search integration (DuckDuckGo via daedra)
//! - [`registry`](crate::tools::registry) - Tool registration, the [`Lookup`] seam and its adapter
//!
//! # Lookups
//!
//! Researchers depend only on the [`Lookup`] trait. In production it is backed
//! by a registered tool:
//! ```ignore
//! let registry = Arc::new(ToolRegistry::with_default_tools());
//! let lookup = ToolLookup::new(registry, "web_search")?;
//! let hits = lookup.lookup("radiographer salary uk", 2).await?;
//! ```

/// Tool registry and lookup adapter.
pub mod registry;
/// Web search tool using DuckDuckGo.
pub mod search;

pub use registry::{Lookup, LookupHit, Tool, ToolLookup, ToolRegistry};
