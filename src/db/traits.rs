//! Run persistence abstraction
//!
//! The engine keeps no memory of prior runs; whatever must outlive one call
//! to the controller goes through a [`RunStore`]. Only stage-boundary values
//! are stored: the run state (conversation, brief, outline) and the final
//! artifacts. Intermediate findings are never written.
//!
//! # Example
//!
//! ```rust,ignore
//! use wayfinder::db::{InMemoryRunStore, RunStore};
//!
//! let store = InMemoryRunStore::new();
//! store.save_state(&state).await?;
//! let restored = store.load_state(&state.run_id).await?;
//! ```

use crate::types::{ReportArtifacts, Result, RunState};
use async_trait::async_trait;

/// Persistence collaborator keyed by run id.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Stores (or replaces) the state of a run.
    async fn save_state(&self, state: &RunState) -> Result<()>;

    /// Loads a run's state, `None` when the run is unknown.
    async fn load_state(&self, run_id: &str) -> Result<Option<RunState>>;

    /// Stores the terminal artifacts of a run.
    async fn save_artifacts(&self, run_id: &str, artifacts: &ReportArtifacts) -> Result<()>;

    /// Loads a run's artifacts, `None` until the run has completed.
    async fn load_artifacts(&self, run_id: &str) -> Result<Option<ReportArtifacts>>;

    /// Removes everything stored for a run. Unknown ids are not an error.
    async fn delete(&self, run_id: &str) -> Result<()>;
}
