//! In-process [`RunStore`], lost on restart.

use super::traits::RunStore;
use crate::types::{ReportArtifacts, Result, RunState};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    states: RwLock<HashMap<String, RunState>>,
    artifacts: RwLock<HashMap<String, ReportArtifacts>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_count(&self) -> usize {
        self.states.read().len()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save_state(&self, state: &RunState) -> Result<()> {
        self.states
            .write()
            .insert(state.run_id.clone(), state.clone());
        Ok(())
    }

    async fn load_state(&self, run_id: &str) -> Result<Option<RunState>> {
        Ok(self.states.read().get(run_id).cloned())
    }

    async fn save_artifacts(&self, run_id: &str, artifacts: &ReportArtifacts) -> Result<()> {
        self.artifacts
            .write()
            .insert(run_id.to_string(), artifacts.clone());
        Ok(())
    }

    async fn load_artifacts(&self, run_id: &str) -> Result<Option<ReportArtifacts>> {
        Ok(self.artifacts.read().get(run_id).cloned())
    }

    async fn delete(&self, run_id: &str) -> Result<()> {
        self.states.write().remove(run_id);
        self.artifacts.write().remove(run_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConversationState, Turn};

    #[tokio::test]
    async fn test_state_and_artifacts_round_trip() {
        let store = InMemoryRunStore::new();
        let state = RunState::new(
            "run-1",
            ConversationState::from_turns(vec![Turn::user("I'm a paralegal")]),
        );
        store.save_state(&state).await.unwrap();
        assert_eq!(store.load_state("run-1").await.unwrap(), Some(state));
        assert_eq!(store.load_artifacts("run-1").await.unwrap(), None);

        let artifacts = ReportArtifacts {
            preview: "short".to_string(),
            full: "longer text".to_string(),
        };
        store.save_artifacts("run-1", &artifacts).await.unwrap();
        assert_eq!(store.load_artifacts("run-1").await.unwrap(), Some(artifacts));

        store.delete("run-1").await.unwrap();
        assert_eq!(store.load_state("run-1").await.unwrap(), None);
        assert_eq!(store.run_count(), 0);
        store.delete("missing").await.unwrap();
    }
}
