//! Per-run conversation checkpoints.
//!
//! A checkpointer lets a later run with the same run id continue the saved
//! conversation. Without one, every run starts from an empty history.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::llm::Message;

use super::state::{AgentState, ErrorRecord};

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint storage failed: {0}")]
    Storage(String),
}

/// Saved end state of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub run_id: String,
    pub messages: Vec<Message>,
    pub iteration_count: usize,
    pub errors: Vec<ErrorRecord>,
    pub saved_at: DateTime<Utc>,
}

impl RunSnapshot {
    pub fn from_state(state: &AgentState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            messages: state.messages.clone(),
            iteration_count: state.iteration_count,
            errors: state.errors.clone(),
            saved_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait Checkpointer: Send + Sync {
    async fn load(&self, run_id: &str) -> Result<Option<RunSnapshot>, CheckpointError>;

    async fn save(&self, snapshot: RunSnapshot) -> Result<(), CheckpointError>;
}

/// In-memory checkpointer (non-persistent).
#[derive(Clone, Default)]
pub struct InMemoryCheckpointer {
    runs: Arc<RwLock<HashMap<String, RunSnapshot>>>,
}

impl InMemoryCheckpointer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs with a saved snapshot.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn load(&self, run_id: &str) -> Result<Option<RunSnapshot>, CheckpointError> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn save(&self, snapshot: RunSnapshot) -> Result<(), CheckpointError> {
        self.runs
            .write()
            .await
            .insert(snapshot.run_id.clone(), snapshot);
        Ok(())
    }
}
