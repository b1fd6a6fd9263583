//! Backs the `GET /query/{id}/evaluation` contract: an evaluation starts
//! `pending` the moment a query is accepted and is filled in once scoring
//! completes, out of band with the response the caller already received.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::relevance::EvaluationResult;

#[derive(Debug, Clone)]
pub enum EvaluationState {
    Pending,
    Complete(EvaluationResult),
}

#[derive(Default)]
pub struct EvaluationStore {
    entries: RwLock<HashMap<String, EvaluationState>>,
}

impl EvaluationStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn mark_pending(&self, query_id: &str) {
        self.entries.write().await.insert(query_id.to_string(), EvaluationState::Pending);
    }

    pub async fn complete(&self, query_id: &str, result: EvaluationResult) {
        self.entries.write().await.insert(query_id.to_string(), EvaluationState::Complete(result));
    }

    /// `None` means no query was ever registered under this id (a 404 at
    /// the HTTP layer); `Some(Pending)` means it's still being scored.
    pub async fn get(&self, query_id: &str) -> Option<EvaluationState> {
        self.entries.read().await.get(query_id).cloned()
    }
}
