//! Shared mutable state threaded through the ingestion pipeline's stages.

use crate::model::MutationEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitStatus {
    Success,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorSyncStatus {
    Enqueued,
    Published,
    Skipped,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExtractedNode {
    pub id: String,
    pub kind: String,
    pub confidence: f32,
    pub attributes: serde_json::Value,
}

/// One well-known-keys bag owned exclusively by a single in-flight
/// ingestion run. Every stage reads the keys it needs and returns a state
/// with its own keys populated; stages never mutate keys they don't own.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    pub raw_files: Vec<String>,
    pub pending_files: Vec<String>,
    pub ast_results: Option<serde_json::Value>,
    pub extracted_nodes: Vec<ExtractedNode>,
    pub mutation_events: Vec<MutationEvent>,
    pub commit_status: Option<CommitStatus>,
    pub vector_sync_status: Option<VectorSyncStatus>,
}

impl PipelineState {
    pub fn seeded(raw_files: Vec<String>) -> Self {
        Self {
            pending_files: raw_files.clone(),
            raw_files,
            ..Default::default()
        }
    }
}
