//! Pipeline stage contract and the four concrete stages: AST, Extraction,
//! GraphWrite, VectorSync.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{MutationEvent, OutboxEvent, OutboxOperation};
use crate::outbox::OutboxStore;

use super::state::{CommitStatus, ExtractedNode, PipelineState, VectorSyncStatus};

/// Every stage must be idempotent when replayed with the same inputs and
/// expose a cheap healthcheck independent of `run`.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn run(&self, state: PipelineState) -> Result<PipelineState>;

    async fn healthcheck(&self) -> bool;
}

/// Remote AST extraction service, preferred over local extractors when
/// present and healthy.
#[async_trait]
pub trait AstService: Send + Sync {
    async fn parse(&self, file_path: &str, contents: &str) -> Result<serde_json::Value>;

    async fn is_available(&self) -> bool;
}

pub type LocalExtractor = Arc<dyn Fn(&str, &str) -> serde_json::Value + Send + Sync>;

/// Reads raw files and produces `ast_results`. Prefers a remote AST
/// service when configured and reachable; otherwise dispatches to a local
/// extractor keyed by file extension. A no-op on empty input.
pub struct AstStage {
    remote: Option<Arc<dyn AstService>>,
    local_extractors: HashMap<String, LocalExtractor>,
    file_loader: Arc<dyn Fn(&str) -> Result<String> + Send + Sync>,
}

impl AstStage {
    pub fn new(
        remote: Option<Arc<dyn AstService>>,
        local_extractors: HashMap<String, LocalExtractor>,
        file_loader: Arc<dyn Fn(&str) -> Result<String> + Send + Sync>,
    ) -> Self {
        Self { remote, local_extractors, file_loader }
    }

    fn extension(path: &str) -> Option<&str> {
        path.rsplit_once('.').map(|(_, ext)| ext)
    }
}

#[async_trait]
impl Stage for AstStage {
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        if state.pending_files.is_empty() {
            return Ok(state);
        }

        let remote = match &self.remote {
            Some(service) if service.is_available().await => Some(service),
            _ => None,
        };

        let mut results = serde_json::Map::new();
        for path in &state.pending_files {
            let contents = (self.file_loader)(path)?;
            let parsed = if let Some(service) = remote {
                service.parse(path, &contents).await?
            } else if let Some(extractor) = Self::extension(path).and_then(|ext| self.local_extractors.get(ext)) {
                extractor(path, &contents)
            } else {
                serde_json::json!({"skipped": true})
            };
            results.insert(path.clone(), parsed);
        }

        state.ast_results = Some(serde_json::Value::Object(results));
        Ok(state)
    }

    async fn healthcheck(&self) -> bool {
        match &self.remote {
            Some(service) => service.is_available().await,
            None => true,
        }
    }
}

/// Resolves prompt templates by name, always returning the highest
/// registered version for that name.
#[derive(Default)]
pub struct PromptTemplateRegistry {
    templates: HashMap<String, Vec<(u32, String)>>,
}

impl PromptTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, version: u32, template: impl Into<String>) {
        self.templates.entry(name.into()).or_default().push((version, template.into()));
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.templates
            .get(name)
            .and_then(|versions| versions.iter().max_by_key(|(v, _)| *v))
            .map(|(_, template)| template.as_str())
    }
}

const DEFAULT_EXTRACTION_CONFIDENCE: f32 = 0.7;

/// Invokes the LLM provider chain to extract structured nodes from AST
/// results. Extraction never lowers a node's confidence below what it
/// assigned; later stages must not reduce it either.
pub struct ExtractionStage {
    chain: Arc<graphrag_llm::ProviderChain>,
    templates: Arc<PromptTemplateRegistry>,
    template_name: String,
}

impl ExtractionStage {
    pub fn new(chain: Arc<graphrag_llm::ProviderChain>, templates: Arc<PromptTemplateRegistry>, template_name: impl Into<String>) -> Self {
        Self { chain, templates, template_name: template_name.into() }
    }
}

#[async_trait]
impl Stage for ExtractionStage {
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        if state.raw_files.is_empty() {
            return Ok(state);
        }

        let template = self
            .templates
            .resolve(&self.template_name)
            .ok_or_else(|| crate::error::CoreError::Validation(format!("no prompt template registered for {}", self.template_name)))?;

        let ast_results = state.ast_results.clone().unwrap_or(serde_json::Value::Null);
        let prompt = format!("{template}\n\n{ast_results}");

        let response = self.chain.ainvoke(&prompt).await?;

        let nodes: Vec<ExtractedNode> = serde_json::from_str::<Vec<serde_json::Value>>(&response)
            .unwrap_or_default()
            .into_iter()
            .map(|attributes| ExtractedNode {
                id: attributes.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                kind: attributes.get("kind").and_then(|v| v.as_str()).unwrap_or("unknown").to_string(),
                confidence: DEFAULT_EXTRACTION_CONFIDENCE,
                attributes,
            })
            .collect();

        state.extracted_nodes.extend(nodes);
        Ok(state)
    }

    async fn healthcheck(&self) -> bool {
        true
    }
}

/// Commits extracted nodes as a graph topology. A capability interface,
/// not a concrete client, so the pipeline stays independent of which
/// graph database backs a deployment.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    async fn commit_topology(&self, nodes: &[ExtractedNode]) -> Result<Vec<MutationEvent>>;
}

pub struct GraphWriteStage {
    repository: Arc<dyn GraphRepository>,
}

impl GraphWriteStage {
    pub fn new(repository: Arc<dyn GraphRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl Stage for GraphWriteStage {
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        if state.extracted_nodes.is_empty() {
            state.commit_status = Some(CommitStatus::Skipped);
            return Ok(state);
        }

        match self.repository.commit_topology(&state.extracted_nodes).await {
            Ok(mutations) => {
                state.mutation_events = mutations;
                state.commit_status = Some(CommitStatus::Success);
            }
            Err(err) => {
                tracing::error!(error = %err, "graph commit failed");
                state.commit_status = Some(CommitStatus::Failed);
            }
        }
        Ok(state)
    }

    async fn healthcheck(&self) -> bool {
        true
    }
}

/// Publishes mutation events through a message bus instead of the outbox,
/// for deployments configured with a streaming vector-sync backend.
#[async_trait]
pub trait MutationTransport: Send + Sync {
    async fn publish(&self, events: &[MutationEvent]) -> Result<()>;
}

pub enum VectorSyncTarget {
    Outbox(Arc<dyn OutboxStore>),
    Transport(Arc<dyn MutationTransport>),
}

pub struct VectorSyncStage {
    target: VectorSyncTarget,
}

impl VectorSyncStage {
    pub fn new(target: VectorSyncTarget) -> Self {
        Self { target }
    }
}

#[async_trait]
impl Stage for VectorSyncStage {
    async fn run(&self, mut state: PipelineState) -> Result<PipelineState> {
        let deletions: Vec<&MutationEvent> = state.mutation_events.iter().filter(|e| e.mutation_type.triggers_vector_deletion()).collect();

        if deletions.is_empty() {
            state.vector_sync_status = Some(VectorSyncStatus::Skipped);
            return Ok(state);
        }

        match &self.target {
            VectorSyncTarget::Outbox(store) => {
                let events: Vec<OutboxEvent> = deletions
                    .iter()
                    .map(|e| OutboxEvent::new("default", OutboxOperation::Delete, e.entity_ids.clone()))
                    .collect();
                store.write_after_tx(events).await?;
                state.vector_sync_status = Some(VectorSyncStatus::Enqueued);
            }
            VectorSyncTarget::Transport(transport) => {
                let owned: Vec<MutationEvent> = deletions.into_iter().cloned().collect();
                transport.publish(&owned).await?;
                state.vector_sync_status = Some(VectorSyncStatus::Published);
            }
        }

        Ok(state)
    }

    async fn healthcheck(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MutationType;

    #[tokio::test]
    async fn ast_stage_is_noop_on_empty_input() {
        let stage = AstStage::new(None, HashMap::new(), Arc::new(|_| Ok(String::new())));
        let state = PipelineState::default();
        let result = stage.run(state).await.unwrap();
        assert!(result.ast_results.is_none());
    }

    #[tokio::test]
    async fn ast_stage_dispatches_by_extension() {
        let mut extractors: HashMap<String, LocalExtractor> = HashMap::new();
        extractors.insert("rs".to_string(), Arc::new(|path, _contents| serde_json::json!({"path": path})));
        let stage = AstStage::new(None, extractors, Arc::new(|_| Ok("fn main() {}".to_string())));

        let state = PipelineState::seeded(vec!["main.rs".to_string()]);
        let result = stage.run(state).await.unwrap();
        assert_eq!(result.ast_results.unwrap()["main.rs"]["path"], "main.rs");
    }

    #[tokio::test]
    async fn graph_write_stage_skips_on_empty_nodes() {
        struct NeverCalled;
        #[async_trait]
        impl GraphRepository for NeverCalled {
            async fn commit_topology(&self, _nodes: &[ExtractedNode]) -> Result<Vec<MutationEvent>> {
                panic!("must not be called");
            }
        }
        let stage = GraphWriteStage::new(Arc::new(NeverCalled));
        let result = stage.run(PipelineState::default()).await.unwrap();
        assert_eq!(result.commit_status, Some(CommitStatus::Skipped));
    }

    #[tokio::test]
    async fn graph_write_stage_marks_failed_on_error() {
        struct AlwaysFails;
        #[async_trait]
        impl GraphRepository for AlwaysFails {
            async fn commit_topology(&self, _nodes: &[ExtractedNode]) -> Result<Vec<MutationEvent>> {
                Err(crate::error::CoreError::Transient("graph unavailable".into()))
            }
        }
        let stage = GraphWriteStage::new(Arc::new(AlwaysFails));
        let mut state = PipelineState::default();
        state.extracted_nodes.push(ExtractedNode {
            id: "A".into(),
            kind: "service".into(),
            confidence: 0.7,
            attributes: serde_json::json!({}),
        });
        let result = stage.run(state).await.unwrap();
        assert_eq!(result.commit_status, Some(CommitStatus::Failed));
    }

    #[tokio::test]
    async fn vector_sync_stage_skips_when_no_deletions() {
        let store: Arc<dyn OutboxStore> = Arc::new(crate::outbox::InMemoryOutboxStore::new());
        let stage = VectorSyncStage::new(VectorSyncTarget::Outbox(store));
        let mut state = PipelineState::default();
        state.mutation_events.push(MutationEvent::new(MutationType::NodeUpsert, vec!["A".into()], "acme"));
        let result = stage.run(state).await.unwrap();
        assert_eq!(result.vector_sync_status, Some(VectorSyncStatus::Skipped));
    }

    #[tokio::test]
    async fn vector_sync_stage_enqueues_tombstone_deletions() {
        let store = Arc::new(crate::outbox::InMemoryOutboxStore::new());
        let stage = VectorSyncStage::new(VectorSyncTarget::Outbox(store.clone()));
        let mut state = PipelineState::default();
        state.mutation_events.push(MutationEvent::new(MutationType::EdgeTombstone, vec!["A".into()], "acme"));
        let result = stage.run(state).await.unwrap();
        assert_eq!(result.vector_sync_status, Some(VectorSyncStatus::Enqueued));
        assert_eq!(store.len().await, 1);
    }
}
