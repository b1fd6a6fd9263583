//! Staged, resumable ingestion: AST -> Extraction -> GraphWrite -> VectorSync.

pub mod driver;
pub mod stage;
pub mod state;

pub use driver::PipelineDriver;
pub use stage::{
    AstService, AstStage, ExtractionStage, GraphRepository, GraphWriteStage, LocalExtractor, MutationTransport,
    PromptTemplateRegistry, Stage, VectorSyncStage, VectorSyncTarget,
};
pub use state::{CommitStatus, ExtractedNode, PipelineState, VectorSyncStatus};
