//! Drives one ingestion run through its stages, checkpointing progress
//! between each so a crash mid-run can resume rather than restart.

use std::sync::Arc;

use graphrag_checkpoint::{CheckpointStore, FileStatus, IngestionCheckpoint, IngestionStatus};

use crate::error::Result;

use super::stage::Stage;
use super::state::PipelineState;

pub struct PipelineDriver {
    checkpoints: Arc<dyn CheckpointStore>,
    stages: Vec<Arc<dyn Stage>>,
}

impl PipelineDriver {
    /// Stages run in the order given — conventionally AST, Extraction,
    /// GraphWrite, VectorSync.
    pub fn new(checkpoints: Arc<dyn CheckpointStore>, stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { checkpoints, stages }
    }

    /// Runs one ingestion thread to completion (or first unresolved
    /// failure), checkpointing per-file progress after every stage.
    pub async fn run(&self, thread_id: &str, all_paths: Vec<String>, is_source: impl Fn(&str) -> bool) -> Result<IngestionStatus> {
        let mut checkpoint = match self.checkpoints.load_checkpoint(thread_id).await? {
            Some(existing) => existing,
            None => IngestionCheckpoint::seed(all_paths.clone(), is_source),
        };
        self.checkpoints.save_checkpoint(thread_id, &checkpoint).await?;

        let mut status = match self.checkpoints.load_status(thread_id).await? {
            Some(existing) if existing.resumable() => existing,
            _ => IngestionStatus::new(thread_id, all_paths.len()),
        };
        self.checkpoints.save_status(&status).await?;

        let pending = checkpoint.pending_paths();
        let mut state = PipelineState::seeded(pending.clone());

        for stage in &self.stages {
            match stage.run(state.clone()).await {
                Ok(next) => {
                    state = next;
                    for path in &pending {
                        checkpoint.mark(path, FileStatus::Extracted);
                    }
                }
                Err(err) => {
                    for path in &pending {
                        checkpoint.mark(path, FileStatus::Failed);
                    }
                    status.fail(err.to_string());
                    self.checkpoints.save_checkpoint(thread_id, &checkpoint).await?;
                    self.checkpoints.save_status(&status).await?;
                    return Err(err);
                }
            }
            self.checkpoints.save_checkpoint(thread_id, &checkpoint).await?;
        }

        status.processed_files = all_paths.len() - checkpoint.pending_paths().len();
        if checkpoint.all_done() {
            status.complete();
        }
        self.checkpoints.save_status(&status).await?;

        Ok(status)
    }

    pub async fn retry_failed(&self, thread_id: &str) -> Result<()> {
        if let Some(mut checkpoint) = self.checkpoints.load_checkpoint(thread_id).await? {
            checkpoint.retry_failed();
            self.checkpoints.save_checkpoint(thread_id, &checkpoint).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use graphrag_checkpoint::InMemoryCheckpointStore;

    struct NoopStage;
    #[async_trait]
    impl Stage for NoopStage {
        async fn run(&self, state: PipelineState) -> Result<PipelineState> {
            Ok(state)
        }
        async fn healthcheck(&self) -> bool {
            true
        }
    }

    struct FailingStage;
    #[async_trait]
    impl Stage for FailingStage {
        async fn run(&self, _state: PipelineState) -> Result<PipelineState> {
            Err(crate::error::CoreError::Transient("stage boom".into()))
        }
        async fn healthcheck(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn successful_run_marks_all_done() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let driver = PipelineDriver::new(checkpoints.clone(), vec![Arc::new(NoopStage)]);
        let status = driver
            .run("thread-1", vec!["a.rs".to_string(), "readme.md".to_string()], |p| p.ends_with(".rs"))
            .await
            .unwrap();

        assert_eq!(status.state, graphrag_checkpoint::RunState::Completed);
        let checkpoint = checkpoints.load_checkpoint("thread-1").await.unwrap().unwrap();
        assert!(checkpoint.all_done());
    }

    #[tokio::test]
    async fn failing_stage_marks_failed_and_is_retryable() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let driver = PipelineDriver::new(checkpoints.clone(), vec![Arc::new(FailingStage)]);
        let result = driver.run("thread-2", vec!["a.rs".to_string()], |_| true).await;
        assert!(result.is_err());

        let checkpoint = checkpoints.load_checkpoint("thread-2").await.unwrap().unwrap();
        assert_eq!(checkpoint.status("a.rs"), Some(FileStatus::Failed));

        driver.retry_failed("thread-2").await.unwrap();
        let checkpoint = checkpoints.load_checkpoint("thread-2").await.unwrap().unwrap();
        assert_eq!(checkpoint.status("a.rs"), Some(FileStatus::Pending));
    }
}
