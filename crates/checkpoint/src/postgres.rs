//! PostgreSQL-backed checkpoint storage for production ingestion runs.
//!
//! Selected via `CHECKPOINT_BACKEND=postgres`. Uses runtime-bound queries
//! (not the `sqlx::query!` compile-time macros) since this crate must build
//! without a live database available.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{CheckpointError, Result};
use crate::model::{IngestionCheckpoint, IngestionStatus, RunState};
use crate::store::CheckpointStore;

pub struct PostgresCheckpointStore {
    pool: PgPool,
}

impl PostgresCheckpointStore {
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPool::connect(dsn)
            .await
            .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingestion_checkpoints (
                thread_id TEXT PRIMARY KEY,
                checkpoint_id UUID NOT NULL,
                files JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ingestion_status (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                total_files BIGINT NOT NULL,
                processed_files BIGINT NOT NULL,
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL,
                completed_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn save_checkpoint(&self, thread_id: &str, checkpoint: &IngestionCheckpoint) -> Result<()> {
        let files = serde_json::to_value(&checkpoint.files)?;
        sqlx::query(
            r#"
            INSERT INTO ingestion_checkpoints (thread_id, checkpoint_id, files)
            VALUES ($1, $2, $3)
            ON CONFLICT (thread_id) DO UPDATE SET checkpoint_id = $2, files = $3
            "#,
        )
        .bind(thread_id)
        .bind(checkpoint.checkpoint_id)
        .bind(files)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn load_checkpoint(&self, thread_id: &str) -> Result<Option<IngestionCheckpoint>> {
        let row: Option<(uuid::Uuid, serde_json::Value)> = sqlx::query_as(
            "SELECT checkpoint_id, files FROM ingestion_checkpoints WHERE thread_id = $1",
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        match row {
            Some((checkpoint_id, files)) => {
                let files = serde_json::from_value(files)?;
                Ok(Some(IngestionCheckpoint {
                    checkpoint_id,
                    files,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_status(&self, status: &IngestionStatus) -> Result<()> {
        let state = match status.state {
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        sqlx::query(
            r#"
            INSERT INTO ingestion_status
                (thread_id, state, total_files, processed_files, error, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (thread_id) DO UPDATE SET
                state = $2, total_files = $3, processed_files = $4,
                error = $5, completed_at = $7
            "#,
        )
        .bind(&status.thread_id)
        .bind(state)
        .bind(status.total_files as i64)
        .bind(status.processed_files as i64)
        .bind(&status.error)
        .bind(status.created_at)
        .bind(status.completed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn load_status(&self, thread_id: &str) -> Result<Option<IngestionStatus>> {
        let row: Option<(
            String,
            i64,
            i64,
            Option<String>,
            chrono::DateTime<chrono::Utc>,
            Option<chrono::DateTime<chrono::Utc>>,
        )> = sqlx::query_as(
            r#"
            SELECT state, total_files, processed_files, error, created_at, completed_at
            FROM ingestion_status WHERE thread_id = $1
            "#,
        )
        .bind(thread_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CheckpointError::Storage(e.to_string()))?;

        Ok(row.map(
            |(state, total_files, processed_files, error, created_at, completed_at)| {
                let state = match state.as_str() {
                    "completed" => RunState::Completed,
                    "failed" => RunState::Failed,
                    _ => RunState::Running,
                };
                IngestionStatus {
                    thread_id: thread_id.to_string(),
                    state,
                    total_files: total_files as usize,
                    processed_files: processed_files as usize,
                    error,
                    created_at,
                    completed_at,
                }
            },
        ))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}
