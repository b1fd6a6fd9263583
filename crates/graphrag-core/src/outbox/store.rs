//! Durable event log backing the vector-index deletion path.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::model::{OutboxEvent, OutboxStatus};

/// A transaction handle a caller already holds, passed to `write_in_tx` so
/// the outbox row lands in the same transaction as the graph-entity write
/// that preceded it. `InMemory` is a no-op handle for the in-process store,
/// which has no transaction to join.
pub enum OutboxTx<'a> {
    Postgres(&'a mut sqlx::Transaction<'a, sqlx::Postgres>),
    InMemory,
}

/// Persistence contract for outbox events. A write-after-tx call happens
/// once the graph commit has already landed; its failure must surface to
/// the caller without rolling that commit back.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn write_event(&self, event: OutboxEvent) -> Result<()>;

    async fn write_after_tx(&self, events: Vec<OutboxEvent>) -> Result<()>;

    /// Writes `event` inside a transaction the caller already holds, so the
    /// event and the graph-entity write it accompanies land atomically or
    /// not at all. Distinct from `write_after_tx`, which opens its own
    /// transaction once the caller's has already committed.
    async fn write_in_tx(&self, tx: &mut OutboxTx<'_>, event: OutboxEvent) -> Result<()>;

    async fn load_pending(&self) -> Result<Vec<OutboxEvent>>;

    /// Atomically claims up to `limit` events eligible for work (pending, or
    /// claimed with an expired lease), stamping `claimed_by` and a new
    /// `claim_expires_at`.
    async fn claim_pending(&self, worker_id: &str, limit: usize, lease_seconds: i64) -> Result<Vec<OutboxEvent>>;

    async fn mark_completed(&self, event_id: Uuid) -> Result<()>;

    async fn release_claim(&self, event_id: Uuid) -> Result<()>;

    /// Releases every claim whose lease has expired back to `pending`.
    async fn release_expired_claims(&self) -> Result<usize>;

    async fn delete_event(&self, event_id: Uuid) -> Result<()>;

    async fn update_retry_count(&self, event_id: Uuid, retry_count: u32) -> Result<()>;
}

/// Atomicity contract tying a graph commit to its outbox events: the graph
/// write happens first; if it succeeds and `events` is non-empty, the
/// events are appended via `write_after_tx`. A missing outbox store still
/// lets the entity write proceed — outbox delivery is additive, not a
/// prerequisite for the commit.
pub async fn commit_topology_with_outbox<F, Fut>(
    commit_entities: F,
    outbox: Option<&dyn OutboxStore>,
    events: Vec<OutboxEvent>,
) -> Result<()>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    commit_entities().await?;

    if events.is_empty() {
        return Ok(());
    }

    match outbox {
        Some(store) => store.write_after_tx(events).await,
        None => Ok(()),
    }
}

/// In-process store for development and tests.
pub struct InMemoryOutboxStore {
    events: tokio::sync::Mutex<std::collections::HashMap<Uuid, OutboxEvent>>,
}

impl InMemoryOutboxStore {
    pub fn new() -> Self {
        Self {
            events: tokio::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryOutboxStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn write_event(&self, event: OutboxEvent) -> Result<()> {
        self.events.lock().await.insert(event.event_id, event);
        Ok(())
    }

    async fn write_after_tx(&self, events: Vec<OutboxEvent>) -> Result<()> {
        let mut guard = self.events.lock().await;
        for event in events {
            guard.insert(event.event_id, event);
        }
        Ok(())
    }

    async fn write_in_tx(&self, _tx: &mut OutboxTx<'_>, event: OutboxEvent) -> Result<()> {
        self.events.lock().await.insert(event.event_id, event);
        Ok(())
    }

    async fn load_pending(&self) -> Result<Vec<OutboxEvent>> {
        Ok(self
            .events
            .lock()
            .await
            .values()
            .filter(|e| e.status == OutboxStatus::Pending)
            .cloned()
            .collect())
    }

    async fn claim_pending(&self, worker_id: &str, limit: usize, lease_seconds: i64) -> Result<Vec<OutboxEvent>> {
        let now = Utc::now();
        let mut guard = self.events.lock().await;
        let mut claimed = Vec::new();

        let eligible: Vec<Uuid> = guard
            .values()
            .filter(|e| {
                e.status == OutboxStatus::Pending
                    || (e.status == OutboxStatus::Claimed
                        && e.claim_expires_at.map(|exp| exp < now).unwrap_or(false))
            })
            .take(limit)
            .map(|e| e.event_id)
            .collect();

        for id in eligible {
            if let Some(event) = guard.get_mut(&id) {
                event.status = OutboxStatus::Claimed;
                event.claimed_by = Some(worker_id.to_string());
                event.claim_expires_at = Some(now + chrono::Duration::seconds(lease_seconds));
                claimed.push(event.clone());
            }
        }

        Ok(claimed)
    }

    async fn mark_completed(&self, event_id: Uuid) -> Result<()> {
        self.events.lock().await.remove(&event_id);
        Ok(())
    }

    async fn release_claim(&self, event_id: Uuid) -> Result<()> {
        if let Some(event) = self.events.lock().await.get_mut(&event_id) {
            event.status = OutboxStatus::Pending;
            event.claimed_by = None;
            event.claim_expires_at = None;
        }
        Ok(())
    }

    async fn release_expired_claims(&self) -> Result<usize> {
        let now = Utc::now();
        let mut guard = self.events.lock().await;
        let mut released = 0;
        for event in guard.values_mut() {
            if event.status == OutboxStatus::Claimed
                && event.claim_expires_at.map(|exp| exp < now).unwrap_or(false)
            {
                event.status = OutboxStatus::Pending;
                event.claimed_by = None;
                event.claim_expires_at = None;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<()> {
        self.events.lock().await.remove(&event_id);
        Ok(())
    }

    async fn update_retry_count(&self, event_id: Uuid, retry_count: u32) -> Result<()> {
        if let Some(event) = self.events.lock().await.get_mut(&event_id) {
            event.retry_count = retry_count;
        }
        Ok(())
    }
}

/// Convenience accessor used by tests and the drainer to inspect event
/// state without going through the trait's coarser `load_pending`.
impl InMemoryOutboxStore {
    pub async fn get(&self, event_id: Uuid) -> Option<OutboxEvent> {
        self.events.lock().await.get(&event_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    event_id: Uuid,
    collection: String,
    operation: String,
    pruned_ids: serde_json::Value,
    vectors: Option<serde_json::Value>,
    status: String,
    retry_count: i32,
    claimed_by: Option<String>,
    claim_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = crate::error::CoreError;

    fn try_from(row: OutboxRow) -> Result<Self> {
        let operation = match row.operation.as_str() {
            "upsert" => crate::model::OutboxOperation::Upsert,
            "delete" => crate::model::OutboxOperation::Delete,
            other => return Err(crate::error::CoreError::Storage(format!("unknown operation {other}"))),
        };
        let status = match row.status.as_str() {
            "pending" => OutboxStatus::Pending,
            "claimed" => OutboxStatus::Claimed,
            "completed" => OutboxStatus::Completed,
            other => return Err(crate::error::CoreError::Storage(format!("unknown status {other}"))),
        };
        let pruned_ids = serde_json::from_value(row.pruned_ids)?;

        Ok(OutboxEvent {
            event_id: row.event_id,
            collection: row.collection,
            operation,
            pruned_ids,
            vectors: row.vectors,
            status,
            retry_count: row.retry_count.max(0) as u32,
            claimed_by: row.claimed_by,
            claim_expires_at: row.claim_expires_at,
        })
    }
}

/// Postgres-backed durable store; `claim_pending` runs as a single
/// transaction so concurrent drainer workers never double-claim a row.
pub struct PostgresOutboxStore {
    pool: sqlx::PgPool,
}

impl PostgresOutboxStore {
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(dsn)
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OutboxStore for PostgresOutboxStore {
    async fn write_event(&self, event: OutboxEvent) -> Result<()> {
        self.write_after_tx(vec![event]).await
    }

    async fn write_after_tx(&self, events: Vec<OutboxEvent>) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;

        for event in events {
            let operation = match event.operation {
                crate::model::OutboxOperation::Upsert => "upsert",
                crate::model::OutboxOperation::Delete => "delete",
            };
            sqlx::query(
                "INSERT INTO outbox_events
                 (event_id, collection, operation, pruned_ids, vectors, status, retry_count, claimed_by, claim_expires_at)
                 VALUES ($1, $2, $3, $4, $5, 'pending', 0, NULL, NULL)",
            )
            .bind(event.event_id)
            .bind(&event.collection)
            .bind(operation)
            .bind(serde_json::to_value(&event.pruned_ids)?)
            .bind(&event.vectors)
            .execute(&mut *tx)
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn write_in_tx(&self, tx: &mut OutboxTx<'_>, event: OutboxEvent) -> Result<()> {
        let OutboxTx::Postgres(pg_tx) = tx else {
            return Err(crate::error::CoreError::Storage(
                "write_in_tx on PostgresOutboxStore requires an OutboxTx::Postgres handle".to_string(),
            ));
        };

        let operation = match event.operation {
            crate::model::OutboxOperation::Upsert => "upsert",
            crate::model::OutboxOperation::Delete => "delete",
        };
        sqlx::query(
            "INSERT INTO outbox_events
             (event_id, collection, operation, pruned_ids, vectors, status, retry_count, claimed_by, claim_expires_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', 0, NULL, NULL)",
        )
        .bind(event.event_id)
        .bind(&event.collection)
        .bind(operation)
        .bind(serde_json::to_value(&event.pruned_ids)?)
        .bind(&event.vectors)
        .execute(&mut **pg_tx)
        .await
        .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn load_pending(&self) -> Result<Vec<OutboxEvent>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT event_id, collection, operation, pruned_ids, vectors, status, retry_count, claimed_by, claim_expires_at
             FROM outbox_events WHERE status = 'pending'",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;

        rows.into_iter().map(OutboxEvent::try_from).collect()
    }

    async fn claim_pending(&self, worker_id: &str, limit: usize, lease_seconds: i64) -> Result<Vec<OutboxEvent>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;

        let rows: Vec<OutboxRow> = sqlx::query_as(
            "SELECT event_id, collection, operation, pruned_ids, vectors, status, retry_count, claimed_by, claim_expires_at
             FROM outbox_events
             WHERE status = 'pending' OR (status = 'claimed' AND claim_expires_at < now())
             ORDER BY event_id
             LIMIT $1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(limit as i64)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;

        let lease_expiry = Utc::now() + chrono::Duration::seconds(lease_seconds);
        let mut claimed = Vec::with_capacity(rows.len());
        for row in rows {
            sqlx::query(
                "UPDATE outbox_events SET status = 'claimed', claimed_by = $1, claim_expires_at = $2 WHERE event_id = $3",
            )
            .bind(worker_id)
            .bind(lease_expiry)
            .bind(row.event_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;

            let mut event = OutboxEvent::try_from(row)?;
            event.status = OutboxStatus::Claimed;
            event.claimed_by = Some(worker_id.to_string());
            event.claim_expires_at = Some(lease_expiry);
            claimed.push(event);
        }

        tx.commit().await.map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        Ok(claimed)
    }

    async fn mark_completed(&self, event_id: Uuid) -> Result<()> {
        self.delete_event(event_id).await
    }

    async fn release_claim(&self, event_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE outbox_events SET status = 'pending', claimed_by = NULL, claim_expires_at = NULL WHERE event_id = $1",
        )
        .bind(event_id)
        .execute(&self.pool)
        .await
        .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn release_expired_claims(&self) -> Result<usize> {
        let result = sqlx::query(
            "UPDATE outbox_events SET status = 'pending', claimed_by = NULL, claim_expires_at = NULL
             WHERE status = 'claimed' AND claim_expires_at < now()",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        Ok(result.rows_affected() as usize)
    }

    async fn delete_event(&self, event_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM outbox_events WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn update_retry_count(&self, event_id: Uuid, retry_count: u32) -> Result<()> {
        sqlx::query("UPDATE outbox_events SET retry_count = $1 WHERE event_id = $2")
            .bind(retry_count as i32)
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutboxOperation;

    #[tokio::test]
    async fn write_after_tx_then_load_pending_round_trips() {
        let store = InMemoryOutboxStore::new();
        let event = OutboxEvent::new("svc", OutboxOperation::Delete, vec!["id-1".to_string()]);
        store.write_after_tx(vec![event.clone()]).await.unwrap();

        let pending = store.load_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, event.event_id);
    }

    #[tokio::test]
    async fn write_in_tx_lands_in_memory_store_like_any_other_write() {
        let store = InMemoryOutboxStore::new();
        let event = OutboxEvent::new("svc", OutboxOperation::Delete, vec!["id-1".to_string()]);
        store.write_in_tx(&mut OutboxTx::InMemory, event.clone()).await.unwrap();

        assert_eq!(store.get(event.event_id).await.unwrap().event_id, event.event_id);
    }

    #[tokio::test]
    async fn claim_pending_marks_claimed_and_hides_from_other_workers() {
        let store = InMemoryOutboxStore::new();
        let event = OutboxEvent::new("svc", OutboxOperation::Delete, vec!["id-1".to_string()]);
        store.write_event(event.clone()).await.unwrap();

        let claimed = store.claim_pending("worker-a", 10, 60).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].claimed_by, Some("worker-a".to_string()));

        let again = store.claim_pending("worker-b", 10, 60).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn expired_claim_is_reclaimable() {
        let store = InMemoryOutboxStore::new();
        let event = OutboxEvent::new("svc", OutboxOperation::Delete, vec!["id-1".to_string()]);
        store.write_event(event.clone()).await.unwrap();

        store.claim_pending("worker-a", 10, -1).await.unwrap();
        let reclaimed = store.claim_pending("worker-b", 10, 60).await.unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].claimed_by, Some("worker-b".to_string()));
    }

    #[tokio::test]
    async fn release_expired_claims_returns_to_pending() {
        let store = InMemoryOutboxStore::new();
        let event = OutboxEvent::new("svc", OutboxOperation::Delete, vec!["id-1".to_string()]);
        store.write_event(event.clone()).await.unwrap();
        store.claim_pending("worker-a", 10, -1).await.unwrap();

        let released = store.release_expired_claims().await.unwrap();
        assert_eq!(released, 1);
        let pending = store.load_pending().await.unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn commit_with_no_outbox_store_still_commits_entities() {
        let committed = std::sync::atomic::AtomicBool::new(false);
        commit_topology_with_outbox(
            || async {
                committed.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            },
            None,
            vec![],
        )
        .await
        .unwrap();
        assert!(committed.load(std::sync::atomic::Ordering::SeqCst));
    }
}
