//! Periodic, adaptive-batch physical removal of expired tombstoned edges.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Notify;

use crate::error::Result;

/// Capability interface for the graph backend the reaper physically
/// deletes expired tombstones against.
#[async_trait]
pub trait TombstoneStore: Send + Sync {
    /// Deletes up to `batch_size` edges tombstoned before `cutoff` for
    /// `tenant_id` and returns how many were actually removed.
    async fn reap_tombstone_batch(&self, batch_size: usize, cutoff: DateTime<Utc>, tenant_id: &str) -> Result<usize>;

    async fn count_pending_tombstones(&self, tenant_id: &str) -> Result<u64>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReaperMetrics {
    pub reaped_total: u64,
    pub pending: u64,
    pub last_effective_batch: usize,
}

pub struct TombstoneReaper {
    store: Arc<dyn TombstoneStore>,
    tenant_id: String,
    ttl_days: i64,
    batch_size: usize,
    max_batch_size: usize,
    interval: Duration,
    reaped_total: AtomicU64,
    pending: AtomicU64,
    last_effective_batch: std::sync::atomic::AtomicUsize,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl TombstoneReaper {
    pub fn new(
        store: Arc<dyn TombstoneStore>,
        tenant_id: impl Into<String>,
        ttl_days: i64,
        batch_size: usize,
        max_batch_size: usize,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            tenant_id: tenant_id.into(),
            ttl_days,
            batch_size,
            max_batch_size,
            interval,
            reaped_total: AtomicU64::new(0),
            pending: AtomicU64::new(0),
            last_effective_batch: std::sync::atomic::AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Idempotent: calling `stop` more than once is safe.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    pub async fn run(&self) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }

            tokio::select! {
                _ = self.stop_notify.notified() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Err(err) = self.run_cycle().await {
                tracing::error!(error = %err, tenant_id = %self.tenant_id, "tombstone reap cycle failed, continuing on next interval");
            }
        }
    }

    /// One reap cycle: doubles `batch_size` after every full batch up to
    /// `max_batch_size`, stopping once a batch returns fewer rows than it
    /// asked for.
    pub async fn run_cycle(&self) -> Result<()> {
        let cutoff = Utc::now() - chrono::Duration::days(self.ttl_days);
        let mut effective_batch = self.batch_size;
        let mut cycle_reaped = 0u64;

        loop {
            let reaped = self.store.reap_tombstone_batch(effective_batch, cutoff, &self.tenant_id).await?;
            cycle_reaped += reaped as u64;

            if reaped < effective_batch {
                break;
            }
            effective_batch = (effective_batch * 2).min(self.max_batch_size);
        }

        self.reaped_total.fetch_add(cycle_reaped, Ordering::AcqRel);
        self.last_effective_batch.store(effective_batch, Ordering::Release);

        let pending = self.store.count_pending_tombstones(&self.tenant_id).await?;
        self.pending.store(pending, Ordering::Release);

        Ok(())
    }

    pub fn metrics(&self) -> ReaperMetrics {
        ReaperMetrics {
            reaped_total: self.reaped_total.load(Ordering::Acquire),
            pending: self.pending.load(Ordering::Acquire),
            last_effective_batch: self.last_effective_batch.load(Ordering::Acquire),
        }
    }
}
