//! Query-time tombstone filtering: strips candidates whose outbound edges
//! carry a `tombstoned_at` marker before they reach the caller, independent
//! of whether the reaper has physically removed them yet.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::Result;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(flatten)]
    pub attributes: serde_json::Value,
}

/// Capability interface over whatever graph backend can answer "does this
/// node have a tombstoned outbound edge".
#[async_trait]
pub trait TombstoneChecker: Send + Sync {
    async fn check_tombstoned_nodes(&self, node_ids: &[String], tenant_id: &str) -> Result<HashSet<String>>;
}

pub async fn filter_tombstoned_results(
    checker: &dyn TombstoneChecker,
    candidates: Vec<Candidate>,
    tenant_id: &str,
) -> Result<Vec<Candidate>> {
    if candidates.is_empty() {
        return Ok(candidates);
    }

    let node_ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
    let tombstoned = checker.check_tombstoned_nodes(&node_ids, tenant_id).await?;
    if tombstoned.is_empty() {
        return Ok(candidates);
    }

    Ok(candidates.into_iter().filter(|c| !tombstoned.contains(&c.id)).collect())
}
