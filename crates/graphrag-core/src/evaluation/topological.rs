//! Scores an answer's claimed edges against the graph itself, independent
//! of lexical overlap: an answer can read as faithful to its sources and
//! still reference an edge that was never actually committed.

use async_trait::async_trait;

use crate::error::Result;

#[async_trait]
pub trait EdgeVerifier: Send + Sync {
    /// Returns how many of the claimed edge ids actually exist.
    async fn verify_edges(&self, edge_ids: &[String]) -> Result<usize>;
}

#[async_trait]
pub trait PathChecker: Send + Sync {
    async fn check_path_reachability(&self, start_node: &str, end_node: &str, max_hops: u32) -> Result<bool>;
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TopologicalScore {
    pub edge_existence_ratio: f32,
    pub path_reachable: Option<bool>,
    pub composite_score: f32,
    pub is_hallucinated: bool,
    pub claimed_edges: usize,
    pub verified_edges: usize,
}

pub struct TopologicalEvaluator {
    edge_verifier: std::sync::Arc<dyn EdgeVerifier>,
    path_checker: Option<std::sync::Arc<dyn PathChecker>>,
    alpha: f32,
    topo_threshold: f32,
    max_hops: u32,
}

impl TopologicalEvaluator {
    pub fn new(edge_verifier: std::sync::Arc<dyn EdgeVerifier>, path_checker: Option<std::sync::Arc<dyn PathChecker>>) -> Self {
        Self { edge_verifier, path_checker, alpha: 0.6, topo_threshold: 0.3, max_hops: 5 }
    }

    pub fn with_thresholds(mut self, alpha: f32, topo_threshold: f32, max_hops: u32) -> Self {
        self.alpha = alpha;
        self.topo_threshold = topo_threshold;
        self.max_hops = max_hops;
        self
    }

    pub async fn evaluate_topology(
        &self,
        claimed_edge_ids: &[String],
        start_node: Option<&str>,
        end_node: Option<&str>,
        vector_score: f32,
    ) -> Result<TopologicalScore> {
        let (edge_ratio, verified) = if claimed_edge_ids.is_empty() {
            (0.0, 0)
        } else {
            let verified = self.edge_verifier.verify_edges(claimed_edge_ids).await?;
            (verified as f32 / claimed_edge_ids.len() as f32, verified)
        };

        let path_reachable = match (start_node, end_node, &self.path_checker) {
            (Some(start), Some(end), Some(checker)) => Some(checker.check_path_reachability(start, end, self.max_hops).await?),
            _ => None,
        };

        let path_score = if path_reachable == Some(true) { 1.0 } else { 0.0 };
        let topo_score = match path_reachable {
            Some(_) => (edge_ratio + path_score) / 2.0,
            None => edge_ratio,
        };

        let composite = self.alpha * vector_score + (1.0 - self.alpha) * topo_score;

        Ok(TopologicalScore {
            edge_existence_ratio: edge_ratio,
            path_reachable,
            composite_score: composite,
            is_hallucinated: topo_score < self.topo_threshold,
            claimed_edges: claimed_edge_ids.len(),
            verified_edges: verified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AllVerified;
    #[async_trait]
    impl EdgeVerifier for AllVerified {
        async fn verify_edges(&self, edge_ids: &[String]) -> Result<usize> {
            Ok(edge_ids.len())
        }
    }

    struct NoneVerified;
    #[async_trait]
    impl EdgeVerifier for NoneVerified {
        async fn verify_edges(&self, _edge_ids: &[String]) -> Result<usize> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn fully_verified_edges_are_not_hallucinated() {
        let evaluator = TopologicalEvaluator::new(std::sync::Arc::new(AllVerified), None);
        let score = evaluator.evaluate_topology(&["e1".into(), "e2".into()], None, None, 0.8).await.unwrap();
        assert_eq!(score.edge_existence_ratio, 1.0);
        assert!(!score.is_hallucinated);
    }

    #[tokio::test]
    async fn unverifiable_edges_are_flagged_hallucinated() {
        let evaluator = TopologicalEvaluator::new(std::sync::Arc::new(NoneVerified), None);
        let score = evaluator.evaluate_topology(&["e1".into()], None, None, 0.9).await.unwrap();
        assert_eq!(score.edge_existence_ratio, 0.0);
        assert!(score.is_hallucinated);
    }
}
