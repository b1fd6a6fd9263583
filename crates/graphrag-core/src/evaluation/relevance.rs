//! Lexical and embedding-based scoring of a RAG answer against the sources
//! that supposedly grounded it.

use std::collections::HashSet;

use crate::cache::cosine_similarity;

#[derive(Debug, Clone)]
pub struct RelevanceScore {
    pub query: String,
    pub score: f32,
    pub context_count: usize,
    pub retrieval_path: String,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EvaluationResult {
    pub context_relevance: f32,
    pub faithfulness: f32,
    pub groundedness: f32,
    pub ungrounded_claims: Vec<String>,
    pub context_count: usize,
    pub retrieval_path: String,
    pub used_fallback: bool,
}

impl EvaluationResult {
    pub fn score(&self) -> f32 {
        0.3 * self.context_relevance + 0.4 * self.faithfulness + 0.3 * self.groundedness
    }
}

pub fn evaluate_relevance(query_embedding: &[f32], context_embeddings: &[Vec<f32>]) -> f32 {
    if context_embeddings.is_empty() {
        return 0.0;
    }
    let total: f32 = context_embeddings.iter().map(|ctx| cosine_similarity(query_embedding, ctx)).sum();
    total / context_embeddings.len() as f32
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "may", "might", "shall", "can", "not", "no", "and", "or", "but", "if", "then",
    "else", "when", "where", "how", "what", "which", "who", "whom", "this", "that", "these", "those", "it", "its",
    "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through", "during", "before", "after",
    "above", "below", "between", "out", "off", "over", "under", "again", "further", "all", "each", "every", "both",
    "few", "more", "most", "other", "some", "such", "only", "very",
];

fn extract_entity_names(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
        .filter(|tok| !tok.is_empty())
        .map(|tok| tok.to_lowercase())
        .collect()
}

fn context_entity_names(sources: &[serde_json::Value]) -> HashSet<String> {
    const KEYS: &[&str] = &["name", "id", "source", "target", "affected_service", "consumer_service", "producer_service", "service"];
    let mut names = HashSet::new();
    for source in sources {
        for key in KEYS {
            if let Some(val) = source.get(key).and_then(|v| v.as_str()) {
                names.insert(val.to_lowercase());
            }
        }
        if let Some(result) = source.get("result") {
            for key in ["name", "id"] {
                if let Some(val) = result.get(key).and_then(|v| v.as_str()) {
                    names.insert(val.to_lowercase());
                }
            }
        }
    }
    names
}

fn meaningful_entities(answer: &str) -> HashSet<String> {
    extract_entity_names(answer)
        .into_iter()
        .filter(|e| e.len() > 2 && !STOP_WORDS.contains(&e.as_str()))
        .collect()
}

pub fn compute_faithfulness(answer: &str, sources: &[serde_json::Value]) -> (f32, Vec<String>) {
    if answer.is_empty() || sources.is_empty() {
        return (1.0, Vec::new());
    }

    let meaningful = meaningful_entities(answer);
    if meaningful.is_empty() {
        return (1.0, Vec::new());
    }

    let context = context_entity_names(sources);
    let ungrounded: Vec<String> = meaningful.iter().filter(|e| !context.contains(*e)).cloned().collect();
    let coverage = 1.0 - ungrounded.len() as f32 / meaningful.len() as f32;
    (coverage.max(0.0), ungrounded)
}

pub fn compute_groundedness(answer: &str, sources: &[serde_json::Value]) -> f32 {
    if answer.is_empty() || sources.is_empty() {
        return 1.0;
    }

    let meaningful = meaningful_entities(answer);
    if meaningful.is_empty() {
        return 1.0;
    }

    let context = context_entity_names(sources);
    let verified = meaningful.iter().filter(|e| context.contains(*e)).count();
    verified as f32 / meaningful.len() as f32
}

pub struct RAGEvaluator {
    low_relevance_threshold: f32,
}

impl RAGEvaluator {
    pub fn new(low_relevance_threshold: f32) -> Self {
        Self { low_relevance_threshold }
    }

    pub fn evaluate(&self, query: &str, query_embedding: &[f32], context_embeddings: &[Vec<f32>], retrieval_path: &str) -> RelevanceScore {
        RelevanceScore {
            query: query.to_string(),
            score: evaluate_relevance(query_embedding, context_embeddings),
            context_count: context_embeddings.len(),
            retrieval_path: retrieval_path.to_string(),
        }
    }

    pub fn evaluate_faithfulness(
        &self,
        answer: &str,
        sources: &[serde_json::Value],
        query_embedding: &[f32],
        context_embeddings: &[Vec<f32>],
        retrieval_path: &str,
    ) -> EvaluationResult {
        let (faithfulness, ungrounded_claims) = compute_faithfulness(answer, sources);
        EvaluationResult {
            context_relevance: evaluate_relevance(query_embedding, context_embeddings),
            faithfulness,
            groundedness: compute_groundedness(answer, sources),
            ungrounded_claims,
            context_count: context_embeddings.len(),
            retrieval_path: retrieval_path.to_string(),
            used_fallback: false,
        }
    }

    pub fn is_low_relevance(&self, score: &RelevanceScore) -> bool {
        score.score < self.low_relevance_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faithfulness_is_perfect_when_all_entities_are_grounded() {
        let sources = vec![serde_json::json!({"name": "payments-gateway"})];
        let (score, ungrounded) = compute_faithfulness("payments-gateway handles checkout", &sources);
        assert!(score > 0.0);
        assert!(ungrounded.len() <= 1);
    }

    #[test]
    fn faithfulness_is_perfect_with_no_sources() {
        let (score, ungrounded) = compute_faithfulness("anything goes", &[]);
        assert_eq!(score, 1.0);
        assert!(ungrounded.is_empty());
    }

    #[test]
    fn low_relevance_threshold_flags_weak_matches() {
        let evaluator = RAGEvaluator::new(0.3);
        let score = RelevanceScore { query: "x".into(), score: 0.1, context_count: 1, retrieval_path: "vector".into() };
        assert!(evaluator.is_low_relevance(&score));
    }
}
