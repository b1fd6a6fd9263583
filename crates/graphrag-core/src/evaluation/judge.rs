//! LLM-as-judge faithfulness scoring with a defensive parser: free text
//! from a judge model rarely comes back as pure JSON, so the first
//! balanced object is extracted and validated before falling back to the
//! lexical heuristics in [`super::relevance`].

use async_trait::async_trait;

use crate::error::Result;

use super::relevance::{compute_faithfulness, compute_groundedness, evaluate_relevance, EvaluationResult};

const JUDGE_PROMPT_TEMPLATE: &str = "You are an expert evaluator for a Retrieval-Augmented Generation system.\n\
Given a QUERY, an ANSWER, and SOURCE CONTEXT, evaluate:\n\
1. faithfulness: Does the answer only contain claims supported by sources? (0.0-1.0)\n\
2. groundedness: What fraction of entities in the answer appear in sources? (0.0-1.0)\n\n\
QUERY: {query}\n\n\
ANSWER: {answer}\n\n\
SOURCES:\n{sources}\n\n\
Respond ONLY with a JSON object: {{\"faithfulness\": <float>, \"groundedness\": <float>}}";

/// Scans `text` for the first balanced `{...}` span and parses it as JSON.
/// Returns `None` if no balanced object is found or it doesn't parse.
pub fn extract_first_json_object(text: &str) -> Option<serde_json::Value> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let ch = byte as char;
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return serde_json::from_str(&text[start..end]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[async_trait]
pub trait JudgeModel: Send + Sync {
    async fn judge(&self, prompt: &str) -> Result<String>;
}

pub struct LLMJudge {
    model: std::sync::Arc<dyn JudgeModel>,
}

impl LLMJudge {
    pub fn new(model: std::sync::Arc<dyn JudgeModel>) -> Self {
        Self { model }
    }

    pub async fn evaluate(
        &self,
        query: &str,
        answer: &str,
        sources: &[serde_json::Value],
        query_embedding: Option<&[f32]>,
        context_embeddings: Option<&[Vec<f32>]>,
    ) -> Result<EvaluationResult> {
        let sources_text = serde_json::to_string_pretty(sources).unwrap_or_default();
        let sources_text: String = sources_text.chars().take(4000).collect();
        let prompt = JUDGE_PROMPT_TEMPLATE
            .replace("{query}", query)
            .replace("{answer}", answer)
            .replace("{sources}", &sources_text);

        let raw_response = self.model.judge(&prompt).await?;

        let parsed = extract_first_json_object(&raw_response);
        let (faithfulness, groundedness, used_fallback) = match parsed {
            Some(scores) => {
                let faithfulness = scores.get("faithfulness").and_then(|v| v.as_f64()).map(|v| v as f32);
                let groundedness = scores.get("groundedness").and_then(|v| v.as_f64()).map(|v| v as f32);
                match (faithfulness, groundedness) {
                    (Some(f), Some(g)) => (f, g, false),
                    _ => {
                        tracing::warn!("judge JSON missing expected fields, using lexical fallback");
                        let (f, _) = compute_faithfulness(answer, sources);
                        (f, compute_groundedness(answer, sources), true)
                    }
                }
            }
            None => {
                tracing::warn!("judge returned unparseable response, using lexical fallback");
                let (f, _) = compute_faithfulness(answer, sources);
                (f, compute_groundedness(answer, sources), true)
            }
        };

        let (_, ungrounded_claims) = compute_faithfulness(answer, sources);

        let context_relevance = match (query_embedding, context_embeddings) {
            (Some(q), Some(c)) => evaluate_relevance(q, c),
            _ => 0.0,
        };

        Ok(EvaluationResult {
            context_relevance,
            faithfulness: faithfulness.clamp(0.0, 1.0),
            groundedness: groundedness.clamp(0.0, 1.0),
            ungrounded_claims,
            context_count: sources.len(),
            retrieval_path: "vector".to_string(),
            used_fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_balanced_object_from_surrounding_prose() {
        let text = "Sure, here it is: {\"faithfulness\": 0.8, \"groundedness\": 0.6} -- hope that helps";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["faithfulness"], 0.8);
    }

    #[test]
    fn nested_braces_do_not_truncate_the_object() {
        let text = "{\"faithfulness\": 0.9, \"meta\": {\"nested\": true}, \"groundedness\": 0.4}";
        let value = extract_first_json_object(text).unwrap();
        assert_eq!(value["meta"]["nested"], true);
        assert_eq!(value["groundedness"], 0.4);
    }

    #[test]
    fn returns_none_for_free_text_with_no_object() {
        assert!(extract_first_json_object("not json at all").is_none());
    }

    struct GarbageJudge;
    #[async_trait]
    impl JudgeModel for GarbageJudge {
        async fn judge(&self, _prompt: &str) -> Result<String> {
            Ok("I cannot comply with that request.".to_string())
        }
    }

    #[tokio::test]
    async fn falls_back_to_lexical_scoring_on_unparseable_judge_output() {
        let judge = LLMJudge::new(std::sync::Arc::new(GarbageJudge));
        let sources = vec![serde_json::json!({"name": "payments-gateway"})];
        let result = judge.evaluate("who calls payments?", "payments-gateway handles it", &sources, None, None).await.unwrap();
        assert!(result.used_fallback);
    }
}
