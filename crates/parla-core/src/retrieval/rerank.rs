//! Cross-encoder reranking, the final ordering stage.
//!
//! Scores every (query, candidate-text) pair jointly, attaches the score,
//! sorts descending, and truncates to `top_k`. Reranking is never a hard
//! dependency for answering: any scoring failure returns the original,
//! unsorted input as a failsafe.

use std::sync::Arc;

use tracing::{debug, info, warn};

use parla_model::CrossEncoderModel;

use crate::chunk::CandidateSet;

/// Cross-encoder rerank stage.
pub struct Reranker {
    top_k: usize,
    model: Arc<dyn CrossEncoderModel>,
}

impl std::fmt::Debug for Reranker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reranker")
            .field("top_k", &self.top_k)
            .field("model", &self.model.model_id())
            .finish()
    }
}

impl Reranker {
    /// Create a reranker.
    pub fn new(top_k: usize, model: Arc<dyn CrossEncoderModel>) -> Self {
        Self { top_k, model }
    }

    /// Rerank the candidates, or return them untouched on failure.
    pub fn rerank(&self, candidates: CandidateSet, query: &str) -> CandidateSet {
        if candidates.is_empty() {
            debug!("Rerank skipped: no candidates");
            return candidates;
        }

        let texts: Vec<String> = candidates.iter().map(|c| c.text.clone()).collect();

        let scores = match self.model.score_batch(query, &texts) {
            Ok(scores) if scores.len() == texts.len() => scores,
            Ok(scores) => {
                warn!(
                    "Rerank degraded: {} scores for {} candidates; returning input unsorted",
                    scores.len(),
                    texts.len()
                );
                return candidates;
            }
            Err(e) => {
                warn!("Rerank degraded: {}; returning input unsorted", e);
                return candidates;
            }
        };

        let mut scored: Vec<_> = candidates
            .into_iter()
            .zip(scores)
            .map(|(mut chunk, score)| {
                chunk.scores.rerank_score = Some(score);
                chunk
            })
            .collect();

        scored.sort_by(|a, b| {
            b.scores
                .rerank_score
                .partial_cmp(&a.scores.rerank_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.top_k);

        info!("Rerank: kept {} of {} candidates", scored.len(), texts.len());
        CandidateSet::from(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkSource};
    use parla_model::{ModelError, ModelResult};

    /// Scores by the number embedded in the text.
    #[derive(Debug)]
    struct NumberScorer;

    impl CrossEncoderModel for NumberScorer {
        fn score_batch(&self, _query: &str, documents: &[String]) -> ModelResult<Vec<f32>> {
            Ok(documents
                .iter()
                .map(|d| {
                    d.split_whitespace()
                        .filter_map(|w| w.parse::<f32>().ok())
                        .next_back()
                        .unwrap_or(0.0)
                })
                .collect())
        }
        fn model_id(&self) -> &str {
            "number"
        }
    }

    #[derive(Debug)]
    struct BrokenScorer;

    impl CrossEncoderModel for BrokenScorer {
        fn score_batch(&self, _query: &str, _documents: &[String]) -> ModelResult<Vec<f32>> {
            Err(ModelError::scoring_failed("broken", "down"))
        }
        fn model_id(&self) -> &str {
            "broken"
        }
    }

    fn set(texts: &[&str]) -> CandidateSet {
        texts
            .iter()
            .map(|t| Chunk::new(*t, "s", ChunkSource::Dense))
            .collect()
    }

    #[test]
    fn test_sorted_descending_and_truncated() {
        let reranker = Reranker::new(2, Arc::new(NumberScorer));
        let out = reranker.rerank(set(&["chunk 1", "chunk 9", "chunk 5"]), "q");

        assert_eq!(out.len(), 2);
        let scores: Vec<f32> = out
            .iter()
            .map(|c| c.scores.rerank_score.unwrap())
            .collect();
        assert_eq!(scores, vec![9.0, 5.0]);
    }

    #[test]
    fn test_output_never_exceeds_top_k() {
        let reranker = Reranker::new(3, Arc::new(NumberScorer));
        let texts: Vec<String> = (0..10).map(|i| format!("chunk {i}")).collect();
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let out = reranker.rerank(set(&refs), "q");
        assert!(out.len() <= 3);
    }

    #[test]
    fn test_empty_input_is_noop() {
        let reranker = Reranker::new(3, Arc::new(NumberScorer));
        let out = reranker.rerank(CandidateSet::new(), "q");
        assert!(out.is_empty());
    }

    #[test]
    fn test_failure_returns_original_order() {
        let reranker = Reranker::new(2, Arc::new(BrokenScorer));
        let out = reranker.rerank(set(&["first", "second", "third"]), "q");

        // Failsafe: original, unsorted, untruncated input
        assert_eq!(out.len(), 3);
        assert_eq!(out.as_slice()[0].text, "first");
        assert!(out.as_slice()[0].scores.rerank_score.is_none());
    }
}
