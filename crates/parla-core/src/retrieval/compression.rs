//! Context compression via Maximal Marginal Relevance.
//!
//! When the candidate set is large, stuffing everything into the prompt
//! wastes the model's attention on near-identical passages. MMR picks a
//! relevance-ranked *and diverse* subset: each of `top_k` slots goes to the
//! unselected candidate maximizing
//!
//! ```text
//! (1 - λ)·sim(query, c)  -  λ·max sim(c, already selected)
//! ```
//!
//! so larger λ favors diversity over raw relevance. Ties break to
//! first-seen order.
//!
//! Compression is skipped outright (input returned unchanged) when it
//! cannot pay for itself: disabled by config, candidate count already
//! within `top_k`, empty query, or combined text below the configured
//! character floor. Embedding failure degrades the stage the same way.

use std::sync::Arc;

use tracing::{debug, info, warn};

use parla_model::EmbeddingModel;

use crate::chunk::CandidateSet;
use crate::config::CompressionConfig;

/// MMR context compressor.
pub struct ContextCompressor {
    config: CompressionConfig,
    embedder: Arc<dyn EmbeddingModel>,
}

impl std::fmt::Debug for ContextCompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextCompressor")
            .field("enabled", &self.config.enabled)
            .field("top_k", &self.config.top_k)
            .field("mmr_lambda", &self.config.mmr_lambda)
            .finish()
    }
}

impl ContextCompressor {
    /// Create a compressor from config and an embedding backend.
    pub fn new(config: CompressionConfig, embedder: Arc<dyn EmbeddingModel>) -> Self {
        Self { config, embedder }
    }

    /// Compress the candidate set, or return it unchanged when any skip
    /// guard fires.
    pub fn compress(&self, candidates: CandidateSet, query: &str) -> CandidateSet {
        if !self.config.enabled {
            debug!("Compression disabled via config");
            return candidates;
        }
        if candidates.is_empty() {
            return candidates;
        }
        if query.trim().is_empty() {
            warn!("Compression skipped: empty query");
            return candidates;
        }
        if candidates.len() <= self.config.top_k {
            debug!(
                "Compression skipped: {} candidates <= top_k {}",
                candidates.len(),
                self.config.top_k
            );
            return candidates;
        }
        if candidates.total_text_len() < self.config.max_chars_to_comp {
            debug!(
                "Compression skipped: {} chars below floor {}",
                candidates.total_text_len(),
                self.config.max_chars_to_comp
            );
            return candidates;
        }

        let original_count = candidates.len();

        // Embed query + candidates in one batch.
        let mut inputs: Vec<&str> = Vec::with_capacity(original_count + 1);
        inputs.push(query);
        for chunk in candidates.iter() {
            inputs.push(&chunk.text);
        }

        let embeddings = match self.embedder.embed(&inputs) {
            Ok(e) if e.len() == original_count + 1 => e,
            Ok(_) | Err(_) => {
                warn!("Compression degraded: embedding failed, returning input unchanged");
                return candidates;
            }
        };

        let query_emb = &embeddings[0];
        let doc_embs = &embeddings[1..];

        let relevance: Vec<f32> = doc_embs.iter().map(|d| cosine(query_emb, d)).collect();

        let selected = mmr_select(
            &relevance,
            doc_embs,
            self.config.top_k,
            self.config.mmr_lambda,
        );

        let chunks = candidates.into_vec();
        let mut out = Vec::with_capacity(selected.len());
        for idx in selected {
            out.push(chunks[idx].clone());
        }

        info!(
            "Compression: {} -> {} chunks (λ={})",
            original_count,
            out.len(),
            self.config.mmr_lambda
        );

        CandidateSet::from(out)
    }
}

/// Greedy MMR selection over precomputed embeddings.
///
/// Returns selected indices in pick order. Ties break to the earliest
/// candidate index.
fn mmr_select(
    relevance: &[f32],
    doc_embs: &[Vec<f32>],
    top_k: usize,
    lambda: f32,
) -> Vec<usize> {
    let n = relevance.len();
    let mut selected: Vec<usize> = Vec::with_capacity(top_k.min(n));
    let mut remaining: Vec<usize> = (0..n).collect();

    while selected.len() < top_k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let diversity_penalty = if selected.is_empty() || lambda >= 1.0 {
                0.0
            } else {
                selected
                    .iter()
                    .map(|&s| cosine(&doc_embs[idx], &doc_embs[s]))
                    .fold(f32::NEG_INFINITY, f32::max)
            };

            let score = if selected.is_empty() {
                relevance[idx]
            } else {
                (1.0 - lambda) * relevance[idx] - lambda * diversity_penalty
            };

            // Strict > keeps the first-seen candidate on ties.
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
