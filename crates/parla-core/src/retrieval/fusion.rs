//! Budgeted fusion of dense and lexical candidates.
//!
//! Lexical hits go first: exact term matches are usually the correct
//! answer when they exist, and putting them ahead of the semantic hits
//! means identity-dedup keeps the lexically-scored copy of a chunk both
//! retrievers found. Each source is capped by its own budget before
//! concatenation, so the output can never exceed
//! `fusion_top_lexical + fusion_top_dense`.
//!
//! When both retrievers surface the same chunk, the kept copy absorbs the
//! other's scores - a chunk found both ways carries its dense similarity
//! AND its lexical score into routing and filtering.
//!
//! Fusion is resilient by construction: an empty source (its retriever
//! errored or found nothing) is logged and the other source proceeds
//! alone. One retriever failing must never cost the other's results.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::chunk::{CandidateSet, Chunk};
use crate::config::RetrievalBudgets;

/// Fuse dense and lexical candidate lists under per-source budgets,
/// deduplicating by canonical chunk identity and merging score bags on
/// collision.
pub fn fuse_candidates(
    dense: Vec<Chunk>,
    lexical: Vec<Chunk>,
    budgets: &RetrievalBudgets,
) -> CandidateSet {
    if dense.is_empty() && !lexical.is_empty() {
        warn!("Fusion: dense source empty, proceeding with lexical only");
    }
    if lexical.is_empty() && !dense.is_empty() {
        warn!("Fusion: lexical source empty, proceeding with dense only");
    }

    let lexical_count = lexical.len().min(budgets.fusion_top_lexical);
    let dense_count = dense.len().min(budgets.fusion_top_dense);

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<Chunk> = Vec::with_capacity(lexical_count + dense_count);

    for chunk in lexical
        .into_iter()
        .take(lexical_count)
        .chain(dense.into_iter().take(dense_count))
    {
        match seen.get(&chunk.canonical_key()) {
            Some(&idx) => merge_scores(&mut fused[idx], &chunk),
            None => {
                seen.insert(chunk.canonical_key(), fused.len());
                fused.push(chunk);
            }
        }
    }

    info!(
        "Fusion: BM25[..{}] + DENSE[..{}] -> {} unique chunks",
        budgets.fusion_top_lexical,
        budgets.fusion_top_dense,
        fused.len()
    );

    CandidateSet::from(fused)
}

/// Fill score fields the kept copy is missing from the discarded
/// duplicate.
fn merge_scores(kept: &mut Chunk, other: &Chunk) {
    let scores = &mut kept.scores;
    if scores.dense_similarity.is_none() {
        scores.dense_similarity = other.scores.dense_similarity;
    }
    if scores.lexical_score.is_none() {
        scores.lexical_score = other.scores.lexical_score;
    }
    if scores.dominance_score.is_none() {
        scores.dominance_score = other.scores.dominance_score;
    }
}
