//! The hybrid retrieval pipeline: query understanding through compression.
//!
//! One [`RetrievalPipeline::run`] call executes, in order:
//!
//! 1. Intent classification → per-intent stage flags, AND-ed with the
//!    global switches
//! 2. Query rewriting and expansion (flag-gated, strict no-ops when off)
//! 3. Dense + lexical sharded retrieval
//! 4. Budgeted fusion
//! 5. Dominance filter
//! 6. Near-duplicate elimination
//! 7. Salient span extraction (flag-gated, self-gated)
//! 8. Cross-encoder reranking (flag-gated)
//! 9. MMR context compression
//!
//! Every model-backed stage degrades locally; the only error this function
//! returns is a corpus-level failure (no profile root), which the
//! orchestrator maps to the fallback path.

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::chunk::CandidateSet;
use crate::config::{DumpConfig, RetrievalBudgets, StageSwitches};
use crate::dump::RetrievalDump;
use crate::errors::ParlaError;
use crate::query::{QueryClassifier, QueryExpander, QueryIntent, QueryRewriter, StageFlags};
use crate::retrieval::{
    dominance_filter, fuse_candidates, ContextCompressor, DenseRetriever, Deduplicator,
    LexicalRetriever, Reranker, SalientSpanExtractor,
};

/// Default z-score threshold for the dominance filter.
pub const DEFAULT_DOMINANCE_Z_THRESHOLD: f32 = 3.2;

/// Everything a pipeline needs, injected at construction.
///
/// Construction is the fail-fast boundary: configs are loaded and
/// validated before this struct exists.
pub struct PipelineComponents {
    /// Directory of the active corpus profile.
    pub profile_root: PathBuf,
    /// Global stage switches.
    pub switches: StageSwitches,
    /// Retrieval and fusion budgets.
    pub budgets: RetrievalBudgets,
    /// Debug dump settings.
    pub dump: DumpConfig,
    /// Dominance filter z-threshold; `None` disables the filter.
    pub dominance_z_threshold: Option<f32>,
    /// Intent classifier.
    pub classifier: QueryClassifier,
    /// Query rewriter.
    pub rewriter: QueryRewriter,
    /// Query expander.
    pub expander: QueryExpander,
    /// Dense retriever.
    pub dense: DenseRetriever,
    /// Lexical retriever.
    pub lexical: LexicalRetriever,
    /// Near-duplicate eliminator.
    pub deduper: Deduplicator,
    /// Salient span extractor.
    pub ssi: SalientSpanExtractor,
    /// Cross-encoder reranker.
    pub reranker: Reranker,
    /// MMR context compressor.
    pub compressor: ContextCompressor,
}

/// Outcome of one pipeline run.
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Final candidate set, ordered (rerank/compression order when those
    /// stages ran).
    pub candidates: CandidateSet,
    /// Best similarity for routing: max dense similarity when available,
    /// else a [0,1]-squashed best lexical score.
    pub best_score: Option<f32>,
    /// Classified intent.
    pub intent: QueryIntent,
    /// Effective stage flags after masking with global switches.
    pub flags: StageFlags,
    /// The query that was actually searched (post rewrite/expansion).
    pub effective_query: String,
    /// Whether the dominance filter found a dominant cluster.
    pub dominant: bool,
    /// Near-duplicates removed (telemetry).
    pub removed_duplicates: usize,
}

/// The multi-stage hybrid retrieval pipeline.
pub struct RetrievalPipeline {
    components: PipelineComponents,
}

impl std::fmt::Debug for RetrievalPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalPipeline")
            .field("profile_root", &self.components.profile_root)
            .finish()
    }
}

impl RetrievalPipeline {
    /// Create a pipeline from its components.
    pub fn new(components: PipelineComponents) -> Self {
        Self { components }
    }

    /// Retrieval budgets (for callers sizing their own buffers).
    pub fn budgets(&self) -> &RetrievalBudgets {
        &self.components.budgets
    }

    /// Run the full pipeline for one query.
    ///
    /// `history` is (role, text) pairs of prior turns, used as rewriting
    /// context.
    ///
    /// # Errors
    ///
    /// Only corpus-level failures (missing profile root, query embedding
    /// dead with no shards searchable) surface as errors; stage failures
    /// degrade in place.
    pub fn run(
        &self,
        query: &str,
        history: &[(String, String)],
    ) -> Result<PipelineOutcome, ParlaError> {
        if query.trim().is_empty() {
            return Err(ParlaError::InvalidArgument(
                "Question cannot be empty".to_string(),
            ));
        }

        let c = &self.components;

        // 1. Classify and derive stage flags.
        let intent = c.classifier.classify(query);
        let flags = c.switches.mask(intent.stage_flags());
        debug!(?flags, intent = intent.as_str(), "Stage flags resolved");

        // 2. Rewrite / expand. Disabled stages are strict no-ops: the
        //    query string passes through untouched.
        let mut effective_query = query.to_string();
        if flags.rewrite {
            effective_query = c.rewriter.rewrite(&effective_query, history);
        }
        if flags.expand {
            effective_query = c.expander.expand(&effective_query);
        }

        let mut dump = RetrievalDump::new(&c.dump);

        // 3. Dual retrieval. A failed retriever contributes an empty list;
        //    fusion carries on with the other source.
        let dense_hits = match c.dense.search(&effective_query, &c.profile_root, &mut dump) {
            Ok(hits) => hits,
            Err(e @ ParlaError::CorpusRootNotFound { .. }) => return Err(e),
            Err(e) => {
                warn!("Dense retrieval degraded: {}", e);
                Vec::new()
            }
        };
        let lexical_hits = match c.lexical.search(&effective_query, &c.profile_root, &mut dump) {
            Ok(hits) => hits,
            Err(e @ ParlaError::CorpusRootNotFound { .. }) => return Err(e),
            Err(e) => {
                warn!("Lexical retrieval degraded: {}", e);
                Vec::new()
            }
        };

        // 4. Fusion.
        let fused = fuse_candidates(dense_hits, lexical_hits, &c.budgets);

        // 5. Dominance filter.
        let (candidates, dominant) = match c.dominance_z_threshold {
            Some(z) => dominance_filter(fused, z),
            None => (fused, false),
        };

        // 6. Dedup.
        let dedup_outcome = c.deduper.run(candidates);
        let removed_duplicates = dedup_outcome.removed;
        let mut candidates = dedup_outcome.candidates;

        // 7. Span extraction (flag-gated on top of its own self-gate).
        if flags.ssi {
            candidates = c.ssi.extract(candidates, &effective_query);
        }

        // 8. Rerank.
        if flags.rerank {
            candidates = c.reranker.rerank(candidates, &effective_query);
        }

        // 9. Compression.
        let candidates = c.compressor.compress(candidates, &effective_query);

        let best_score = best_similarity(&candidates);

        info!(
            intent = intent.as_str(),
            candidates = candidates.len(),
            best_score = best_score.unwrap_or(0.0),
            dominant,
            "Pipeline run complete"
        );

        Ok(PipelineOutcome {
            candidates,
            best_score,
            intent,
            flags,
            effective_query,
            dominant,
            removed_duplicates,
        })
    }
}

/// Routing similarity for a candidate set.
///
/// Dense cosine similarity is already in [0,1] and is used directly. A
/// lexical-only set squashes its best raw BM25 score into (0,1) with
/// `s / (s + 1)` so the routing threshold stays meaningful for corpora
/// where dense retrieval is degraded.
fn best_similarity(candidates: &CandidateSet) -> Option<f32> {
    if let Some(best) = candidates.best_dense_similarity() {
        return Some(best);
    }
    candidates
        .best_lexical_score()
        .map(|s| s / (s + 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkSource};

    #[test]
    fn test_best_similarity_prefers_dense() {
        let mut dense = Chunk::new("a", "s", ChunkSource::Dense);
        dense.scores.dense_similarity = Some(0.7);
        let mut lexical = Chunk::new("b", "s", ChunkSource::Lexical);
        lexical.scores.lexical_score = Some(12.0);

        let set = CandidateSet::from(vec![dense, lexical]);
        assert_eq!(best_similarity(&set), Some(0.7));
    }

    #[test]
    fn test_best_similarity_squashes_lexical() {
        let mut lexical = Chunk::new("b", "s", ChunkSource::Lexical);
        lexical.scores.lexical_score = Some(3.0);

        let set = CandidateSet::from(vec![lexical]);
        let score = best_similarity(&set).unwrap();
        assert!((score - 0.75).abs() < 1e-6);
        assert!(score < 1.0);
    }

    #[test]
    fn test_best_similarity_empty() {
        assert_eq!(best_similarity(&CandidateSet::new()), None);
    }
}
