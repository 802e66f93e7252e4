//! Sharded lexical (BM25) retrieval, two-stage.
//!
//! Stage one runs BM25 independently inside every shard and tags each hit
//! with its raw score. Stage two builds a **second, global** BM25 index
//! over the merged hit texts and queries it again to pick the final top-k:
//! without the global pass, one shard's lexically strong but locally
//! irrelevant hits crowd out globally better matches from other shards.
//! Original metadata rides along to the globally re-ranked output.
//!
//! The global pass scores over the merged hit sample only, so its IDF
//! statistics come from an already-filtered population rather than the
//! full corpus. That is deliberate, observed production behavior; a
//! corpus-wide second index would change ranking semantics.

use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::bm25::{Bm25Config, Bm25Index};
use crate::chunk::{Chunk, ChunkSource};
use crate::dump::RetrievalDump;
use crate::errors::ParlaError;
use crate::shard::{discover_shards, load_shard};

/// Sharded two-stage BM25 retriever.
#[derive(Debug)]
pub struct LexicalRetriever {
    top_k_lexical: usize,
    bm25_config: Bm25Config,
}

impl LexicalRetriever {
    /// Create a lexical retriever.
    pub fn new(top_k_lexical: usize, bm25_config: Bm25Config) -> Self {
        Self {
            top_k_lexical,
            bm25_config,
        }
    }

    /// Run two-stage lexical retrieval over every shard under
    /// `profile_root`.
    pub fn search(
        &self,
        query: &str,
        profile_root: &Path,
        dump: &mut RetrievalDump,
    ) -> Result<Vec<Chunk>, ParlaError> {
        let shard_dirs = discover_shards(profile_root)?;

        dump.begin_section("bm25");
        dump.write_query(query);

        // Stage one: per-shard BM25, shards independent.
        let per_shard: Vec<Vec<Chunk>> = shard_dirs
            .par_iter()
            .filter_map(|dir| {
                let shard = match load_shard(profile_root, dir) {
                    Ok(shard) => shard,
                    Err(e) => {
                        warn!("Skipping shard {}: {}", dir.display(), e);
                        return None;
                    }
                };
                if shard.is_empty() {
                    return None;
                }

                let index = Bm25Index::from_texts(self.bm25_config.clone(), &shard.chunks);
                let hits = index.search(query, self.top_k_lexical);

                let chunks: Vec<Chunk> = hits
                    .into_iter()
                    .map(|hit| {
                        let mut chunk = Chunk::new(
                            shard.chunks[hit.doc_idx].clone(),
                            shard.name.clone(),
                            ChunkSource::Lexical,
                        );
                        chunk.metadata = shard.metadata[hit.doc_idx].clone();
                        chunk.scores.lexical_score = Some(hit.score);
                        chunk.scores.dominance_score = Some(hit.score);
                        chunk
                    })
                    .collect();

                debug!("Shard `{}`: {} BM25 hits", shard.name, chunks.len());
                Some(chunks)
            })
            .collect();

        let merged: Vec<Chunk> = per_shard.into_iter().flatten().collect();

        // Stage two: global re-ranking over the merged hit set.
        let final_hits = self.global_top_k(query, merged);

        for (rank, chunk) in final_hits.iter().enumerate() {
            dump.write_kept("BM25", "ALL", rank + 1, chunk);
        }
        dump.end_section();

        debug!("Lexical retrieval: {} chunks after global pass", final_hits.len());
        Ok(final_hits)
    }

    /// Second global BM25 over the merged per-shard hits.
    ///
    /// The merged chunks keep their per-shard scores and metadata; only
    /// the ordering (and the cut to `top_k_lexical`) comes from the global
    /// index.
    fn global_top_k(&self, query: &str, merged: Vec<Chunk>) -> Vec<Chunk> {
        if merged.len() <= 1 {
            return merged;
        }

        let texts: Vec<&str> = merged.iter().map(|c| c.text.as_str()).collect();
        let index = Bm25Index::from_texts(self.bm25_config.clone(), &texts);
        let hits = index.search(query, self.top_k_lexical);

        hits.into_iter()
            .map(|hit| merged[hit.doc_idx].clone())
            .collect()
    }
}
