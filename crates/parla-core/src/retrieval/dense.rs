//! Sharded dense retrieval.
//!
//! For each shard under the profile root, builds an in-memory inner-product
//! index over its (L2-normalized) embeddings, encodes the query with the
//! same embedding model and normalization policy used at build time, and
//! takes the nearest neighbors. Within each shard, an independent
//! cross-encoder relevance filter then narrows the hits to the best few
//! before they leave the shard.
//!
//! Shard failures (missing files, shape mismatches, dimension
//! incompatibility) are logged and the shard is skipped: partial corpus
//! coverage beats a failed query.

use std::path::Path;
use std::sync::Arc;

use ndarray::Array1;
use rayon::prelude::*;
use tracing::{debug, warn};

use parla_model::{CrossEncoderModel, EmbeddingModel};

use crate::chunk::{Chunk, ChunkSource};
use crate::config::{DenseIndexConfig, RetrievalBudgets};
use crate::dump::RetrievalDump;
use crate::errors::ParlaError;
use crate::shard::{discover_shards, load_shard, ShardData};

/// Sharded dense retriever.
pub struct DenseRetriever {
    index_config: DenseIndexConfig,
    top_k_dense: usize,
    top_chunks_per_shard: usize,
    embedder: Arc<dyn EmbeddingModel>,
    relevance_filter: Arc<dyn CrossEncoderModel>,
}

impl std::fmt::Debug for DenseRetriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DenseRetriever")
            .field("embedding_model", &self.index_config.embedding_model)
            .field("top_k_dense", &self.top_k_dense)
            .field("top_chunks_per_shard", &self.top_chunks_per_shard)
            .finish()
    }
}

impl DenseRetriever {
    /// Create a dense retriever.
    pub fn new(
        index_config: DenseIndexConfig,
        budgets: &RetrievalBudgets,
        embedder: Arc<dyn EmbeddingModel>,
        relevance_filter: Arc<dyn CrossEncoderModel>,
    ) -> Self {
        Self {
            index_config,
            top_k_dense: budgets.top_k_dense,
            top_chunks_per_shard: budgets.top_chunks_per_shard,
            embedder,
            relevance_filter,
        }
    }

    /// Run dense retrieval over every shard under `profile_root`.
    ///
    /// Returns the flattened per-shard survivors. Shard-level failures are
    /// skipped; only query embedding failure (nothing can be searched) is
    /// an error, which the pipeline degrades to an empty dense list.
    pub fn search(
        &self,
        query: &str,
        profile_root: &Path,
        dump: &mut RetrievalDump,
    ) -> Result<Vec<Chunk>, ParlaError> {
        let query_vec = self.embed_query(query)?;
        let shard_dirs = discover_shards(profile_root)?;

        dump.begin_section("dense");
        dump.write_query(query);

        // Shard loops are independent; order of results does not matter
        // before fusion.
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
                if let Err(e) = shard.check_compatibility(&self.index_config) {
                    warn!("Skipping shard {}: {}", dir.display(), e);
                    return None;
                }

                let hits = self.search_shard(&shard, &query_vec);
                let kept = self.filter_shard_hits(query, hits, &shard.name);
                debug!("Shard `{}`: kept {} dense chunks", shard.name, kept.len());
                Some(kept)
            })
            .collect();

        let mut all: Vec<Chunk> = Vec::new();
        for shard_chunks in per_shard {
            for (rank, chunk) in shard_chunks.iter().enumerate() {
                dump.write_kept("DENSE", &chunk.shard, rank + 1, chunk);
            }
            all.extend(shard_chunks);
        }
        dump.end_section();

        debug!("Dense retrieval: {} chunks across all shards", all.len());
        Ok(all)
    }

    /// Embed and, per index policy, L2-normalize the query.
    fn embed_query(&self, query: &str) -> Result<Array1<f32>, ParlaError> {
        let mut embeddings =
            self.embedder
                .embed(&[query])
                .map_err(|e| ParlaError::QueryEmbedding {
                    query: query.chars().take(200).collect(),
                    reason: e.to_string(),
                })?;

        let vec = embeddings
            .pop()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ParlaError::QueryEmbedding {
                query: query.chars().take(200).collect(),
                reason: "embedding backend returned no vector".to_string(),
            })?;

        let mut query_vec = Array1::from_vec(vec);
        if self.index_config.normalize {
            let norm = query_vec.dot(&query_vec).sqrt();
            if norm > 0.0 {
                query_vec.mapv_inplace(|x| x / norm);
            }
        }
        Ok(query_vec)
    }

    /// Inner-product top-k over one shard.
    fn search_shard(&self, shard: &ShardData, query_vec: &Array1<f32>) -> Vec<Chunk> {
        if shard.is_empty() {
            return Vec::new();
        }

        let mut scores: Vec<f32> = shard.embeddings.dot(query_vec).to_vec();

        // Corpora built without normalization still get cosine semantics:
        // divide by row norms on the fly.
        if !self.index_config.built_with_normalization {
            for (i, row) in shard.embeddings.rows().into_iter().enumerate() {
                let norm = row.dot(&row).sqrt();
                if norm > 0.0 {
                    scores[i] /= norm;
                }
            }
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        order
            .into_iter()
            .take(self.top_k_dense)
            .map(|idx| {
                // similarity = 1 - distance, with distance = 1 - cosine
                let similarity = scores[idx];
                let mut chunk =
                    Chunk::new(shard.chunks[idx].clone(), shard.name.clone(), ChunkSource::Dense);
                chunk.metadata = shard.metadata[idx].clone();
                chunk.scores.dense_similarity = Some(similarity);
                chunk.scores.dominance_score = Some(similarity);
                chunk
            })
            .collect()
    }

    /// Narrow shard hits with the cross-encoder relevance filter.
    ///
    /// Scorer failure keeps the dense ordering (truncated to the same
    /// budget) - the filter is an improvement, not a dependency.
    fn filter_shard_hits(&self, query: &str, hits: Vec<Chunk>, shard_name: &str) -> Vec<Chunk> {
        if hits.len() <= self.top_chunks_per_shard {
            return hits;
        }

        let texts: Vec<String> = hits.iter().map(|c| c.text.clone()).collect();
        match self.relevance_filter.score_batch(query, &texts) {
            Ok(scores) if scores.len() == hits.len() => {
                let mut order: Vec<usize> = (0..hits.len()).collect();
                order.sort_by(|&a, &b| {
                    scores[b]
                        .partial_cmp(&scores[a])
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
                let keep: std::collections::HashSet<usize> = order
                    .into_iter()
                    .take(self.top_chunks_per_shard)
                    .collect();
                hits.into_iter()
                    .enumerate()
                    .filter_map(|(i, c)| keep.contains(&i).then_some(c))
                    .collect()
            }
            Ok(_) | Err(_) => {
                warn!(
                    "Relevance filter degraded for shard `{}`; keeping dense order",
                    shard_name
                );
                let mut hits = hits;
                hits.truncate(self.top_chunks_per_shard);
                hits
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use ndarray_npy::write_npy;
    use parla_model::{ModelInfo, ModelResult};
    use serde_json::{Map, Value};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Embeds to a fixed unit vector axis based on leading keyword.
    #[derive(Debug)]
    struct AxisEmbedder;

    impl EmbeddingModel for AxisEmbedder {
        fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("gold") {
                        vec![1.0, 0.0, 0.0]
                    } else {
                        vec![0.0, 1.0, 0.0]
                    }
                })
                .collect())
        }
        fn dimension(&self) -> usize {
            3
        }
        fn max_sequence_length(&self) -> usize {
            512
        }
        fn model_info(&self) -> &ModelInfo {
            static INFO: std::sync::OnceLock<ModelInfo> = std::sync::OnceLock::new();
            INFO.get_or_init(|| ModelInfo::new("axis", 3, 512))
        }
    }

    /// Passthrough scorer: longer text scores higher.
    #[derive(Debug)]
    struct LengthScorer;

    impl CrossEncoderModel for LengthScorer {
        fn score_batch(&self, _query: &str, documents: &[String]) -> ModelResult<Vec<f32>> {
            Ok(documents.iter().map(|d| d.len() as f32).collect())
        }
        fn model_id(&self) -> &str {
            "length"
        }
    }

    fn index_config() -> DenseIndexConfig {
        DenseIndexConfig {
            embedding_model: "axis".to_string(),
            dimensions: 3,
            index_type: "flat_ip".to_string(),
            normalize: true,
            built_with_normalization: true,
        }
    }

    fn budgets() -> RetrievalBudgets {
        RetrievalBudgets {
            top_k_dense: 4,
            top_k_lexical: 4,
            top_k_fusion: 4,
            fusion_top_dense: 8,
            fusion_top_lexical: 4,
            top_chunks_per_shard: 2,
            chunk_filter_model: "length".to_string(),
        }
    }

    fn write_shard(root: &std::path::Path, name: &str, chunks: &[&str], rows: Vec<[f32; 3]>) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("chunks.txt"), chunks.join("\n\n")).unwrap();
        let metadata: Vec<Map<String, Value>> = chunks
            .iter()
            .enumerate()
            .map(|(i, _)| {
                let mut m = Map::new();
                m.insert("chunk_id".to_string(), Value::from(i));
                m.insert("source".to_string(), Value::from(name));
                m
            })
            .collect();
        fs::write(
            dir.join("metadata.json"),
            serde_json::to_string(&metadata).unwrap(),
        )
        .unwrap();
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let arr = Array2::from_shape_vec((rows.len(), 3), flat).unwrap();
        write_npy(dir.join("embeddings.npy"), &arr).unwrap();
    }

    fn retriever() -> DenseRetriever {
        DenseRetriever::new(
            index_config(),
            &budgets(),
            Arc::new(AxisEmbedder),
            Arc::new(LengthScorer),
        )
    }

    #[test]
    fn test_search_ranks_by_similarity() {
        let temp = TempDir::new().unwrap();
        write_shard(
            temp.path(),
            "macro",
            &["gold chunk here", "equity chunk"],
            vec![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
        );

        let mut dump = RetrievalDump::disabled();
        let chunks = retriever()
            .search("gold outlook", temp.path(), &mut dump)
            .unwrap();

        assert_eq!(chunks.len(), 2);
        let gold = chunks
            .iter()
            .find(|c| c.text.contains("gold"))
            .expect("gold chunk retrieved");
        assert!(gold.scores.dense_similarity.unwrap() > 0.9);
        assert_eq!(gold.source, ChunkSource::Dense);
        assert_eq!(gold.scores.dominance_score, gold.scores.dense_similarity);
    }

    #[test]
    fn test_relevance_filter_narrows_per_shard() {
        let temp = TempDir::new().unwrap();
        write_shard(
            temp.path(),
            "macro",
            &["gold a", "gold bb", "gold ccc", "gold dddd"],
            vec![
                [1.0, 0.0, 0.0],
                [0.9, 0.1, 0.0],
                [0.8, 0.2, 0.0],
                [0.7, 0.3, 0.0],
            ],
        );

        let mut dump = RetrievalDump::disabled();
        let chunks = retriever()
            .search("gold", temp.path(), &mut dump)
            .unwrap();

        // top_chunks_per_shard = 2, LengthScorer keeps the two longest
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.text.len() >= "gold ccc".len()));
    }

    #[test]
    fn test_corrupt_shard_skipped() {
        let temp = TempDir::new().unwrap();
        write_shard(temp.path(), "good", &["gold text"], vec![[1.0, 0.0, 0.0]]);
        // Shard with mismatched row count
        let bad = temp.path().join("bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join("chunks.txt"), "one\n\ntwo").unwrap();
        fs::write(bad.join("metadata.json"), "[{}, {}]").unwrap();
        let arr = Array2::<f32>::zeros((5, 3));
        write_npy(bad.join("embeddings.npy"), &arr).unwrap();

        let mut dump = RetrievalDump::disabled();
        let chunks = retriever()
            .search("gold", temp.path(), &mut dump)
            .unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].shard, "good");
    }

    #[test]
    fn test_dimension_mismatch_skipped() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("wrongdim");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("chunks.txt"), "text").unwrap();
        fs::write(dir.join("metadata.json"), "[{}]").unwrap();
        let arr = Array2::<f32>::zeros((1, 7));
        write_npy(dir.join("embeddings.npy"), &arr).unwrap();

        let mut dump = RetrievalDump::disabled();
        let chunks = retriever()
            .search("gold", temp.path(), &mut dump)
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_missing_profile_root_is_error() {
        let mut dump = RetrievalDump::disabled();
        let result = retriever().search("gold", PathBuf::from("/nonexistent/x").as_path(), &mut dump);
        assert!(result.is_err());
    }
}
