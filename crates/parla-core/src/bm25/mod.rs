//! BM25 sparse retrieval for the lexical half of hybrid search.
//!
//! Lexical retrieval complements dense semantic retrieval: exact term
//! matches are often the correct answer for specific queries, while dense
//! search covers paraphrase and concept matches.
//!
//! Unlike a persistent index, parla builds BM25 indexes **per query**: one
//! small index per shard, then a second global index over the merged hits
//! (see `retrieval::lexical`). The corpus is read-only at query time, so
//! nothing is ever stored.
//!
//! ## Key Components
//!
//! - [`tokenizer`]: Unicode-aware tokenization with Porter stemmer
//! - [`index`]: BM25 inverted index and query-time scoring
//! - [`scorer`]: BM25 scoring algorithm (k1=1.2, b=0.75)

mod index;
mod scorer;
mod tokenizer;

pub use index::{Bm25Index, Bm25IndexStats, DocumentStats};
pub use scorer::{bm25_score, bm25_term_score, idf, Bm25Params};
pub use tokenizer::{Tokenizer, TokenizerConfig};

use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration
// ============================================================================

/// BM25 configuration.
///
/// Controls tokenization and scoring parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bm25Config {
    /// BM25 k1 parameter - term frequency saturation.
    /// Higher values give more weight to term frequency.
    /// Default: 1.2
    #[serde(default = "default_k1")]
    pub k1: f32,

    /// BM25 b parameter - document length normalization.
    /// 0 = no length normalization, 1 = full normalization.
    /// Default: 0.75
    #[serde(default = "default_b")]
    pub b: f32,

    /// Whether to apply Porter stemming to tokens.
    /// Default: true
    #[serde(default = "default_stemming")]
    pub stemming: bool,

    /// Whether to remove stop words during tokenization.
    /// Default: true
    #[serde(default = "default_remove_stopwords")]
    pub remove_stopwords: bool,

    /// Minimum token length to include.
    /// Default: 2
    #[serde(default = "default_min_token_length")]
    pub min_token_length: usize,
}

fn default_k1() -> f32 {
    1.2
}

fn default_b() -> f32 {
    0.75
}

fn default_stemming() -> bool {
    true
}

fn default_remove_stopwords() -> bool {
    true
}

fn default_min_token_length() -> usize {
    2
}

impl Default for Bm25Config {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            stemming: default_stemming(),
            remove_stopwords: default_remove_stopwords(),
            min_token_length: default_min_token_length(),
        }
    }
}

// ============================================================================
// Search results
// ============================================================================

/// Result from BM25 search.
///
/// `doc_idx` refers to insertion order in the index the search ran on; the
/// caller owns the mapping back to chunks.
#[derive(Debug, Clone)]
pub struct Bm25SearchResult {
    /// Index of the document in insertion order.
    pub doc_idx: usize,
    /// Raw BM25 score.
    pub score: f32,
    /// Rank in the result list (1-indexed).
    pub rank: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Bm25Config::default();
        assert!((config.k1 - 1.2).abs() < 0.001);
        assert!((config.b - 0.75).abs() < 0.001);
        assert!(config.stemming);
        assert!(config.remove_stopwords);
        assert_eq!(config.min_token_length, 2);
    }
}
