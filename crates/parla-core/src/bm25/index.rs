//! BM25 Inverted Index.
//!
//! Provides an inverted index optimized for BM25 scoring:
//! - Term → document postings with term frequencies
//! - Pre-computed document lengths and IDF values
//! - Fast query-time scoring
//!
//! Indexes here are built per query from a slice of chunk texts; documents
//! are addressed by insertion order, and the caller owns the mapping back
//! to chunks.

use std::collections::HashMap;

use super::scorer::{bm25_term_score, idf, Bm25Params};
use super::tokenizer::{Tokenizer, TokenizerConfig};
use super::{Bm25Config, Bm25SearchResult};

/// Statistics for a single document in the index.
#[derive(Debug, Clone)]
pub struct DocumentStats {
    /// Number of tokens in the document.
    pub length: usize,
}

/// Posting entry: document index and term frequency.
#[derive(Debug, Clone)]
struct Posting {
    /// Index into the documents array.
    doc_idx: usize,
    /// Term frequency in this document.
    term_freq: usize,
}

/// BM25 Inverted Index.
///
/// Stores:
/// - Vocabulary: term → (document frequency, postings)
/// - Documents: array of document stats
/// - Pre-computed average document length
#[derive(Debug, Clone)]
pub struct Bm25Index {
    /// BM25 parameters.
    params: Bm25Params,
    /// Tokenizer configuration (for query tokenization).
    tokenizer_config: TokenizerConfig,
    /// Term → (document_frequency, postings).
    inverted_index: HashMap<String, (usize, Vec<Posting>)>,
    /// Document statistics indexed by internal doc_idx.
    documents: Vec<DocumentStats>,
    /// Average document length.
    avg_doc_len: f32,
    /// Total number of tokens in the corpus.
    total_tokens: usize,
}

impl Bm25Index {
    /// Create a new empty BM25 index.
    pub fn new(config: Bm25Config) -> Self {
        let tokenizer_config = TokenizerConfig {
            stemming: config.stemming,
            remove_stopwords: config.remove_stopwords,
            min_token_length: config.min_token_length,
        };

        Self {
            params: Bm25Params {
                k1: config.k1,
                b: config.b,
            },
            tokenizer_config,
            inverted_index: HashMap::new(),
            documents: Vec::new(),
            avg_doc_len: 0.0,
            total_tokens: 0,
        }
    }

    /// Build an index over a slice of texts in one pass.
    pub fn from_texts<S: AsRef<str>>(config: Bm25Config, texts: &[S]) -> Self {
        let mut index = Self::new(config);
        for text in texts {
            index.add_document(text.as_ref());
        }
        index
    }

    /// Add a document to the index.
    ///
    /// # Returns
    ///
    /// The internal document index assigned to this document (insertion
    /// order).
    pub fn add_document(&mut self, text: &str) -> usize {
        let tokenizer = Tokenizer::new(self.tokenizer_config.clone());
        let tokens = tokenizer.tokenize(text);
        let doc_len = tokens.len();

        // Compute term frequencies for this document
        let mut term_freqs: HashMap<String, usize> = HashMap::new();
        for token in tokens {
            *term_freqs.entry(token).or_insert(0) += 1;
        }

        // Add document to documents array
        let doc_idx = self.documents.len();
        self.documents.push(DocumentStats { length: doc_len });

        // Update inverted index
        for (term, tf) in term_freqs {
            let entry = self.inverted_index.entry(term).or_insert((0, Vec::new()));
            entry.0 += 1; // Increment document frequency
            entry.1.push(Posting {
                doc_idx,
                term_freq: tf,
            });
        }

        // Update corpus statistics
        self.total_tokens += doc_len;
        self.avg_doc_len = self.total_tokens as f32 / self.documents.len() as f32;

        doc_idx
    }

    /// Search the index for documents matching the query.
    ///
    /// # Arguments
    ///
    /// * `query` - Query text
    /// * `top_k` - Maximum number of results to return
    ///
    /// # Returns
    ///
    /// Vector of search results sorted by BM25 score (descending).
    pub fn search(&self, query: &str, top_k: usize) -> Vec<Bm25SearchResult> {
        if self.documents.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let tokenizer = Tokenizer::new(self.tokenizer_config.clone());
        let query_tokens = tokenizer.tokenize(query);

        if query_tokens.is_empty() {
            return Vec::new();
        }

        // Collect query terms with their IDF values
        let num_docs = self.documents.len();
        let query_terms: Vec<(&str, f32)> = query_tokens
            .iter()
            .filter_map(|term| {
                self.inverted_index.get(term).map(|(df, _)| {
                    let idf_val = idf(num_docs, *df);
                    (term.as_str(), idf_val)
                })
            })
            .collect();

        if query_terms.is_empty() {
            return Vec::new();
        }

        // Score all documents that contain at least one query term
        let mut scores: HashMap<usize, f32> = HashMap::new();

        for (term, idf_val) in &query_terms {
            if let Some((_, postings)) = self.inverted_index.get(*term) {
                for posting in postings {
                    let doc_stats = &self.documents[posting.doc_idx];
                    let term_score = bm25_term_score(
                        posting.term_freq,
                        doc_stats.length,
                        self.avg_doc_len,
                        *idf_val,
                        &self.params,
                    );
                    *scores.entry(posting.doc_idx).or_insert(0.0) += term_score;
                }
            }
        }

        // Sort by score and take top_k
        let mut scored_docs: Vec<(usize, f32)> = scores.into_iter().collect();
        scored_docs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored_docs
            .into_iter()
            .take(top_k)
            .enumerate()
            .map(|(rank, (doc_idx, score))| Bm25SearchResult {
                doc_idx,
                score,
                rank: rank + 1, // 1-indexed
            })
            .collect()
    }

    /// Get the number of documents in the index.
    pub fn num_documents(&self) -> usize {
        self.documents.len()
    }

    /// Get the number of unique terms in the vocabulary.
    pub fn vocabulary_size(&self) -> usize {
        self.inverted_index.len()
    }

    /// Get the average document length.
    pub fn avg_doc_length(&self) -> f32 {
        self.avg_doc_len
    }

    /// Get document frequency for a term.
    pub fn document_frequency(&self, term: &str) -> usize {
        self.inverted_index
            .get(term)
            .map(|(df, _)| *df)
            .unwrap_or(0)
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Get index statistics for debugging/logging.
    pub fn stats(&self) -> Bm25IndexStats {
        Bm25IndexStats {
            num_documents: self.documents.len(),
            vocabulary_size: self.inverted_index.len(),
            total_tokens: self.total_tokens,
            avg_doc_length: self.avg_doc_len,
        }
    }
}

/// Statistics about the BM25 index.
#[derive(Debug, Clone)]
pub struct Bm25IndexStats {
    /// Number of documents indexed.
    pub num_documents: usize,
    /// Number of unique terms in vocabulary.
    pub vocabulary_size: usize,
    /// Total tokens across all documents.
    pub total_tokens: usize,
    /// Average document length.
    pub avg_doc_length: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_index() -> Bm25Index {
        Bm25Index::from_texts(
            Bm25Config::default(),
            &[
                "The quick brown fox jumps over the lazy dog",
                "Gold rallies when real rates fall",
                "The fox is quick and cunning in the forest",
                "Rate cuts drive gold and silver higher",
            ],
        )
    }

    #[test]
    fn test_add_document() {
        let mut index = Bm25Index::new(Bm25Config::default());
        let doc_idx = index.add_document("hello world");

        assert_eq!(doc_idx, 0);
        assert_eq!(index.num_documents(), 1);
        assert!(index.vocabulary_size() > 0);
    }

    #[test]
    fn test_search_basic() {
        let index = create_test_index();

        let results = index.search("fox", 10);

        assert!(!results.is_empty());
        // docs 0 and 2 contain "fox"
        let idxs: Vec<_> = results.iter().map(|r| r.doc_idx).collect();
        assert!(idxs.contains(&0) || idxs.contains(&2));
    }

    #[test]
    fn test_search_no_match() {
        let index = create_test_index();

        let results = index.search("nonexistentterm12345", 10);

        assert!(results.is_empty());
    }

    #[test]
    fn test_ranking_order() {
        let mut index = Bm25Index::new(Bm25Config::default());

        // Document with more occurrences of "gold" should rank higher
        index.add_document("gold gold gold gold rally");
        index.add_document("gold rally");
        index.add_document("equity rally");

        let results = index.search("gold", 10);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].doc_idx, 0);
        assert_eq!(results[1].doc_idx, 1);
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_top_k_limit() {
        let mut index = Bm25Index::new(Bm25Config::default());

        for _ in 0..100 {
            index.add_document("test document content");
        }

        let results = index.search("test", 5);
        assert_eq!(results.len(), 5);

        let results_all = index.search("test", 1000);
        assert_eq!(results_all.len(), 100);
    }

    #[test]
    fn test_rank_values() {
        let index = create_test_index();
        let results = index.search("fox", 10);

        // Ranks should be 1-indexed and sequential
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.rank, i + 1);
        }
    }

    #[test]
    fn test_stats() {
        let index = create_test_index();
        let stats = index.stats();

        assert_eq!(stats.num_documents, 4);
        assert!(stats.vocabulary_size > 0);
        assert!(stats.total_tokens > 0);
        assert!(stats.avg_doc_length > 0.0);
    }

    #[test]
    fn test_document_frequency() {
        let index = create_test_index();

        // "gold" appears in 2 documents (after stemming)
        let df = index.document_frequency("gold");
        assert!(df >= 2);

        let df_none = index.document_frequency("nonexistent");
        assert_eq!(df_none, 0);
    }

    #[test]
    fn test_empty_query() {
        let index = create_test_index();
        assert!(index.search("", 10).is_empty());
        assert!(index.search("the of and", 10).is_empty()); // all stopwords
    }
}
