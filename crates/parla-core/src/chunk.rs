//! Retrieval data model: chunks and candidate sets.
//!
//! A [`Chunk`] is the immutable unit of retrievable text; a
//! [`CandidateSet`] is the value threaded through the pipeline stages for
//! one query. Stages take a set and return a new one - no stage mutates its
//! input, so toggling stages on and off can never leak state between runs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Which retriever produced a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSource {
    /// Dense (embedding) retrieval.
    Dense,
    /// Lexical (BM25) retrieval.
    Lexical,
    /// Produced by span extraction from a retrieved chunk.
    Span,
}

impl std::fmt::Display for ChunkSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dense => write!(f, "DENSE"),
            Self::Lexical => write!(f, "BM25"),
            Self::Span => write!(f, "SPAN"),
        }
    }
}

/// Per-stage retrieval scores attached to a chunk.
///
/// Each field is written once by the stage that owns it; later stages only
/// read earlier scores.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkScores {
    /// Dense cosine similarity (1 - distance), set by the dense retriever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_similarity: Option<f32>,

    /// Raw BM25 score, set by the lexical retriever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lexical_score: Option<f32>,

    /// Cross-encoder score, set by the reranking stage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,

    /// Score used by the dominance filter; mirrors the producing
    /// retriever's raw score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominance_score: Option<f32>,

    /// Reader confidence, set by span extraction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_score: Option<f32>,
}

/// A single retrieved chunk of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// The chunk text.
    pub text: String,

    /// Name of the shard this chunk came from.
    pub shard: String,

    /// Which retriever produced it.
    pub source: ChunkSource,

    /// Arbitrary metadata carried from the shard's metadata.json entry.
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// Retrieval scores accumulated through the pipeline.
    #[serde(default)]
    pub scores: ChunkScores,
}

impl Chunk {
    /// Create a chunk with empty metadata and scores.
    pub fn new(text: impl Into<String>, shard: impl Into<String>, source: ChunkSource) -> Self {
        Self {
            text: text.into(),
            shard: shard.into(),
            source,
            metadata: Map::new(),
            scores: ChunkScores::default(),
        }
    }

    /// Canonical identity key for fusion/dedup.
    ///
    /// Prefers the explicit per-chunk identity (`source` document +
    /// `chunk_id` metadata); falls back to whitespace-normalized text when
    /// the metadata does not carry one.
    pub fn canonical_key(&self) -> String {
        let doc = self
            .metadata
            .get("source")
            .or_else(|| self.metadata.get("source_pdf"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let chunk_id = self.metadata.get("chunk_id").map(|v| v.to_string());

        if let Some(id) = chunk_id {
            format!("{}__{}", doc, id)
        } else {
            normalize_text(&self.text)
        }
    }

    /// The score the dominance filter sorts by.
    pub fn dominance_score(&self) -> f32 {
        self.scores.dominance_score.unwrap_or(0.0)
    }

    /// First 120 characters of the text, newlines flattened, for dump logs.
    pub fn preview(&self) -> String {
        let flat = self.text.replace(['\n', '\r'], " ");
        let mut preview: String = flat.chars().take(120).collect();
        if flat.chars().count() > 120 {
            preview.push_str("...");
        }
        preview
    }
}

/// Whitespace-normalized lowercase text, used as the fallback identity key.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

// ============================================================================
// CandidateSet
// ============================================================================

/// The list of chunks threaded through the pipeline stages for one query.
///
/// Ordering is significant after reranking/compression, insignificant
/// before.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateSet(Vec<Chunk>);

impl CandidateSet {
    /// Create an empty candidate set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Number of candidates.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the chunks.
    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.0.iter()
    }

    /// Access the chunks as a slice.
    pub fn as_slice(&self) -> &[Chunk] {
        &self.0
    }

    /// Consume the set and return the chunks.
    pub fn into_vec(self) -> Vec<Chunk> {
        self.0
    }

    /// Total character length of all candidate texts.
    pub fn total_text_len(&self) -> usize {
        self.0.iter().map(|c| c.text.len()).sum()
    }

    /// Best dense similarity across the set, if any chunk carries one.
    pub fn best_dense_similarity(&self) -> Option<f32> {
        self.0
            .iter()
            .filter_map(|c| c.scores.dense_similarity)
            .fold(None, |acc, s| Some(acc.map_or(s, |a: f32| a.max(s))))
    }

    /// Best lexical score across the set, if any chunk carries one.
    pub fn best_lexical_score(&self) -> Option<f32> {
        self.0
            .iter()
            .filter_map(|c| c.scores.lexical_score)
            .fold(None, |acc, s| Some(acc.map_or(s, |a: f32| a.max(s))))
    }
}

impl From<Vec<Chunk>> for CandidateSet {
    fn from(chunks: Vec<Chunk>) -> Self {
        Self(chunks)
    }
}

impl FromIterator<Chunk> for CandidateSet {
    fn from_iter<T: IntoIterator<Item = Chunk>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for CandidateSet {
    type Item = Chunk;
    type IntoIter = std::vec::IntoIter<Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a Chunk;
    type IntoIter = std::slice::Iter<'a, Chunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk_with_meta(text: &str, meta: &[(&str, Value)]) -> Chunk {
        let mut chunk = Chunk::new(text, "shard-a", ChunkSource::Dense);
        for (k, v) in meta {
            chunk.metadata.insert(k.to_string(), v.clone());
        }
        chunk
    }

    #[test]
    fn test_canonical_key_prefers_explicit_id() {
        let a = chunk_with_meta(
            "some text",
            &[("source", json!("report.pdf")), ("chunk_id", json!(7))],
        );
        let b = chunk_with_meta(
            "different text entirely",
            &[("source", json!("report.pdf")), ("chunk_id", json!(7))],
        );
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_canonical_key_falls_back_to_text() {
        let a = chunk_with_meta("The  Quick\nBrown Fox", &[]);
        let b = chunk_with_meta("the quick brown fox", &[]);
        assert_eq!(a.canonical_key(), b.canonical_key());
    }

    #[test]
    fn test_preview_truncates() {
        let chunk = Chunk::new("x".repeat(500), "s", ChunkSource::Lexical);
        let preview = chunk.preview();
        assert!(preview.len() <= 123);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_best_dense_similarity() {
        let mut a = Chunk::new("a", "s", ChunkSource::Dense);
        a.scores.dense_similarity = Some(0.4);
        let mut b = Chunk::new("b", "s", ChunkSource::Dense);
        b.scores.dense_similarity = Some(0.9);
        let c = Chunk::new("c", "s", ChunkSource::Lexical);

        let set = CandidateSet::from(vec![a, b, c]);
        assert_eq!(set.best_dense_similarity(), Some(0.9));
    }

    #[test]
    fn test_best_dense_similarity_none() {
        let set = CandidateSet::from(vec![Chunk::new("a", "s", ChunkSource::Lexical)]);
        assert_eq!(set.best_dense_similarity(), None);
    }
}
