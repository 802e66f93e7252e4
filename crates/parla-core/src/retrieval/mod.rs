//! The multi-stage hybrid retrieval pipeline stages.
//!
//! Stage order for one query:
//!
//! ```text
//! Query
//!   │
//!   ├──► Dense Retrieval (per shard: inner-product search + relevance filter)
//!   │        └──► flattened dense candidates
//!   │
//!   └──► Lexical Retrieval (per shard BM25, then a global BM25 pass)
//!            └──► lexical candidates
//!                      │
//!                      ▼
//!              Budgeted Fusion (lexical first, dedup by identity)
//!                      │
//!                      ▼
//!              Dominance Filter (optional z-score narrowing)
//!                      │
//!                      ▼
//!              Dedup → SSI (self-gated) → Cross-Encoder Rerank
//!                      │
//!                      ▼
//!              MMR Context Compression
//! ```
//!
//! Every stage is defensive: empty or malformed input passes through
//! unchanged, and model failures degrade the stage, never the turn.

mod compression;
mod dedup;
mod dense;
mod dominance;
mod fusion;
mod lexical;
mod rerank;
mod ssi;

pub use compression::ContextCompressor;
pub use dedup::{DedupOutcome, Deduplicator};
pub use dense::DenseRetriever;
pub use dominance::dominance_filter;
pub use fusion::fuse_candidates;
pub use lexical::LexicalRetriever;
pub use rerank::Reranker;
pub use ssi::SalientSpanExtractor;
