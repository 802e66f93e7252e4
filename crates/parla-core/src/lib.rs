//! # parla-core
//!
//! Core engine for **parla**: a hybrid retrieval-and-reranking pipeline
//! with a conversational routing layer on top.
//!
//! Per user turn, the orchestrator resumes or detects an action intent,
//! otherwise retrieves from a sharded document corpus (dense + BM25),
//! fuses and filters the candidates, optionally extracts salient spans,
//! reranks with a cross-encoder, compresses the context with MMR, and
//! decides between a retrieval-grounded answer and a prompt-only fallback.
//!
//! ## Main Types
//!
//! - [`ParlaEngine`] - config-to-orchestrator composition root
//! - [`RetrievalPipeline`] - the multi-stage retrieval pipeline
//! - [`Orchestrator`] - the per-turn routing state machine
//! - [`ParlaError`] - domain-specific error type
//!
//! ## Modules
//!
//! - [`chunk`] - chunks and candidate sets
//! - [`shard`] - the shard-on-disk corpus format
//! - [`bm25`] - lexical retrieval internals
//! - [`retrieval`] - the pipeline stages
//! - [`query`] - intent classification, rewriting, expansion
//! - [`session`] / [`intent`] / [`orchestrator`] - the conversational layer
//!
//! ## Example
//!
//! ```ignore
//! use parla_core::{EngineConfigSet, IntentRegistry, ParlaEngine};
//! use std::path::Path;
//!
//! let configs = EngineConfigSet::load(Path::new("/etc/parla"))?;
//! let chat = parla_model::create_chat_model(&Default::default())?;
//! let engine = ParlaEngine::new(configs, IntentRegistry::new(), chat.into())?;
//!
//! let reply = engine.handle_turn("session-1", "What moved gold this week?");
//! println!("[{}] {}", reply.decision.as_str(), reply.answer);
//! ```

// Modules
pub mod bm25;
pub mod chunk;
pub mod config;
pub mod dump;
pub mod engine;
pub mod errors;
pub mod intent;
pub mod orchestrator;
pub mod pipeline;
pub mod query;
pub mod retrieval;
pub mod session;
pub mod shard;
pub mod vectorstore;

// Re-exports for convenience
pub use bm25::{Bm25Config, Bm25Index, Bm25SearchResult};
pub use chunk::{normalize_text, CandidateSet, Chunk, ChunkScores, ChunkSource};
pub use config::{
    CompressionConfig, DedupConfig, DenseIndexConfig, DevicePreference, DumpConfig, EngineConfig,
    RetrievalBudgets, SelfGatingConfig, SsiConfig, StageSwitches,
};
pub use dump::RetrievalDump;
pub use engine::{
    EngineConfigSet, ParlaEngine, COMPRESSION_CONFIG_FILENAME, DEDUP_CONFIG_FILENAME,
    DENSE_INDEX_CONFIG_FILENAME, ENGINE_CONFIG_FILENAME, RERANKERS_CONFIG_FILENAME,
    SSI_CONFIG_FILENAME,
};
pub use errors::ParlaError;
pub use intent::{ActionIntent, IntentFlag, IntentKind, IntentRegistry, IntentResponse};
pub use orchestrator::{Orchestrator, RoutingDecision, TurnMetrics, TurnReply};
pub use pipeline::{
    PipelineComponents, PipelineOutcome, RetrievalPipeline, DEFAULT_DOMINANCE_Z_THRESHOLD,
};
pub use query::{QueryClassifier, QueryExpander, QueryIntent, QueryRewriter, StageFlags};
pub use retrieval::{
    dominance_filter, fuse_candidates, ContextCompressor, DedupOutcome, DenseRetriever,
    Deduplicator, LexicalRetriever, Reranker, SalientSpanExtractor,
};
pub use session::{Session, SessionStore, TurnRole};
pub use shard::{
    discover_shards, load_shard, ShardData, CHUNKS_FILENAME, EMBEDDINGS_FILENAME,
    METADATA_FILENAME,
};
pub use vectorstore::{
    load_flat_vectorstore, save_flat_vectorstore, FlatStoreEntry, FlatVectorstore,
    INDEX_FILENAME as VECTORSTORE_INDEX_FILENAME, MISSING_CHUNK_TEXT,
    STORE_FILENAME as VECTORSTORE_STORE_FILENAME,
};
