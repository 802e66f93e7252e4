//! Error types for parla-core.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-specific errors for parla operations.
#[derive(Error, Debug)]
pub enum ParlaError {
    /// Engine configuration file not found.
    #[error("Engine config not found at {0}")]
    MissingEngineConfig(String),

    /// Engine configuration file is invalid.
    #[error("Engine config invalid: {0}")]
    InvalidEngineConfig(String),

    /// A stage configuration file is missing.
    ///
    /// Stage configs are deployment artifacts; their absence is fatal at
    /// construction time, never papered over with defaults.
    #[error("Stage config `{stage}` not found at `{path}`")]
    MissingStageConfig {
        /// The stage whose config is missing.
        stage: &'static str,
        /// Expected path of the config file.
        path: PathBuf,
    },

    /// A stage configuration file exists but cannot be parsed or lacks
    /// required keys.
    #[error("Stage config `{stage}` invalid at `{path}`: {reason}")]
    InvalidStageConfig {
        /// The stage whose config is invalid.
        stage: &'static str,
        /// Path of the config file.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// Invalid argument provided to an operation.
    #[error("{0}")]
    InvalidArgument(String),

    // =========================================================================
    // Corpus / shard errors
    // =========================================================================
    /// The corpus root for a profile does not exist.
    #[error("Corpus root not found for profile `{profile}` at `{path}`")]
    CorpusRootNotFound {
        /// The profile being searched.
        profile: String,
        /// The expected corpus directory.
        path: PathBuf,
    },

    /// A shard failed to load.
    ///
    /// Callers treat this as skip-and-continue: one corrupt shard never
    /// fails the whole search.
    #[error("Shard load error at `{path}`: {reason}")]
    ShardLoad {
        /// Path to the shard directory.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Shard parallel arrays have mismatched lengths.
    #[error("Shard `{path}` is inconsistent: {chunks} chunks, {metadata} metadata entries, {embeddings} embedding rows")]
    ShardShapeMismatch {
        /// Path to the shard directory.
        path: PathBuf,
        /// Number of chunk texts.
        chunks: usize,
        /// Number of metadata entries.
        metadata: usize,
        /// Number of embedding rows.
        embeddings: usize,
    },

    /// Shard embeddings do not match the configured dense index.
    #[error("Shard `{path}` incompatible with dense index config: {reason}")]
    ShardIndexIncompatible {
        /// Path to the shard directory.
        path: PathBuf,
        /// Reason for incompatibility.
        reason: String,
    },

    // =========================================================================
    // Legacy vectorstore errors
    // =========================================================================
    /// Legacy flat vectorstore I/O error.
    #[error("Vectorstore I/O error at `{path}`: {reason}")]
    VectorstoreIo {
        /// Path to the store file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Legacy flat vectorstore parse error.
    #[error("Vectorstore parse error at `{path}`: {reason}")]
    VectorstoreParse {
        /// Path to the store file.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// Legacy vectorstore is incompatible with the configured dense index.
    #[error("Vectorstore at `{path}` incompatible: {reason}")]
    VectorstoreIncompatible {
        /// Path to the store.
        path: PathBuf,
        /// Reason for incompatibility.
        reason: String,
    },

    // =========================================================================
    // Stage errors (typed degradation outcomes)
    // =========================================================================
    /// Query embedding failed; dense retrieval for the turn degrades.
    #[error("Failed to embed query `{query}`: {reason}")]
    QueryEmbedding {
        /// The query that failed to embed (truncated by caller as needed).
        query: String,
        /// Description of the failure.
        reason: String,
    },

    // =========================================================================
    // Session / orchestration errors
    // =========================================================================
    /// The language-model call for the final answer failed.
    #[error("Responder call failed: {reason}")]
    ResponderFailed {
        /// Description of the failure.
        reason: String,
    },

    /// Debug dump log I/O error.
    #[error("Retrieval dump I/O error at {path}: {reason}")]
    DumpIo {
        /// The dump file path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Model-layer error.
    #[error("Model error: {0}")]
    Model(#[from] parla_model::ModelError),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
