//! # parla-model
//!
//! ML/LLM inference layer for parla.
//!
//! This crate is the **single source of truth** for model inference in parla.
//! It provides:
//!
//! - **Embedding models**: Bi-encoder models for generating text embeddings
//! - **Cross-encoder models**: Joint (query, document) relevance scoring
//! - **Reader models**: Extractive QA span proposals over short contexts
//! - **Chat models**: Text-in/text-out conversational completion
//! - **Model locator**: Runtime path resolution for disk-based models
//!
//! ## Design Principles
//!
//! 1. **Production-only**: No mock implementations. Test doubles live in
//!    consuming crates.
//! 2. **Local-first**: Default is embedded Candle inference with disk-based
//!    models.
//! 3. **Provider-agnostic**: Traits don't leak Candle or HTTP internals, so
//!    the inference engine is swappable without touching pipeline logic.
//! 4. **Models as disk assets**: Models ship with the release, not in the
//!    binary.
//!
//! ## Model Location
//!
//! Models are searched in this order:
//! 1. `$PARLA_MODELS_DIR` environment variable
//! 2. `~/.parla/models` user directory
//! 3. `{exe_dir}/models` next to the binary
//!
//! ## Features
//!
//! - `embedded` (default): Local Candle inference with disk-based models
//! - `remote`: HTTP chat-completions backend
//!
//! ## Usage
//!
//! ```ignore
//! use parla_model::{EmbeddingModel, create_embedding_model, EmbeddingConfig};
//!
//! let config = EmbeddingConfig::default();
//! let model = create_embedding_model(&config)?;
//!
//! let embeddings = model.embed(&["Hello, world!"])?;
//! assert_eq!(embeddings[0].len(), model.dimension());
//! ```

pub mod config;
pub mod error;
pub mod model_locator;

#[cfg(feature = "embedded")]
mod embedding;

#[cfg(feature = "embedded")]
mod cross_encoder;

#[cfg(feature = "embedded")]
mod span;

#[cfg(feature = "remote")]
mod chat;

// Re-export error types
pub use error::{ModelError, ModelResult};

// Re-export config types (canonical source of truth)
pub use config::{
    ChatConfig, CrossEncoderConfig, DevicePreference, EmbeddingConfig, HuggingFaceModelConfig,
    ModelArchitecture, ModelInfo, ReaderConfig,
};

// Re-export model locator
pub use model_locator::{
    default_locator, ModelLocator, CROSS_ENCODERS_SUBDIR, DEFAULT_CROSS_ENCODER_MODEL_NAME,
    DEFAULT_EMBEDDING_MODEL_NAME, DEFAULT_READER_MODEL_NAME, EMBEDDINGS_SUBDIR,
    PARLA_MODELS_DIR_ENV, READERS_SUBDIR, REQUIRED_MODEL_FILES,
};

// Default model IDs (full HuggingFace identifiers)
pub const DEFAULT_EMBEDDING_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_CROSS_ENCODER_MODEL_ID: &str = "cross-encoder/ms-marco-MiniLM-L6-v2";
pub const DEFAULT_READER_MODEL_ID: &str = "deepset/minilm-uncased-squad2";

// ============================================================================
// Embedding Model Trait
// ============================================================================

/// Trait for embedding models (bi-encoders).
///
/// Generates dense vector embeddings from text inputs. These embeddings
/// can be used for semantic search via cosine similarity.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to allow use across threads.
pub trait EmbeddingModel: Send + Sync + std::fmt::Debug {
    /// Generate embeddings for a batch of texts.
    ///
    /// # Arguments
    ///
    /// * `texts` - Slice of text strings to embed
    ///
    /// # Returns
    ///
    /// A vector of embeddings, one per input text.
    /// Each embedding is a normalized f32 vector of length `dimension()`.
    fn embed(&self, texts: &[&str]) -> ModelResult<Vec<Vec<f32>>>;

    /// Generate embeddings for owned strings.
    ///
    /// Convenience method that calls `embed` with string slices.
    fn embed_batch(&self, texts: &[String]) -> ModelResult<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(|s| s.as_str()).collect();
        self.embed(&refs)
    }

    /// Warm up the model by running a dummy inference.
    ///
    /// This pre-loads weights and triggers any JIT compilation.
    fn warm_up(&self) -> ModelResult<()> {
        let _ = self.embed(&["warmup"])?;
        Ok(())
    }

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;

    /// Get the maximum sequence length supported.
    fn max_sequence_length(&self) -> usize;

    /// Get model information (ID, dimension, architecture).
    fn model_info(&self) -> &ModelInfo;

    /// Get the model ID.
    fn model_id(&self) -> &str {
        &self.model_info().model_id
    }
}

// ============================================================================
// Cross-Encoder Model Trait
// ============================================================================

/// Trait for cross-encoder models.
///
/// Scores (query, document) pairs jointly, as opposed to comparing
/// independent embeddings. Higher scores indicate more relevant documents.
///
/// The pipeline uses this capability twice: as a per-shard relevance filter
/// inside dense retrieval and as the final reranking stage.
pub trait CrossEncoderModel: Send + Sync + std::fmt::Debug {
    /// Score a batch of documents against a query.
    ///
    /// # Returns
    ///
    /// Relevance scores in the same order as documents.
    /// Higher scores = more relevant.
    fn score_batch(&self, query: &str, documents: &[String]) -> ModelResult<Vec<f32>>;

    /// Rerank documents and return sorted indices with scores.
    ///
    /// # Returns
    ///
    /// `Vec<(original_index, score)>` sorted by score descending.
    fn rerank(&self, query: &str, documents: &[String]) -> ModelResult<Vec<(usize, f32)>> {
        let scores = self.score_batch(query, documents)?;
        let mut indexed: Vec<_> = scores.into_iter().enumerate().collect();
        indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(indexed)
    }

    /// Warm up the model.
    fn warm_up(&self) -> ModelResult<()> {
        let _ = self.score_batch("warmup", &["warmup doc".to_string()])?;
        Ok(())
    }

    /// Get the model ID.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Reader Model Trait
// ============================================================================

/// A single span proposed by a reader model.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanProposal {
    /// The literal answer text extracted from the context.
    pub text: String,
    /// Confidence score in [0, 1].
    pub score: f32,
}

/// Trait for extractive QA reader models.
///
/// Given a question and a short context window, proposes up to `top_k`
/// literal answer spans from the context.
pub trait ReaderModel: Send + Sync + std::fmt::Debug {
    /// Propose answer spans for the question inside the context window.
    ///
    /// Returns at most `top_k` proposals ordered by descending score. An
    /// empty vector means the model found no answer in the window.
    fn propose_spans(
        &self,
        question: &str,
        context: &str,
        top_k: usize,
    ) -> ModelResult<Vec<SpanProposal>>;

    /// Get the model ID.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Chat Model Trait
// ============================================================================

/// A single message in a chat exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    /// "system", "user", or "assistant".
    pub role: String,
    /// Message content.
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Trait for conversational completion backends.
///
/// Calls are blocking and bounded by the backend's configured timeout; a
/// timed-out call surfaces as `ModelError::ChatFailed` and is treated by
/// callers as that stage's failure path.
pub trait ChatModel: Send + Sync + std::fmt::Debug {
    /// Produce a completion for the given message history.
    fn complete(&self, messages: &[ChatMessage]) -> ModelResult<String>;

    /// Get the model ID.
    fn model_id(&self) -> &str;
}

// ============================================================================
// Factory Functions
// ============================================================================

/// Create an embedding model from configuration.
///
/// # Errors
///
/// Returns `ModelError` if model loading fails.
#[cfg(feature = "embedded")]
pub fn create_embedding_model(config: &EmbeddingConfig) -> ModelResult<Box<dyn EmbeddingModel>> {
    let model = embedding::CandleEmbeddingModel::new(config)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "embedded"))]
pub fn create_embedding_model(_config: &EmbeddingConfig) -> ModelResult<Box<dyn EmbeddingModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: "candle".to_string(),
        reason: "No embedding providers available. Enable the 'embedded' feature.".to_string(),
    })
}

/// Create a cross-encoder model from configuration.
///
/// # Errors
///
/// Returns `ModelError` if model loading fails.
#[cfg(feature = "embedded")]
pub fn create_cross_encoder_model(
    config: &CrossEncoderConfig,
) -> ModelResult<Box<dyn CrossEncoderModel>> {
    let model = cross_encoder::CandleCrossEncoderModel::new(config)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "embedded"))]
pub fn create_cross_encoder_model(
    _config: &CrossEncoderConfig,
) -> ModelResult<Box<dyn CrossEncoderModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: "candle".to_string(),
        reason: "No cross-encoder providers available. Enable the 'embedded' feature.".to_string(),
    })
}

/// Create a reader model from configuration.
///
/// # Errors
///
/// Returns `ModelError` if model loading fails.
#[cfg(feature = "embedded")]
pub fn create_reader_model(config: &ReaderConfig) -> ModelResult<Box<dyn ReaderModel>> {
    let model = span::CandleReaderModel::new(config)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "embedded"))]
pub fn create_reader_model(_config: &ReaderConfig) -> ModelResult<Box<dyn ReaderModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: "candle".to_string(),
        reason: "No reader providers available. Enable the 'embedded' feature.".to_string(),
    })
}

/// Create a chat model from configuration.
///
/// # Errors
///
/// Returns `ModelError` if the backend cannot be constructed.
#[cfg(feature = "remote")]
pub fn create_chat_model(config: &ChatConfig) -> ModelResult<Box<dyn ChatModel>> {
    let model = chat::HttpChatModel::new(config)?;
    Ok(Box::new(model))
}

#[cfg(not(feature = "remote"))]
pub fn create_chat_model(_config: &ChatConfig) -> ModelResult<Box<dyn ChatModel>> {
    Err(ModelError::ProviderNotAvailable {
        provider: "http".to_string(),
        reason: "No chat providers available. Enable the 'remote' feature.".to_string(),
    })
}

// ============================================================================
// Re-export implementations (feature-gated)
// ============================================================================

#[cfg(feature = "embedded")]
pub use cross_encoder::CandleCrossEncoderModel;

#[cfg(feature = "embedded")]
pub use embedding::CandleEmbeddingModel;

#[cfg(feature = "embedded")]
pub use span::CandleReaderModel;

#[cfg(feature = "remote")]
pub use chat::HttpChatModel;
