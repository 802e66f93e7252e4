//! Engine composition root.
//!
//! [`ParlaEngine`] wires configuration to the pipeline and orchestrator:
//! it loads every config (fail-fast), constructs the model backends, and
//! exposes [`ParlaEngine::handle_turn`]. Construction is the only place an
//! invalid deployment can fail; once an engine exists, turns never error.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use parla_model::{
    create_cross_encoder_model, create_embedding_model, create_reader_model, ChatModel,
    CrossEncoderConfig, DevicePreference, EmbeddingConfig, ModelResult, ReaderConfig, ReaderModel,
    SpanProposal,
};

use crate::bm25::Bm25Config;
use crate::config::{
    CompressionConfig, DedupConfig, DenseIndexConfig, EngineConfig, RetrievalBudgets, SsiConfig,
};
use crate::errors::ParlaError;
use crate::intent::IntentRegistry;
use crate::orchestrator::{Orchestrator, TurnReply};
use crate::pipeline::{PipelineComponents, RetrievalPipeline, DEFAULT_DOMINANCE_Z_THRESHOLD};
use crate::query::{QueryClassifier, QueryExpander, QueryRewriter};
use crate::retrieval::{
    ContextCompressor, DenseRetriever, Deduplicator, LexicalRetriever, Reranker,
    SalientSpanExtractor,
};
use crate::session::SessionStore;

/// Engine config file name inside the config directory.
pub const ENGINE_CONFIG_FILENAME: &str = "engine.yaml";

/// Stage config file names inside the config directory.
pub const RERANKERS_CONFIG_FILENAME: &str = "rerankers.json";
pub const COMPRESSION_CONFIG_FILENAME: &str = "compression.json";
pub const SSI_CONFIG_FILENAME: &str = "ssi.json";
pub const DENSE_INDEX_CONFIG_FILENAME: &str = "dense_index.json";
pub const DEDUP_CONFIG_FILENAME: &str = "dedup.json";

// ============================================================================
// EngineConfigSet
// ============================================================================

/// All configuration an engine needs, loaded and validated together.
#[derive(Debug, Clone)]
pub struct EngineConfigSet {
    /// Engine-level YAML config.
    pub engine: EngineConfig,
    /// Retrieval/fusion budgets.
    pub budgets: RetrievalBudgets,
    /// MMR compression settings.
    pub compression: CompressionConfig,
    /// Span extraction settings.
    pub ssi: SsiConfig,
    /// Dense index settings.
    pub dense_index: DenseIndexConfig,
    /// Dedup settings.
    pub dedup: DedupConfig,
}

impl EngineConfigSet {
    /// Load every config from a directory, failing on the first problem.
    ///
    /// Missing files, sections, or keys are fatal here - a deployment with
    /// half a config must not serve queries.
    pub fn load(config_dir: &Path) -> Result<Self, ParlaError> {
        let engine = EngineConfig::from_path(&config_dir.join(ENGINE_CONFIG_FILENAME))?;
        let budgets = RetrievalBudgets::from_path(&config_dir.join(RERANKERS_CONFIG_FILENAME))?;
        let compression =
            CompressionConfig::from_path(&config_dir.join(COMPRESSION_CONFIG_FILENAME))?;
        let ssi = SsiConfig::from_path(&config_dir.join(SSI_CONFIG_FILENAME))?;
        let dense_index =
            DenseIndexConfig::from_path(&config_dir.join(DENSE_INDEX_CONFIG_FILENAME))?;
        let dedup = DedupConfig::from_path(&config_dir.join(DEDUP_CONFIG_FILENAME))?;

        Ok(Self {
            engine,
            budgets,
            compression,
            ssi,
            dense_index,
            dedup,
        })
    }
}

// ============================================================================
// ParlaEngine
// ============================================================================

/// The assembled engine: pipeline + orchestrator + session store.
pub struct ParlaEngine {
    orchestrator: Orchestrator,
}

impl std::fmt::Debug for ParlaEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParlaEngine").finish()
    }
}

impl ParlaEngine {
    /// Assemble an engine from loaded configs, a startup-resolved intent
    /// registry, and a chat backend.
    ///
    /// Model backends are constructed here; any missing model is a fatal
    /// construction error.
    pub fn new(
        configs: EngineConfigSet,
        registry: IntentRegistry,
        chat: Arc<dyn ChatModel>,
    ) -> Result<Self, ParlaError> {
        let device = configs.engine.device;

        // Dense embedding backend (query encoding).
        let embedder: Arc<dyn parla_model::EmbeddingModel> = Arc::from(create_embedding_model(
            &EmbeddingConfig {
                model_id: configs.dense_index.embedding_model.clone(),
                device,
                ..EmbeddingConfig::default()
            },
        )?);

        // Per-shard relevance filter.
        let chunk_filter: Arc<dyn parla_model::CrossEncoderModel> =
            Arc::from(create_cross_encoder_model(&CrossEncoderConfig {
                model_id: configs.budgets.chunk_filter_model.clone(),
                device,
                ..CrossEncoderConfig::default()
            })?);

        // Final reranking cross-encoder.
        let rerank_model: Arc<dyn parla_model::CrossEncoderModel> =
            Arc::from(create_cross_encoder_model(&CrossEncoderConfig {
                device,
                ..CrossEncoderConfig::default()
            })?);

        // Compression embedder: reuse the dense backend when the model is
        // the same (or compression is off and the backend is never used).
        let compression_embedder: Arc<dyn parla_model::EmbeddingModel> = if !configs
            .compression
            .enabled
            || configs.compression.model == configs.dense_index.embedding_model
        {
            Arc::clone(&embedder)
        } else {
            Arc::from(create_embedding_model(&EmbeddingConfig {
                model_id: configs.compression.model.clone(),
                device: parse_device(&configs.compression.device)?,
                ..EmbeddingConfig::default()
            })?)
        };

        // Span reader, only when the stage can run at all.
        let reader: Arc<dyn ReaderModel> = if configs.ssi.enabled && configs.engine.switches.ssi {
            Arc::from(create_reader_model(&ReaderConfig {
                model_id: configs.ssi.model_name.clone(),
                device: parse_device(&configs.ssi.device)?,
                max_answer_length: configs.ssi.max_answer_length,
                handle_impossible_answer: configs.ssi.handle_impossible_answer,
                ..ReaderConfig::default()
            })?)
        } else {
            Arc::new(InertReader)
        };

        let components = PipelineComponents {
            profile_root: configs.engine.profile_root(),
            switches: configs.engine.switches,
            budgets: configs.budgets.clone(),
            dump: configs.engine.dump.clone(),
            dominance_z_threshold: Some(DEFAULT_DOMINANCE_Z_THRESHOLD),
            classifier: QueryClassifier::new(Arc::clone(&chat)),
            rewriter: QueryRewriter::new(Arc::clone(&chat)),
            expander: QueryExpander::new(Arc::clone(&chat)),
            dense: DenseRetriever::new(
                configs.dense_index.clone(),
                &configs.budgets,
                Arc::clone(&embedder),
                chunk_filter,
            ),
            lexical: LexicalRetriever::new(configs.budgets.top_k_lexical, Bm25Config::default()),
            deduper: Deduplicator::new(configs.dedup.clone()),
            ssi: SalientSpanExtractor::new(configs.ssi.clone(), reader),
            reranker: Reranker::new(configs.budgets.top_k_fusion, rerank_model),
            compressor: ContextCompressor::new(configs.compression.clone(), compression_embedder),
        };

        let orchestrator = Orchestrator::new(
            RetrievalPipeline::new(components),
            registry,
            Arc::new(SessionStore::new()),
            chat,
            configs.engine.retrieval_score_threshold,
        );

        info!(
            profile = configs.engine.profile.as_str(),
            threshold = configs.engine.retrieval_score_threshold,
            "Engine assembled"
        );

        Ok(Self { orchestrator })
    }

    /// Handle one user turn.
    pub fn handle_turn(&self, session_id: &str, user_text: &str) -> TurnReply {
        self.orchestrator.handle_turn(session_id, user_text)
    }

    /// The underlying orchestrator (for host integrations).
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }
}

fn parse_device(raw: &str) -> Result<DevicePreference, ParlaError> {
    raw.parse()
        .map_err(|e: String| ParlaError::InvalidConfiguration {
            message: e,
            hint: "Use 'auto', 'gpu', or 'cpu'".to_string(),
        })
}

/// Reader used when span extraction is disabled: never proposes anything.
#[derive(Debug)]
struct InertReader;

impl ReaderModel for InertReader {
    fn propose_spans(
        &self,
        _question: &str,
        _context: &str,
        _top_k: usize,
    ) -> ModelResult<Vec<SpanProposal>> {
        Ok(Vec::new())
    }

    fn model_id(&self) -> &str {
        "inert"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_configs(dir: &Path) {
        fs::write(
            dir.join(ENGINE_CONFIG_FILENAME),
            "corpus_root: /var/parla\nprofile: research\n",
        )
        .unwrap();
        fs::write(
            dir.join(RERANKERS_CONFIG_FILENAME),
            r#"{"rerankers": {"top_k_dense": 8, "top_k_lexical": 12, "top_k_fusion": 10,
                "fusion_top_dense": 40, "fusion_top_lexical": 8, "top_chunks_per_shard": 3,
                "chunk_filter_model": "cross-encoder/ms-marco-MiniLM-L6-v2"}}"#,
        )
        .unwrap();
        fs::write(
            dir.join(COMPRESSION_CONFIG_FILENAME),
            r#"{"compression": {"enabled": true, "model": "sentence-transformers/all-MiniLM-L6-v2",
                "top_k": 6, "mmr_lambda": 0.3, "device": "cpu", "max_chars_to_comp": 2000}}"#,
        )
        .unwrap();
        fs::write(
            dir.join(SSI_CONFIG_FILENAME),
            r#"{"ssi": {"enabled": false, "model_name": "deepset/minilm-uncased-squad2",
                "device": "cpu", "window_size": 64, "stride": 32, "top_k_per_doc": 3,
                "min_score_threshold": 0.35, "global_top_k": 8, "max_answer_length": 64,
                "handle_impossible_answer": false, "prefer_longest_when_active": true,
                "self_gating": {"enabled": true, "literal_extraction_triggers": [],
                    "numeric_extraction_keywords": [], "factual_qa_indicators": []}}}"#,
        )
        .unwrap();
        fs::write(
            dir.join(DENSE_INDEX_CONFIG_FILENAME),
            r#"{"dense_index": {"embedding_model": "sentence-transformers/all-MiniLM-L6-v2",
                "dimensions": 384, "index_type": "flat_ip", "normalize": true,
                "built_with_normalization": true}}"#,
        )
        .unwrap();
        fs::write(
            dir.join(DEDUP_CONFIG_FILENAME),
            r#"{"dedup": {"short_threshold_chars": 80, "core_length_when_important": 1500,
                "core_length_when_long": 750, "preserve_keywords": [],
                "metadata_keys_to_include": ["source", "chunk_id"]}}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_config_set_loads() {
        let temp = TempDir::new().unwrap();
        write_configs(temp.path());

        let configs = EngineConfigSet::load(temp.path()).unwrap();
        assert_eq!(configs.engine.profile, "research");
        assert_eq!(configs.budgets.fusion_top_dense, 40);
        assert!(!configs.ssi.enabled);
    }

    #[test]
    fn test_missing_stage_config_is_fatal() {
        let temp = TempDir::new().unwrap();
        write_configs(temp.path());
        fs::remove_file(temp.path().join(DEDUP_CONFIG_FILENAME)).unwrap();

        let err = EngineConfigSet::load(temp.path()).unwrap_err();
        assert!(matches!(err, ParlaError::MissingStageConfig { .. }));
    }

    #[test]
    fn test_inert_reader_proposes_nothing() {
        let reader = InertReader;
        assert!(reader.propose_spans("q", "ctx", 3).unwrap().is_empty());
    }
}
