//! Configuration types for parla.
//!
//! Two layers of configuration exist:
//!
//! - [`EngineConfig`]: engine-level YAML config (corpus root, profile,
//!   device, routing threshold, global stage switches, dump toggle). Missing
//!   file falls back to defaults, matching how an operator bootstraps a new
//!   deployment.
//! - Stage configs (`compression.json`, `ssi.json`, `rerankers.json`,
//!   `dense_index.json`, `dedup.json`): strict JSON files with a mandatory
//!   top-level section and mandatory keys. A missing file, section, or key
//!   is a **fatal construction error** - these indicate a deployment
//!   mistake, not a transient condition, and must fail loudly before any
//!   query is served.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::ParlaError;
use crate::query::StageFlags;

pub use parla_model::DevicePreference;

// ============================================================================
// EngineConfig
// ============================================================================

/// Engine-level configuration.
///
/// # Example YAML
///
/// ```yaml
/// corpus_root: /var/parla/corpora
/// profile: research
/// retrieval_score_threshold: 0.4
/// device: auto
/// switches:
///   rewrite: true
///   expand: true
///   ssi: false
///   rerank: true
/// dump:
///   enabled: false
///   folder: /tmp/parla-dumps
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory holding per-profile corpora.
    pub corpus_root: PathBuf,

    /// Named corpus profile under `corpus_root`.
    pub profile: String,

    /// Similarity threshold for the RAG-vs-fallback routing decision.
    #[serde(default = "default_score_threshold")]
    pub retrieval_score_threshold: f32,

    /// Device preference for model inference.
    #[serde(default)]
    pub device: DevicePreference,

    /// Global stage on/off switches, AND-ed with per-intent flags.
    #[serde(default)]
    pub switches: StageSwitches,

    /// Retrieval debug dump settings.
    #[serde(default)]
    pub dump: DumpConfig,
}

fn default_score_threshold() -> f32 {
    0.4
}

impl EngineConfig {
    /// Load the engine configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`ParlaError::MissingEngineConfig`] if the file does not
    /// exist and [`ParlaError::InvalidEngineConfig`] if it cannot be parsed.
    pub fn from_path(path: &Path) -> Result<Self, ParlaError> {
        if !path.exists() {
            return Err(ParlaError::MissingEngineConfig(
                path.display().to_string(),
            ));
        }

        let content = fs::read_to_string(path).map_err(|e| {
            ParlaError::InvalidEngineConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            ParlaError::InvalidEngineConfig(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ParlaError> {
        if self.profile.trim().is_empty() {
            return Err(ParlaError::InvalidConfiguration {
                message: "profile must not be empty".to_string(),
                hint: "Set `profile` to a corpus directory name under corpus_root".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.retrieval_score_threshold) {
            return Err(ParlaError::InvalidConfiguration {
                message: format!(
                    "retrieval_score_threshold={} out of range",
                    self.retrieval_score_threshold
                ),
                hint: "Use a similarity threshold in [0.0, 1.0] (recommended: 0.4)".to_string(),
            });
        }
        Ok(())
    }

    /// Directory of the active corpus profile.
    pub fn profile_root(&self) -> PathBuf {
        self.corpus_root.join(&self.profile)
    }
}

/// Global stage switches. A stage runs only when its global switch AND its
/// per-intent flag are both set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageSwitches {
    /// Allow query rewriting.
    #[serde(default = "default_true")]
    pub rewrite: bool,
    /// Allow query expansion.
    #[serde(default = "default_true")]
    pub expand: bool,
    /// Allow salient span extraction.
    #[serde(default)]
    pub ssi: bool,
    /// Allow cross-encoder reranking.
    #[serde(default = "default_true")]
    pub rerank: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StageSwitches {
    fn default() -> Self {
        Self {
            rewrite: true,
            expand: true,
            ssi: false,
            rerank: true,
        }
    }
}

impl StageSwitches {
    /// Combine with per-intent flags: a stage runs only when both agree.
    pub fn mask(&self, flags: StageFlags) -> StageFlags {
        StageFlags {
            rewrite: self.rewrite && flags.rewrite,
            expand: self.expand && flags.expand,
            ssi: self.ssi && flags.ssi,
            rerank: self.rerank && flags.rerank,
        }
    }
}

/// Retrieval debug dump settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DumpConfig {
    /// Whether per-run dump files are written.
    #[serde(default)]
    pub enabled: bool,
    /// Folder receiving dump files.
    #[serde(default)]
    pub folder: Option<PathBuf>,
}

// ============================================================================
// Strict stage-config loading
// ============================================================================

/// Load a strict JSON stage config.
///
/// The wrapper type `T` carries the mandatory top-level section as its only
/// required field, so a missing section or key surfaces as a parse error.
fn load_stage_config<T: DeserializeOwned>(
    path: &Path,
    stage: &'static str,
) -> Result<T, ParlaError> {
    if !path.exists() {
        return Err(ParlaError::MissingStageConfig {
            stage,
            path: path.to_path_buf(),
        });
    }

    let content = fs::read_to_string(path).map_err(|e| ParlaError::InvalidStageConfig {
        stage,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| ParlaError::InvalidStageConfig {
        stage,
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

// ============================================================================
// CompressionConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct CompressionFile {
    compression: CompressionConfig,
}

/// MMR context compression settings. All keys mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompressionConfig {
    /// Whether compression runs at all.
    pub enabled: bool,
    /// Embedding model used to score relevance/diversity.
    pub model: String,
    /// Number of chunks kept after compression.
    pub top_k: usize,
    /// MMR lambda; larger values favor diversity over relevance.
    pub mmr_lambda: f32,
    /// Inference device.
    pub device: String,
    /// Minimum combined candidate text length worth compressing.
    pub max_chars_to_comp: usize,
}

impl CompressionConfig {
    /// Load from `compression.json`.
    pub fn from_path(path: &Path) -> Result<Self, ParlaError> {
        let file: CompressionFile = load_stage_config(path, "compression")?;
        let config = file.compression;
        if !(0.0..=1.0).contains(&config.mmr_lambda) {
            return Err(ParlaError::InvalidStageConfig {
                stage: "compression",
                path: path.to_path_buf(),
                reason: format!("mmr_lambda={} out of [0,1]", config.mmr_lambda),
            });
        }
        Ok(config)
    }
}

// ============================================================================
// SsiConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct SsiFile {
    ssi: SsiConfig,
}

/// Salient span extraction settings. All keys mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SsiConfig {
    /// Whether span extraction runs at all.
    pub enabled: bool,
    /// Reader model used for span proposals.
    pub model_name: String,
    /// Inference device.
    pub device: String,
    /// Sliding window size, in words.
    pub window_size: usize,
    /// Window stride, in words.
    pub stride: usize,
    /// Maximum spans proposed per window.
    pub top_k_per_doc: usize,
    /// Minimum reader confidence for a span to survive.
    pub min_score_threshold: f32,
    /// Maximum spans kept after global ranking.
    pub global_top_k: usize,
    /// Maximum answer length in characters.
    pub max_answer_length: usize,
    /// Whether the reader may return "no answer".
    pub handle_impossible_answer: bool,
    /// Tie-break equally scored spans by length.
    pub prefer_longest_when_active: bool,
    /// Self-gating rules.
    pub self_gating: SelfGatingConfig,
}

/// Self-gating rules for span extraction.
///
/// The gate is pure policy - no model inference - so bypassing the stage
/// costs nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelfGatingConfig {
    /// Whether the gate runs; when false the stage always executes.
    pub enabled: bool,
    /// Phrases that signal "give me the literal text" asks, which spans
    /// serve badly.
    pub literal_extraction_triggers: Vec<String>,
    /// Keywords that, combined with a numeric pattern, signal numeric
    /// lookups better served by whole chunks.
    pub numeric_extraction_keywords: Vec<String>,
    /// Indicators of factual QA where the extractor helps.
    pub factual_qa_indicators: Vec<String>,
}

impl SsiConfig {
    /// Load from `ssi.json`.
    pub fn from_path(path: &Path) -> Result<Self, ParlaError> {
        let file: SsiFile = load_stage_config(path, "ssi")?;
        let config = file.ssi;
        if config.stride == 0 || config.window_size == 0 {
            return Err(ParlaError::InvalidStageConfig {
                stage: "ssi",
                path: path.to_path_buf(),
                reason: "window_size and stride must be positive".to_string(),
            });
        }
        Ok(config)
    }
}

// ============================================================================
// RetrievalBudgets (rerankers.json)
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct RetrievalBudgetsFile {
    rerankers: RetrievalBudgets,
}

/// Per-source retrieval and fusion budgets. All keys mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrievalBudgets {
    /// Nearest neighbors fetched per shard by the dense retriever.
    pub top_k_dense: usize,
    /// Hits fetched per shard (and kept globally) by the lexical retriever.
    pub top_k_lexical: usize,
    /// Final candidate count after reranking.
    pub top_k_fusion: usize,
    /// Dense items admitted into fusion.
    pub fusion_top_dense: usize,
    /// Lexical items admitted into fusion.
    pub fusion_top_lexical: usize,
    /// Chunks kept per shard after the relevance filter.
    pub top_chunks_per_shard: usize,
    /// Cross-encoder model used for the per-shard relevance filter.
    pub chunk_filter_model: String,
}

impl RetrievalBudgets {
    /// Load from `rerankers.json`.
    pub fn from_path(path: &Path) -> Result<Self, ParlaError> {
        let file: RetrievalBudgetsFile = load_stage_config(path, "rerankers")?;
        let config = file.rerankers;
        for (name, value) in [
            ("top_k_dense", config.top_k_dense),
            ("top_k_lexical", config.top_k_lexical),
            ("top_k_fusion", config.top_k_fusion),
            ("top_chunks_per_shard", config.top_chunks_per_shard),
        ] {
            if value == 0 {
                return Err(ParlaError::InvalidStageConfig {
                    stage: "rerankers",
                    path: path.to_path_buf(),
                    reason: format!("{} must be positive", name),
                });
            }
        }
        Ok(config)
    }
}

// ============================================================================
// DenseIndexConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct DenseIndexFile {
    dense_index: DenseIndexConfig,
}

/// Dense index settings, validated strictly against loaded shard data.
/// All keys mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DenseIndexConfig {
    /// Embedding model id; must match the model that built the shards.
    pub embedding_model: String,
    /// Embedding dimensionality; shard rows must match exactly.
    pub dimensions: usize,
    /// Index layout. Only "flat_ip" (exhaustive inner product) is supported.
    pub index_type: String,
    /// Whether query embeddings are L2-normalized before search.
    pub normalize: bool,
    /// Whether the corpus was L2-normalized when the shards were built.
    pub built_with_normalization: bool,
}

impl DenseIndexConfig {
    /// Load from `dense_index.json`.
    pub fn from_path(path: &Path) -> Result<Self, ParlaError> {
        let file: DenseIndexFile = load_stage_config(path, "dense_index")?;
        let config = file.dense_index;
        if config.index_type != "flat_ip" {
            return Err(ParlaError::InvalidStageConfig {
                stage: "dense_index",
                path: path.to_path_buf(),
                reason: format!(
                    "unsupported index_type `{}` (expected `flat_ip`)",
                    config.index_type
                ),
            });
        }
        if config.dimensions == 0 {
            return Err(ParlaError::InvalidStageConfig {
                stage: "dense_index",
                path: path.to_path_buf(),
                reason: "dimensions must be positive".to_string(),
            });
        }
        Ok(config)
    }
}

// ============================================================================
// DedupConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct DedupFile {
    dedup: DedupConfig,
}

/// Near-duplicate elimination settings. All keys mandatory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DedupConfig {
    /// Texts shorter than this are treated as important and fingerprinted
    /// with the longer core.
    pub short_threshold_chars: usize,
    /// Fingerprint core length for important texts.
    pub core_length_when_important: usize,
    /// Fingerprint core length for long texts.
    pub core_length_when_long: usize,
    /// Keywords whose presence marks a text as important.
    pub preserve_keywords: Vec<String>,
    /// Metadata keys mixed into the fingerprint.
    pub metadata_keys_to_include: Vec<String>,
}

impl DedupConfig {
    /// Load from `dedup.json`.
    pub fn from_path(path: &Path) -> Result<Self, ParlaError> {
        let file: DedupFile = load_stage_config(path, "dedup")?;
        Ok(file.dedup)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_compression_config_ok() {
        let file = write_temp(
            r#"{"compression": {"enabled": true, "model": "sentence-transformers/all-MiniLM-L6-v2",
                "top_k": 6, "mmr_lambda": 0.3, "device": "cpu", "max_chars_to_comp": 2000}}"#,
        );
        let config = CompressionConfig::from_path(file.path()).unwrap();
        assert!(config.enabled);
        assert_eq!(config.top_k, 6);
    }

    #[test]
    fn test_compression_config_missing_key_is_fatal() {
        // No mmr_lambda
        let file = write_temp(
            r#"{"compression": {"enabled": true, "model": "m", "top_k": 6,
                "device": "cpu", "max_chars_to_comp": 2000}}"#,
        );
        assert!(CompressionConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_compression_config_missing_section_is_fatal() {
        let file = write_temp(r#"{"other": {}}"#);
        assert!(CompressionConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_compression_config_missing_file_is_fatal() {
        let err = CompressionConfig::from_path(Path::new("/nonexistent/compression.json"))
            .unwrap_err();
        assert!(matches!(err, ParlaError::MissingStageConfig { .. }));
    }

    #[test]
    fn test_compression_lambda_out_of_range() {
        let file = write_temp(
            r#"{"compression": {"enabled": true, "model": "m", "top_k": 6, "mmr_lambda": 1.5,
                "device": "cpu", "max_chars_to_comp": 2000}}"#,
        );
        assert!(CompressionConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_budgets_config_ok() {
        let file = write_temp(
            r#"{"rerankers": {"top_k_dense": 8, "top_k_lexical": 12, "top_k_fusion": 10,
                "fusion_top_dense": 40, "fusion_top_lexical": 8, "top_chunks_per_shard": 3,
                "chunk_filter_model": "cross-encoder/ms-marco-MiniLM-L6-v2"}}"#,
        );
        let config = RetrievalBudgets::from_path(file.path()).unwrap();
        assert_eq!(config.fusion_top_dense, 40);
        assert_eq!(config.fusion_top_lexical, 8);
    }

    #[test]
    fn test_budgets_zero_is_fatal() {
        let file = write_temp(
            r#"{"rerankers": {"top_k_dense": 0, "top_k_lexical": 12, "top_k_fusion": 10,
                "fusion_top_dense": 40, "fusion_top_lexical": 8, "top_chunks_per_shard": 3,
                "chunk_filter_model": "m"}}"#,
        );
        assert!(RetrievalBudgets::from_path(file.path()).is_err());
    }

    #[test]
    fn test_dense_index_config_rejects_unknown_type() {
        let file = write_temp(
            r#"{"dense_index": {"embedding_model": "m", "dimensions": 384,
                "index_type": "hnsw", "normalize": true, "built_with_normalization": true}}"#,
        );
        assert!(DenseIndexConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_ssi_config_ok() {
        let file = write_temp(
            r#"{"ssi": {"enabled": true, "model_name": "deepset/minilm-uncased-squad2",
                "device": "cpu", "window_size": 64, "stride": 32, "top_k_per_doc": 3,
                "min_score_threshold": 0.35, "global_top_k": 8, "max_answer_length": 64,
                "handle_impossible_answer": false, "prefer_longest_when_active": true,
                "self_gating": {"enabled": true,
                    "literal_extraction_triggers": ["summarize", "quote"],
                    "numeric_extraction_keywords": ["cpi", "rate"],
                    "factual_qa_indicators": ["who", "what"]}}}"#,
        );
        let config = SsiConfig::from_path(file.path()).unwrap();
        assert_eq!(config.window_size, 64);
        assert!(config.self_gating.enabled);
    }

    #[test]
    fn test_ssi_zero_stride_is_fatal() {
        let file = write_temp(
            r#"{"ssi": {"enabled": true, "model_name": "m", "device": "cpu",
                "window_size": 64, "stride": 0, "top_k_per_doc": 3,
                "min_score_threshold": 0.35, "global_top_k": 8, "max_answer_length": 64,
                "handle_impossible_answer": false, "prefer_longest_when_active": true,
                "self_gating": {"enabled": true, "literal_extraction_triggers": [],
                    "numeric_extraction_keywords": [], "factual_qa_indicators": []}}}"#,
        );
        assert!(SsiConfig::from_path(file.path()).is_err());
    }

    #[test]
    fn test_engine_config_threshold_validation() {
        let config = EngineConfig {
            corpus_root: PathBuf::from("/tmp"),
            profile: "demo".to_string(),
            retrieval_score_threshold: 1.5,
            device: DevicePreference::Cpu,
            switches: StageSwitches::default(),
            dump: DumpConfig::default(),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_switches_mask() {
        let switches = StageSwitches {
            rewrite: true,
            expand: false,
            ssi: true,
            rerank: true,
        };
        let flags = StageFlags {
            rewrite: true,
            expand: true,
            ssi: false,
            rerank: true,
        };
        let masked = switches.mask(flags);
        assert!(masked.rewrite);
        assert!(!masked.expand); // global off
        assert!(!masked.ssi); // intent off
        assert!(masked.rerank);
    }
}
