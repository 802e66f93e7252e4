//! Model locator for runtime path resolution.
//!
//! This module provides a unified way to locate model files at runtime.
//! Models are expected to be disk-based assets installed alongside parla.
//!
//! # Search Order
//!
//! The locator searches for models in this order:
//!
//! 1. **Environment override**: `$PARLA_MODELS_DIR` (single path)
//! 2. **User directory**: `~/.parla/models`
//! 3. **Binary-relative**: `{exe_dir}/models` (for release packaging)
//!
//! # Model Layout
//!
//! Expected directory structure:
//!
//! ```text
//! {models_dir}/
//!   embeddings/
//!     all-MiniLM-L6-v2/
//!       config.json
//!       model.safetensors
//!       tokenizer.json
//!   cross-encoders/
//!     ms-marco-MiniLM-L6-v2/
//!       ...
//!   readers/
//!     minilm-uncased-squad2/
//!       ...
//! ```

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{ModelError, ModelResult};

/// Environment variable for overriding the models directory.
pub const PARLA_MODELS_DIR_ENV: &str = "PARLA_MODELS_DIR";

/// Default embedding model directory name.
pub const EMBEDDINGS_SUBDIR: &str = "embeddings";

/// Default cross-encoder model directory name.
pub const CROSS_ENCODERS_SUBDIR: &str = "cross-encoders";

/// Default reader (extractive QA) model directory name.
pub const READERS_SUBDIR: &str = "readers";

/// Default embedding model name (short form).
pub const DEFAULT_EMBEDDING_MODEL_NAME: &str = "all-MiniLM-L6-v2";

/// Default cross-encoder model name (short form).
pub const DEFAULT_CROSS_ENCODER_MODEL_NAME: &str = "ms-marco-MiniLM-L6-v2";

/// Default reader model name (short form).
pub const DEFAULT_READER_MODEL_NAME: &str = "minilm-uncased-squad2";

/// Required files for a valid model directory.
pub const REQUIRED_MODEL_FILES: &[&str] = &["config.json", "model.safetensors", "tokenizer.json"];

// ============================================================================
// ModelLocator
// ============================================================================

/// Locates model files at runtime using a defined search order.
///
/// The locator does not download models. Models must be pre-installed at one
/// of the search locations. If models are not found, an error with guidance
/// is returned.
#[derive(Debug, Clone)]
pub struct ModelLocator {
    /// Cached base directory (resolved on first use).
    base_dir: Option<PathBuf>,
}

impl Default for ModelLocator {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelLocator {
    /// Create a new model locator.
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a model locator with a fixed base directory.
    ///
    /// Useful for testing or when the models directory is known.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
        }
    }

    /// Resolve the base models directory.
    ///
    /// Search order:
    /// 1. `$PARLA_MODELS_DIR` environment variable
    /// 2. `~/.parla/models` (user home directory)
    /// 3. `{exe_dir}/models` (next to the host binary)
    ///
    /// Returns the first directory that exists.
    pub fn resolve_base_dir(&self) -> ModelResult<PathBuf> {
        // If a fixed base directory was provided, use it.
        if let Some(ref base) = self.base_dir {
            if base.exists() {
                return Ok(base.clone());
            }
            return Err(ModelError::ModelsDirectoryNotFound {
                searched: vec![base.clone()],
            });
        }

        let mut searched = Vec::new();

        // 1. Check $PARLA_MODELS_DIR
        if let Ok(env_path) = env::var(PARLA_MODELS_DIR_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() && path.is_dir() {
                return Ok(path);
            }
            searched.push(path);
        }

        // 2. Check ~/.parla/models
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".parla").join("models");
            if path.exists() && path.is_dir() {
                return Ok(path);
            }
            searched.push(path);
        }

        // 3. Check {exe_dir}/models
        if let Ok(exe_path) = env::current_exe() {
            if let Some(exe_dir) = exe_path.parent() {
                let path = exe_dir.join("models");
                if path.exists() && path.is_dir() {
                    return Ok(path);
                }
                searched.push(path);
            }
        }

        Err(ModelError::ModelsDirectoryNotFound { searched })
    }

    /// Get the path to the embeddings subdirectory.
    pub fn embeddings_dir(&self) -> ModelResult<PathBuf> {
        Ok(self.resolve_base_dir()?.join(EMBEDDINGS_SUBDIR))
    }

    /// Get the path to the cross-encoders subdirectory.
    pub fn cross_encoders_dir(&self) -> ModelResult<PathBuf> {
        Ok(self.resolve_base_dir()?.join(CROSS_ENCODERS_SUBDIR))
    }

    /// Get the path to the readers subdirectory.
    pub fn readers_dir(&self) -> ModelResult<PathBuf> {
        Ok(self.resolve_base_dir()?.join(READERS_SUBDIR))
    }

    /// Resolve the path to a specific embedding model.
    ///
    /// # Arguments
    ///
    /// * `model_id` - Full model ID (e.g., "sentence-transformers/all-MiniLM-L6-v2")
    ///   or short name (e.g., "all-MiniLM-L6-v2")
    ///
    /// # Returns
    ///
    /// The path to the model directory, or an error if not found.
    pub fn embedding_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        self.model_path_in(EMBEDDINGS_SUBDIR, model_id)
    }

    /// Resolve the path to a specific cross-encoder model.
    pub fn cross_encoder_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        self.model_path_in(CROSS_ENCODERS_SUBDIR, model_id)
    }

    /// Resolve the path to a specific reader model.
    pub fn reader_model_path(&self, model_id: &str) -> ModelResult<PathBuf> {
        self.model_path_in(READERS_SUBDIR, model_id)
    }

    /// Shared resolution: subdir layout first, then HF-style and flat layouts.
    fn model_path_in(&self, subdir: &str, model_id: &str) -> ModelResult<PathBuf> {
        let base = self.resolve_base_dir()?;
        let model_name = extract_model_name(model_id);

        // Try these locations in order:
        // 1. {base}/{subdir}/{model_name}
        // 2. {base}/{full_model_id} (for HF-style paths)
        // 3. {base}/{model_name} (flat layout)
        let candidates = [
            base.join(subdir).join(model_name),
            base.join(model_id),
            base.join(model_name),
        ];

        for path in &candidates {
            if is_valid_model_dir(path) {
                return Ok(path.clone());
            }
        }

        Err(ModelError::ModelNotFound {
            model_id: model_id.to_string(),
            path: candidates[0].clone(),
        })
    }

    /// Get the path to the default embedding model.
    pub fn default_embedding_model_path(&self) -> ModelResult<PathBuf> {
        self.embedding_model_path(DEFAULT_EMBEDDING_MODEL_NAME)
    }

    /// Get the path to the default cross-encoder model.
    pub fn default_cross_encoder_model_path(&self) -> ModelResult<PathBuf> {
        self.cross_encoder_model_path(DEFAULT_CROSS_ENCODER_MODEL_NAME)
    }

    /// Check if the default embedding model is available.
    pub fn has_default_embedding_model(&self) -> bool {
        self.default_embedding_model_path().is_ok()
    }

    /// Check if the default cross-encoder model is available.
    pub fn has_default_cross_encoder_model(&self) -> bool {
        self.default_cross_encoder_model_path().is_ok()
    }

    /// Validate that a model directory contains all required files.
    pub fn validate_model_dir(&self, path: &Path) -> ModelResult<()> {
        if !path.exists() {
            return Err(ModelError::ModelNotFound {
                model_id: path.display().to_string(),
                path: path.to_path_buf(),
            });
        }

        let mut missing = Vec::new();
        for file in REQUIRED_MODEL_FILES {
            if !path.join(file).exists() {
                missing.push(*file);
            }
        }

        if !missing.is_empty() {
            return Err(ModelError::IncompleteModelFiles {
                path: path.to_path_buf(),
                missing,
            });
        }

        Ok(())
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Extract the model name from a full model ID.
///
/// E.g., "sentence-transformers/all-MiniLM-L6-v2" → "all-MiniLM-L6-v2"
fn extract_model_name(model_id: &str) -> &str {
    model_id.rsplit('/').next().unwrap_or(model_id)
}

/// Check if a directory is a valid model directory.
fn is_valid_model_dir(path: &Path) -> bool {
    if !path.exists() || !path.is_dir() {
        return false;
    }

    // Must have at least config.json
    path.join("config.json").exists()
}

// ============================================================================
// Global Accessor
// ============================================================================

/// Get a default model locator.
///
/// This creates a new locator each time. For repeated use, consider caching
/// the result or using `ModelLocator::new()` directly.
pub fn default_locator() -> ModelLocator {
    ModelLocator::new()
}

// ============================================================================
// Tests
// ============================================================================
