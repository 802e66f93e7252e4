//! Shard store: on-disk unit of retrievable content.
//!
//! A shard is a directory containing three parallel, index-aligned files:
//!
//! ```text
//! <corpus_root>/<profile>/<shard...>/
//!   chunks.txt       chunk texts, separated by blank lines
//!   metadata.json    JSON array, one object per chunk
//!   embeddings.npy   2-D f32 matrix, one row per chunk
//! ```
//!
//! Shards are read-only at query time and independently loadable: a corrupt
//! or missing shard is skipped with a warning, never fatal to the whole
//! search.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use ndarray::Array2;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::DenseIndexConfig;
use crate::errors::ParlaError;

/// Chunk texts file name.
pub const CHUNKS_FILENAME: &str = "chunks.txt";

/// Chunk metadata file name.
pub const METADATA_FILENAME: &str = "metadata.json";

/// Chunk embeddings file name.
pub const EMBEDDINGS_FILENAME: &str = "embeddings.npy";

// ============================================================================
// ShardData
// ============================================================================

/// A fully loaded shard: parallel chunk texts, metadata, and embeddings.
///
/// Invariant (enforced by [`load_shard`]): all three sequences have equal
/// length.
#[derive(Debug)]
pub struct ShardData {
    /// Shard name (directory path relative to the profile root).
    pub name: String,

    /// Absolute path of the shard directory.
    pub path: PathBuf,

    /// Chunk texts.
    pub chunks: Vec<String>,

    /// Per-chunk metadata, index-aligned with `chunks`.
    pub metadata: Vec<Map<String, Value>>,

    /// Chunk embeddings, row-aligned with `chunks`.
    pub embeddings: Array2<f32>,
}

impl ShardData {
    /// Number of chunks in the shard.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the shard holds no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Embedding dimensionality.
    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    /// Validate the shard against the dense index configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ParlaError::ShardIndexIncompatible`] when the embedding
    /// dimensionality does not match the configured index.
    pub fn check_compatibility(&self, config: &DenseIndexConfig) -> Result<(), ParlaError> {
        if self.dimension() != config.dimensions {
            return Err(ParlaError::ShardIndexIncompatible {
                path: self.path.clone(),
                reason: format!(
                    "embedding dimension {} does not match configured {}",
                    self.dimension(),
                    config.dimensions
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Discovery
// ============================================================================

/// Discover shard directories under a profile root.
///
/// Any directory containing an `embeddings.npy` is a shard candidate; the
/// walk is recursive so profiles can group shards into topic folders.
/// Results are sorted for deterministic iteration order.
///
/// # Errors
///
/// Returns [`ParlaError::CorpusRootNotFound`] when the profile root does
/// not exist. An empty result is not an error; the caller decides whether
/// zero shards is acceptable.
pub fn discover_shards(profile_root: &Path) -> Result<Vec<PathBuf>, ParlaError> {
    if !profile_root.is_dir() {
        return Err(ParlaError::CorpusRootNotFound {
            profile: profile_root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            path: profile_root.to_path_buf(),
        });
    }

    let mut shards: BTreeSet<PathBuf> = BTreeSet::new();

    // Corpus folders are data, not source trees: no gitignore semantics.
    let walker = WalkBuilder::new(profile_root)
        .standard_filters(false)
        .hidden(true)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Shard walk error under {}: {}", profile_root.display(), e);
                continue;
            }
        };
        if entry.file_type().is_some_and(|t| t.is_file())
            && entry.file_name() == EMBEDDINGS_FILENAME
        {
            if let Some(dir) = entry.path().parent() {
                shards.insert(dir.to_path_buf());
            }
        }
    }

    debug!(
        "Discovered {} shard(s) under {}",
        shards.len(),
        profile_root.display()
    );

    Ok(shards.into_iter().collect())
}

// ============================================================================
// Loading
// ============================================================================

/// Load a shard from disk, enforcing the equal-length invariant.
///
/// # Errors
///
/// - [`ParlaError::ShardLoad`] for missing/unreadable files
/// - [`ParlaError::ShardShapeMismatch`] when the parallel arrays disagree
///
/// Callers treat any error as skip-and-continue.
pub fn load_shard(profile_root: &Path, shard_dir: &Path) -> Result<ShardData, ParlaError> {
    let chunks_path = shard_dir.join(CHUNKS_FILENAME);
    let metadata_path = shard_dir.join(METADATA_FILENAME);
    let embeddings_path = shard_dir.join(EMBEDDINGS_FILENAME);

    for path in [&chunks_path, &metadata_path, &embeddings_path] {
        if !path.is_file() {
            return Err(ParlaError::ShardLoad {
                path: shard_dir.to_path_buf(),
                reason: format!(
                    "missing {}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                ),
            });
        }
    }

    let raw_chunks = fs::read_to_string(&chunks_path).map_err(|e| ParlaError::ShardLoad {
        path: shard_dir.to_path_buf(),
        reason: format!("{}: {}", CHUNKS_FILENAME, e),
    })?;
    let chunks = split_chunks(&raw_chunks);

    let raw_metadata = fs::read_to_string(&metadata_path).map_err(|e| ParlaError::ShardLoad {
        path: shard_dir.to_path_buf(),
        reason: format!("{}: {}", METADATA_FILENAME, e),
    })?;
    let metadata: Vec<Map<String, Value>> =
        serde_json::from_str(&raw_metadata).map_err(|e| ParlaError::ShardLoad {
            path: shard_dir.to_path_buf(),
            reason: format!("{}: {}", METADATA_FILENAME, e),
        })?;

    let embeddings: Array2<f32> =
        ndarray_npy::read_npy(&embeddings_path).map_err(|e| ParlaError::ShardLoad {
            path: shard_dir.to_path_buf(),
            reason: format!("{}: {}", EMBEDDINGS_FILENAME, e),
        })?;

    if chunks.len() != metadata.len() || chunks.len() != embeddings.nrows() {
        return Err(ParlaError::ShardShapeMismatch {
            path: shard_dir.to_path_buf(),
            chunks: chunks.len(),
            metadata: metadata.len(),
            embeddings: embeddings.nrows(),
        });
    }

    let name = shard_dir
        .strip_prefix(profile_root)
        .unwrap_or(shard_dir)
        .to_string_lossy()
        .replace('\\', "/");
    let name = if name.is_empty() {
        shard_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "shard".to_string())
    } else {
        name
    };

    debug!("Loaded shard `{}`: {} chunks", name, chunks.len());

    Ok(ShardData {
        name,
        path: shard_dir.to_path_buf(),
        chunks,
        metadata,
        embeddings,
    })
}

/// Split a chunks file into chunk texts on blank lines.
fn split_chunks(raw: &str) -> Vec<String> {
    // Blank line = one or more newlines with only whitespace between.
    let splitter = Regex::new(r"\n\s*\n").expect("static regex");
    splitter
        .split(raw)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
