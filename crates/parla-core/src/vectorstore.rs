//! Legacy single-index flat vectorstore.
//!
//! Before the sharded corpus layout, corpora were built as one combined
//! index per client: a flat vector file plus a binary sidecar holding chunk
//! texts, per-chunk metadata, and an id-to-slot mapping. The loader here
//! reconstructs a consistent store from that format so old corpora stay
//! queryable.
//!
//! Storage layout:
//!
//! ```text
//! <store_dir>/
//! ├── index.vec     # bincode: dimension + row-major f32 vectors
//! └── store.bin     # bincode: chunk texts, metadata JSON, id → slot map
//! ```
//!
//! The id map is not trusted: every vector row must resolve to a chunk, so
//! ids missing from the map are filled with an explicit placeholder entry
//! rather than failing the load.

use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use bincode::{config, Decode, Encode};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::config::DenseIndexConfig;
use crate::errors::ParlaError;

/// Filename for the flat vector file.
pub const INDEX_FILENAME: &str = "index.vec";

/// Filename for the docstore sidecar.
pub const STORE_FILENAME: &str = "store.bin";

/// Text used for chunks whose id is missing from the docstore mapping.
pub const MISSING_CHUNK_TEXT: &str = "[missing chunk]";

// ============================================================================
// On-disk records
// ============================================================================

/// Flat vector index: row-major vectors with a fixed dimension.
#[derive(Debug, Clone, Encode, Decode)]
struct FlatIndexRecord {
    dimension: u32,
    /// Row-major vector data; length = rows * dimension.
    data: Vec<f32>,
}

/// Docstore sidecar record.
///
/// Metadata entries are stored as JSON strings; the sidecar format predates
/// any schema and must stay opaque to survive old corpora.
#[derive(Debug, Clone, Encode, Decode)]
struct StoreRecord {
    chunks: Vec<String>,
    metadata_json: Vec<String>,
    /// Vector row id → slot in `chunks`/`metadata_json`.
    id_map: Vec<(u64, u64)>,
}

// ============================================================================
// FlatVectorstore
// ============================================================================

/// A loaded legacy vectorstore: vectors plus a consistent docstore.
#[derive(Debug)]
pub struct FlatVectorstore {
    /// Store directory.
    pub path: PathBuf,

    /// Embedding dimensionality.
    pub dimension: usize,

    /// One entry per vector row, id-aligned; missing mappings are filled
    /// with placeholder entries.
    pub entries: Vec<FlatStoreEntry>,

    /// Row-major vector data.
    vectors: Vec<f32>,
}

/// One docstore entry of a flat vectorstore.
#[derive(Debug, Clone)]
pub struct FlatStoreEntry {
    /// Chunk text ([`MISSING_CHUNK_TEXT`] when the mapping had no entry).
    pub text: String,
    /// Chunk metadata (empty for placeholders).
    pub metadata: Map<String, Value>,
    /// Whether this entry was synthesized for a missing id.
    pub placeholder: bool,
}

impl FlatVectorstore {
    /// Number of vectors in the store.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The vector for a given row id.
    pub fn vector(&self, id: usize) -> Option<&[f32]> {
        let start = id * self.dimension;
        self.vectors.get(start..start + self.dimension)
    }

    /// Validate the store against the dense index configuration.
    pub fn check_compatibility(&self, config: &DenseIndexConfig) -> Result<(), ParlaError> {
        if self.dimension != config.dimensions {
            return Err(ParlaError::VectorstoreIncompatible {
                path: self.path.clone(),
                reason: format!(
                    "dimension {} does not match configured {}",
                    self.dimension, config.dimensions
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Load / save
// ============================================================================

/// Load a legacy flat vectorstore.
///
/// Reconstructs a consistent docstore even when the id map is missing
/// entries for some vector rows: those rows get an explicit placeholder
/// entry and a warning, never a failure.
///
/// # Errors
///
/// - [`ParlaError::VectorstoreIo`] when either file is missing/unreadable
/// - [`ParlaError::VectorstoreParse`] when decoding fails or shapes are
///   inconsistent beyond repair
pub fn load_flat_vectorstore(store_dir: &Path) -> Result<FlatVectorstore, ParlaError> {
    let index_path = store_dir.join(INDEX_FILENAME);
    let store_path = store_dir.join(STORE_FILENAME);

    for path in [&index_path, &store_path] {
        if !path.is_file() {
            return Err(ParlaError::VectorstoreIo {
                path: path.clone(),
                reason: "file not found".to_string(),
            });
        }
    }

    let index_file = fs::File::open(&index_path).map_err(|e| ParlaError::VectorstoreIo {
        path: index_path.clone(),
        reason: e.to_string(),
    })?;
    let index: FlatIndexRecord =
        bincode::decode_from_std_read(&mut BufReader::new(index_file), config::standard())
            .map_err(|e| ParlaError::VectorstoreParse {
                path: index_path.clone(),
                reason: e.to_string(),
            })?;

    let dimension = index.dimension as usize;
    if dimension == 0 || index.data.len() % dimension != 0 {
        return Err(ParlaError::VectorstoreParse {
            path: index_path.clone(),
            reason: format!(
                "vector data length {} not divisible by dimension {}",
                index.data.len(),
                dimension
            ),
        });
    }
    let rows = index.data.len() / dimension;

    let store_file = fs::File::open(&store_path).map_err(|e| ParlaError::VectorstoreIo {
        path: store_path.clone(),
        reason: e.to_string(),
    })?;
    let record: StoreRecord =
        bincode::decode_from_std_read(&mut BufReader::new(store_file), config::standard())
            .map_err(|e| ParlaError::VectorstoreParse {
                path: store_path.clone(),
                reason: e.to_string(),
            })?;

    let id_map: HashMap<u64, u64> = record.id_map.iter().copied().collect();

    let mut entries = Vec::with_capacity(rows);
    let mut missing = 0usize;
    for id in 0..rows as u64 {
        match id_map.get(&id).and_then(|slot| {
            record
                .chunks
                .get(*slot as usize)
                .map(|text| (*slot as usize, text))
        }) {
            Some((slot, text)) => {
                let metadata = record
                    .metadata_json
                    .get(slot)
                    .and_then(|raw| serde_json::from_str::<Map<String, Value>>(raw).ok())
                    .unwrap_or_default();
                entries.push(FlatStoreEntry {
                    text: text.clone(),
                    metadata,
                    placeholder: false,
                });
            }
            None => {
                missing += 1;
                entries.push(FlatStoreEntry {
                    text: MISSING_CHUNK_TEXT.to_string(),
                    metadata: Map::new(),
                    placeholder: true,
                });
            }
        }
    }

    if missing > 0 {
        warn!(
            "Vectorstore at {} had {} vector id(s) without docstore entries; filled with placeholders",
            store_dir.display(),
            missing
        );
    }

    info!(
        "Loaded flat vectorstore: {} vectors, dim={}",
        rows, dimension
    );

    Ok(FlatVectorstore {
        path: store_dir.to_path_buf(),
        dimension,
        entries,
        vectors: index.data,
    })
}

/// Save a flat vectorstore (used by migration tooling and tests).
pub fn save_flat_vectorstore(
    store_dir: &Path,
    dimension: usize,
    vectors: &[f32],
    chunks: &[String],
    metadata: &[Map<String, Value>],
    id_map: &[(u64, u64)],
) -> Result<(), ParlaError> {
    fs::create_dir_all(store_dir).map_err(|e| ParlaError::VectorstoreIo {
        path: store_dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let index_path = store_dir.join(INDEX_FILENAME);
    let index = FlatIndexRecord {
        dimension: dimension as u32,
        data: vectors.to_vec(),
    };
    let file = fs::File::create(&index_path).map_err(|e| ParlaError::VectorstoreIo {
        path: index_path.clone(),
        reason: e.to_string(),
    })?;
    bincode::encode_into_std_write(&index, &mut BufWriter::new(file), config::standard())
        .map_err(|e| ParlaError::VectorstoreParse {
            path: index_path.clone(),
            reason: e.to_string(),
        })?;

    let metadata_json: Result<Vec<String>, _> =
        metadata.iter().map(serde_json::to_string).collect();
    let record = StoreRecord {
        chunks: chunks.to_vec(),
        metadata_json: metadata_json?,
        id_map: id_map.to_vec(),
    };

    let store_path = store_dir.join(STORE_FILENAME);
    let file = fs::File::create(&store_path).map_err(|e| ParlaError::VectorstoreIo {
        path: store_path.clone(),
        reason: e.to_string(),
    })?;
    bincode::encode_into_std_write(&record, &mut BufWriter::new(file), config::standard())
        .map_err(|e| ParlaError::VectorstoreParse {
            path: store_path.clone(),
            reason: e.to_string(),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn meta(source: &str) -> Map<String, Value> {
        let mut m = Map::new();
        m.insert("source".to_string(), json!(source));
        m
    }

    #[test]
    fn test_roundtrip() {
        let temp = TempDir::new().unwrap();
        let chunks = vec!["first".to_string(), "second".to_string()];
        let metadata = vec![meta("a.pdf"), meta("b.pdf")];
        let vectors = vec![1.0, 0.0, 0.0, 1.0];
        let id_map = vec![(0u64, 0u64), (1, 1)];

        save_flat_vectorstore(temp.path(), 2, &vectors, &chunks, &metadata, &id_map).unwrap();
        let store = load_flat_vectorstore(temp.path()).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.dimension, 2);
        assert_eq!(store.entries[0].text, "first");
        assert_eq!(store.entries[1].metadata["source"], "b.pdf");
        assert_eq!(store.vector(1), Some(&[0.0, 1.0][..]));
    }

    #[test]
    fn test_missing_id_filled_with_placeholder() {
        let temp = TempDir::new().unwrap();
        let chunks = vec!["only".to_string()];
        let metadata = vec![meta("a.pdf")];
        // Two vectors but the map only covers id 0
        let vectors = vec![1.0, 0.0, 0.0, 1.0];
        let id_map = vec![(0u64, 0u64)];

        save_flat_vectorstore(temp.path(), 2, &vectors, &chunks, &metadata, &id_map).unwrap();
        let store = load_flat_vectorstore(temp.path()).unwrap();

        assert_eq!(store.len(), 2);
        assert!(!store.entries[0].placeholder);
        assert!(store.entries[1].placeholder);
        assert_eq!(store.entries[1].text, MISSING_CHUNK_TEXT);
    }

    #[test]
    fn test_missing_files() {
        let temp = TempDir::new().unwrap();
        let err = load_flat_vectorstore(temp.path()).unwrap_err();
        assert!(matches!(err, ParlaError::VectorstoreIo { .. }));
    }

    #[test]
    fn test_compatibility_check() {
        let temp = TempDir::new().unwrap();
        save_flat_vectorstore(temp.path(), 2, &[0.0, 0.0], &["c".to_string()], &[meta("x")], &[(0, 0)])
            .unwrap();
        let store = load_flat_vectorstore(temp.path()).unwrap();

        let config = DenseIndexConfig {
            embedding_model: "m".to_string(),
            dimensions: 384,
            index_type: "flat_ip".to_string(),
            normalize: true,
            built_with_normalization: true,
        };
        assert!(store.check_compatibility(&config).is_err());
    }
}
