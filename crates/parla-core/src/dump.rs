//! Retrieval debug dump logger.
//!
//! When enabled, each retrieval run appends a plain-text trace to a
//! timestamped file: the query, then one `[KEEP]` line per retained chunk
//! with its source, shard, rank, and a 120-character preview. Reading a
//! dump side by side with the final answer is the fastest way to see why a
//! chunk made (or missed) the context window.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tracing::warn;

use crate::chunk::Chunk;
use crate::config::DumpConfig;
use crate::errors::ParlaError;

/// Append-only per-run retrieval dump.
///
/// All methods are no-ops when dumping is disabled, so call sites never
/// need to guard.
#[derive(Debug)]
pub struct RetrievalDump {
    enabled: bool,
    filepath: Option<PathBuf>,
    file: Option<File>,
}

impl RetrievalDump {
    /// Create a dump writer from config.
    pub fn new(config: &DumpConfig) -> Self {
        Self {
            enabled: config.enabled && config.folder.is_some(),
            filepath: config.folder.as_ref().map(|folder| {
                let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
                folder.join(format!("retrieval_{ts}.log"))
            }),
            file: None,
        }
    }

    /// Disabled dump, for callers without a config.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            filepath: None,
            file: None,
        }
    }

    /// Open (or reopen in append mode) the dump file and write a section
    /// header for `source`.
    pub fn begin_section(&mut self, source: &str) {
        if !self.enabled {
            return;
        }
        if let Err(e) = self.try_begin_section(source) {
            warn!("Retrieval dump disabled after error: {}", e);
            self.enabled = false;
        }
    }

    fn try_begin_section(&mut self, source: &str) -> Result<(), ParlaError> {
        let Some(path) = self.filepath.clone() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ParlaError::DumpIo {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| ParlaError::DumpIo {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        writeln!(file, "\n=== {} SECTION ===", source.to_uppercase()).map_err(|e| {
            ParlaError::DumpIo {
                path: path.clone(),
                reason: e.to_string(),
            }
        })?;

        self.file = Some(file);
        Ok(())
    }

    /// Write the query header.
    pub fn write_query(&mut self, query: &str) {
        if let Some(ref mut file) = self.file {
            let _ = writeln!(file, "=== QUERY USED ===\n{}", query);
        }
    }

    /// Write one `[KEEP]` line for a retained chunk.
    pub fn write_kept(&mut self, source: &str, shard: &str, rank: usize, chunk: &Chunk) {
        if let Some(ref mut file) = self.file {
            let _ = writeln!(
                file,
                "[KEEP] {} | {} | rank={} | {}",
                source,
                shard,
                rank,
                chunk.preview()
            );
        }
    }

    /// Flush and close the current section.
    pub fn end_section(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
        }
    }

    /// Path of the dump file, when dumping is active.
    pub fn path(&self) -> Option<&PathBuf> {
        if self.enabled {
            self.filepath.as_ref()
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkSource;
    use tempfile::TempDir;

    #[test]
    fn test_dump_writes_keep_lines() {
        let temp = TempDir::new().unwrap();
        let config = DumpConfig {
            enabled: true,
            folder: Some(temp.path().to_path_buf()),
        };

        let mut dump = RetrievalDump::new(&config);
        dump.begin_section("bm25");
        dump.write_query("what moved gold?");
        let chunk = Chunk::new("gold rallied on rate cut bets", "macro/2024", ChunkSource::Lexical);
        dump.write_kept("BM25", &chunk.shard, 1, &chunk);
        dump.end_section();

        let path = dump.path().unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("=== BM25 SECTION ==="));
        assert!(content.contains("=== QUERY USED ===\nwhat moved gold?"));
        assert!(content.contains("[KEEP] BM25 | macro/2024 | rank=1 | gold rallied"));
    }

    #[test]
    fn test_disabled_dump_is_noop() {
        let mut dump = RetrievalDump::disabled();
        dump.begin_section("dense");
        dump.write_query("q");
        dump.end_section();
        assert!(dump.path().is_none());
    }

    #[test]
    fn test_sections_append_to_same_file() {
        let temp = TempDir::new().unwrap();
        let config = DumpConfig {
            enabled: true,
            folder: Some(temp.path().to_path_buf()),
        };

        let mut dump = RetrievalDump::new(&config);
        dump.begin_section("dense");
        dump.write_query("q");
        dump.end_section();
        dump.begin_section("bm25");
        dump.end_section();

        let content = fs::read_to_string(dump.path().unwrap()).unwrap();
        assert!(content.contains("=== DENSE SECTION ==="));
        assert!(content.contains("=== BM25 SECTION ==="));
    }
}
