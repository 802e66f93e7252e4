//! Near-duplicate elimination.
//!
//! Chunking overlap and the dual retrievers routinely surface the same
//! passage several times with cosmetic differences. The deduplicator
//! fingerprints each chunk - a normalized text core plus selected metadata
//! keys, hashed with blake3 - and keeps the first occurrence.
//!
//! The fingerprint core length is adaptive: short texts and texts carrying
//! a preserve-keyword are "important" and get the longer core (less
//! aggressive collapsing); long boilerplate-ish texts get the shorter core
//! so trailing noise cannot keep near-copies apart.
//!
//! Idempotent by construction: first-occurrence-keeps over a deterministic
//! fingerprint means `run(run(x)) == run(x)`.

use std::collections::HashSet;

use regex::Regex;
use tracing::info;

use crate::chunk::{CandidateSet, Chunk};
use crate::config::DedupConfig;

/// Result of a dedup pass.
#[derive(Debug)]
pub struct DedupOutcome {
    /// Surviving candidates, input order preserved.
    pub candidates: CandidateSet,
    /// How many near-duplicates were removed (telemetry).
    pub removed: usize,
}

/// Config-driven near-duplicate eliminator.
#[derive(Debug)]
pub struct Deduplicator {
    config: DedupConfig,
    preserve: HashSet<String>,
    squeeze_ws: Regex,
    strip_punct: Regex,
}

impl Deduplicator {
    /// Create a deduplicator from config.
    pub fn new(config: DedupConfig) -> Self {
        let preserve = config
            .preserve_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .collect();
        Self {
            config,
            preserve,
            squeeze_ws: Regex::new(r"\s+").expect("static regex"),
            strip_punct: Regex::new(r"[^\w\s.%$-]").expect("static regex"),
        }
    }

    /// Remove near-duplicates, keeping the first occurrence of each
    /// fingerprint.
    pub fn run(&self, candidates: CandidateSet) -> DedupOutcome {
        if candidates.is_empty() {
            return DedupOutcome {
                candidates,
                removed: 0,
            };
        }

        let total = candidates.len();
        let mut seen: HashSet<[u8; 32]> = HashSet::new();
        let mut unique: Vec<Chunk> = Vec::with_capacity(total);

        for chunk in candidates {
            if seen.insert(self.fingerprint(&chunk)) {
                unique.push(chunk);
            }
        }

        let removed = total - unique.len();
        info!(
            "Dedup: in={} out={} removed={} ({:.0}%)",
            total,
            unique.len(),
            removed,
            removed as f32 * 100.0 / total as f32
        );

        DedupOutcome {
            candidates: CandidateSet::from(unique),
            removed,
        }
    }

    /// Fingerprint = blake3(normalized core + selected metadata).
    fn fingerprint(&self, chunk: &Chunk) -> [u8; 32] {
        let normalized = self.normalize(&chunk.text);

        let is_important = normalized.len() < self.config.short_threshold_chars
            || normalized
                .split_whitespace()
                .any(|w| self.preserve.contains(w));

        let core_len = if is_important {
            self.config.core_length_when_important
        } else {
            self.config.core_length_when_long
        };
        let core: String = normalized.chars().take(core_len).collect();

        let mut hasher = blake3::Hasher::new();
        hasher.update(core.as_bytes());
        for key in &self.config.metadata_keys_to_include {
            if let Some(value) = chunk.metadata.get(key) {
                hasher.update(b"|");
                hasher.update(value.to_string().as_bytes());
            }
        }
        *hasher.finalize().as_bytes()
    }

    /// Lowercase, strip odd punctuation, squeeze whitespace.
    fn normalize(&self, text: &str) -> String {
        let lower = text.to_lowercase();
        let stripped = self.strip_punct.replace_all(&lower, " ");
        self.squeeze_ws.replace_all(&stripped, " ").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ChunkSource;
    use serde_json::json;

    fn config() -> DedupConfig {
        DedupConfig {
            short_threshold_chars: 80,
            core_length_when_important: 1500,
            core_length_when_long: 40,
            preserve_keywords: vec!["cpi".to_string()],
            metadata_keys_to_include: vec!["source".to_string()],
        }
    }

    fn chunk(text: &str) -> Chunk {
        Chunk::new(text, "s", ChunkSource::Dense)
    }

    #[test]
    fn test_exact_duplicates_removed() {
        let dedup = Deduplicator::new(config());
        let set = CandidateSet::from(vec![
            chunk("gold rallied on rate cuts"),
            chunk("gold rallied on rate cuts"),
            chunk("a different chunk"),
        ]);

        let outcome = dedup.run(set);
        assert_eq!(outcome.candidates.len(), 2);
        assert_eq!(outcome.removed, 1);
    }

    #[test]
    fn test_normalized_duplicates_removed() {
        let dedup = Deduplicator::new(config());
        let set = CandidateSet::from(vec![
            chunk("Gold   Rallied, on rate cuts!"),
            chunk("gold rallied on rate cuts"),
        ]);

        let outcome = dedup.run(set);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[test]
    fn test_idempotent() {
        let dedup = Deduplicator::new(config());
        let set = CandidateSet::from(vec![
            chunk("alpha text body"),
            chunk("alpha text body"),
            chunk("beta text body"),
            chunk("gamma text body"),
        ]);

        let once = dedup.run(set);
        let once_texts: Vec<String> =
            once.candidates.iter().map(|c| c.text.clone()).collect();

        let twice = dedup.run(once.candidates);
        let twice_texts: Vec<String> =
            twice.candidates.iter().map(|c| c.text.clone()).collect();

        assert_eq!(once_texts, twice_texts);
        assert_eq!(twice.removed, 0);
    }

    #[test]
    fn test_long_texts_use_short_core() {
        let dedup = Deduplicator::new(config());
        // Same first 40 normalized chars, different tails: long-core rule
        // collapses them.
        let prefix = "this long boilerplate text repeats the same opening ";
        let set = CandidateSet::from(vec![
            chunk(&format!("{prefix}and then diverges one way entirely")),
            chunk(&format!("{prefix}but finishes on a different note")),
        ]);

        let outcome = dedup.run(set);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[test]
    fn test_preserve_keyword_keeps_variants_apart() {
        let dedup = Deduplicator::new(config());
        // Long texts (past the short threshold) sharing a prefix, but
        // carrying a preserve keyword: important texts use the long core,
        // so the differing tails keep them apart.
        let prefix = "the monthly cpi print commentary opens with the usual framing \
                      about shelter and services before the number itself ";
        let set = CandidateSet::from(vec![
            chunk(&format!("{prefix}came in at 3.1 percent")),
            chunk(&format!("{prefix}came in at 2.4 percent")),
        ]);

        let outcome = dedup.run(set);
        assert_eq!(outcome.candidates.len(), 2);
    }

    #[test]
    fn test_metadata_distinguishes_same_text() {
        let dedup = Deduplicator::new(config());
        let mut a = chunk("identical body text");
        a.metadata.insert("source".to_string(), json!("a.pdf"));
        let mut b = chunk("identical body text");
        b.metadata.insert("source".to_string(), json!("b.pdf"));

        let outcome = dedup.run(CandidateSet::from(vec![a, b]));
        assert_eq!(outcome.candidates.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let dedup = Deduplicator::new(config());
        let outcome = dedup.run(CandidateSet::new());
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.removed, 0);
    }
}
