//! Salient span extraction, self-gated.
//!
//! Sweeps each candidate's text with overlapping word windows and asks an
//! extractive QA reader for literal answer spans, replacing the candidate
//! set with the globally best spans. Useful for short factual asks; harmful
//! for everything else - hence the self-gate.
//!
//! The gate is pure policy, no model inference:
//!
//! - a literal-extraction trigger phrase ("summarize", "quote the
//!   paragraph") bypasses the stage: spans cannot summarize;
//! - a numeric/percentage pattern combined with a numeric-extraction
//!   keyword bypasses it too: numeric lookups read better with the full
//!   chunk around the number.
//!
//! When in doubt the stage runs - the reader's score threshold is the next
//! line of defense.

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use parla_model::ReaderModel;

use crate::chunk::{CandidateSet, Chunk, ChunkSource};
use crate::config::SsiConfig;

/// Spans consisting only of these are formatting artifacts, never answers.
const PUNCTUATION_SPANS: &[&str] = &[".", "-", "–", "—"];

/// Self-gated salient span extractor.
pub struct SalientSpanExtractor {
    config: SsiConfig,
    reader: Arc<dyn ReaderModel>,
    numeric_pattern: Regex,
}

impl std::fmt::Debug for SalientSpanExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SalientSpanExtractor")
            .field("enabled", &self.config.enabled)
            .field("window_size", &self.config.window_size)
            .field("stride", &self.config.stride)
            .finish()
    }
}

impl SalientSpanExtractor {
    /// Create an extractor from config and a reader backend.
    pub fn new(config: SsiConfig, reader: Arc<dyn ReaderModel>) -> Self {
        Self {
            config,
            reader,
            // Percent signs count with or without an attached number:
            // "the CPI %" is as numeric an ask as "3.1%".
            numeric_pattern: Regex::new(r"%|\$\d+|\d+\s?bps|basis points?|\d[\d.,]*")
                .expect("static regex"),
        }
    }

    /// Why the self-gate would bypass this query, if it would.
    ///
    /// Pure policy - safe to call from tests and logging without touching
    /// the reader.
    pub fn bypass_reason(&self, query: &str) -> Option<&'static str> {
        if !self.config.self_gating.enabled {
            return None;
        }

        let q = query.to_lowercase();

        for trigger in &self.config.self_gating.literal_extraction_triggers {
            if q.contains(&trigger.to_lowercase()) {
                return Some("literal extraction trigger");
            }
        }

        if self.numeric_pattern.is_match(&q) {
            for keyword in &self.config.self_gating.numeric_extraction_keywords {
                if q.contains(&keyword.to_lowercase()) {
                    return Some("numeric extraction intent");
                }
            }
        }

        None
    }

    /// Extract salient spans, or pass the candidates through untouched
    /// when disabled, gated, or starved of input.
    pub fn extract(&self, candidates: CandidateSet, query: &str) -> CandidateSet {
        if !self.config.enabled || candidates.is_empty() || query.trim().is_empty() {
            return candidates;
        }

        if let Some(reason) = self.bypass_reason(query) {
            info!("SSI bypassed: {}", reason);
            return candidates;
        }

        let mut spans: Vec<Chunk> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for chunk in candidates.iter() {
            let flattened = chunk.text.split_whitespace().collect::<Vec<_>>().join(" ");
            for window in self.sliding_windows(&flattened) {
                let proposals =
                    match self
                        .reader
                        .propose_spans(query, &window, self.config.top_k_per_doc)
                    {
                        Ok(p) => p,
                        Err(e) => {
                            // A failed window costs one window, not the stage.
                            debug!("Reader failed on window, skipping: {}", e);
                            continue;
                        }
                    };

                for proposal in proposals {
                    let text = proposal.text.trim();
                    if text.is_empty()
                        || PUNCTUATION_SPANS.contains(&text)
                        || text.replace('\n', "").trim().is_empty()
                    {
                        continue;
                    }
                    if proposal.score < self.config.min_score_threshold {
                        continue;
                    }
                    if !seen.insert(text.to_string()) {
                        continue;
                    }

                    debug!("SSI accepted span (score={:.4}): {}", proposal.score, text);

                    let mut span_chunk =
                        Chunk::new(text.to_string(), chunk.shard.clone(), ChunkSource::Span);
                    span_chunk.metadata = chunk.metadata.clone();
                    span_chunk.scores = chunk.scores.clone();
                    span_chunk.scores.span_score = Some(proposal.score);
                    spans.push(span_chunk);
                }
            }
        }

        if spans.is_empty() {
            warn!("SSI produced no spans above threshold; keeping original candidates");
            return candidates;
        }

        // Global ranking: score first, span length as tie-breaker when
        // configured.
        if self.config.prefer_longest_when_active {
            spans.sort_by(|a, b| {
                let sa = a.scores.span_score.unwrap_or(0.0);
                let sb = b.scores.span_score.unwrap_or(0.0);
                sb.partial_cmp(&sa)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.text.len().cmp(&a.text.len()))
            });
        } else {
            spans.sort_by(|a, b| {
                let sa = a.scores.span_score.unwrap_or(0.0);
                let sb = b.scores.span_score.unwrap_or(0.0);
                sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        spans.truncate(self.config.global_top_k);
        info!("SSI extracted {} spans", spans.len());
        CandidateSet::from(spans)
    }

    /// Overlapping word windows; the final window is anchored to the tail
    /// so the end of the text is always covered.
    fn sliding_windows(&self, text: &str) -> Vec<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let size = self.config.window_size;
        let step = self.config.stride;

        if words.len() <= size {
            return vec![words.join(" ")];
        }

        let mut windows = Vec::new();
        let mut start = 0;
        let mut last_start = 0;
        while start + size <= words.len() {
            windows.push(words[start..start + size].join(" "));
            last_start = start;
            start += step;
        }
        // Anchor a final window to the tail unless the loop already
        // covered it.
        if last_start != words.len() - size {
            windows.push(words[words.len() - size..].join(" "));
        }
        windows
    }
}
