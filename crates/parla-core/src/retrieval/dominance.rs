//! Dominance filter: z-score outlier narrowing.
//!
//! After fusion, a handful of candidates sometimes sits far above the rest
//! of the score distribution - the query hit one document dead-on and the
//! remainder is noise. When that standout cluster exists, answering from
//! it alone beats diluting the context with the tail.
//!
//! Detection: sort by `dominance_score` descending, compute mean/std over
//! everything *except* the top item (the top item would inflate its own
//! background), z-score every item against that background, and when any
//! item reaches the threshold keep the contiguous prefix down to the last
//! item at/above it.
//!
//! The filter refuses to guess on thin data: fewer than five candidates,
//! or a near-zero background spread, returns the set unchanged with a
//! `false` dominance flag.

use tracing::{debug, info};

use crate::chunk::CandidateSet;

/// Minimum candidate count for dominance detection.
const MIN_CANDIDATES: usize = 5;

/// Background spread below which outliers cannot be distinguished.
const MIN_STD: f32 = 1e-9;

/// Apply the dominance filter.
///
/// Returns the (possibly narrowed) set and whether a dominant cluster was
/// found.
pub fn dominance_filter(candidates: CandidateSet, z_threshold: f32) -> (CandidateSet, bool) {
    if candidates.len() < MIN_CANDIDATES {
        debug!(
            "Dominance: {} candidates < {} - skipped",
            candidates.len(),
            MIN_CANDIDATES
        );
        return (candidates, false);
    }

    let mut sorted = candidates.into_vec();
    sorted.sort_by(|a, b| {
        b.dominance_score()
            .partial_cmp(&a.dominance_score())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let scores: Vec<f32> = sorted.iter().map(|c| c.dominance_score()).collect();

    // Background statistics exclude the top item.
    let rest = &scores[1..];
    let mean = rest.iter().sum::<f32>() / rest.len() as f32;
    let variance = rest.iter().map(|s| (s - mean).powi(2)).sum::<f32>() / rest.len() as f32;
    let std = variance.sqrt();

    if std < MIN_STD {
        debug!("Dominance: background std ~ 0 - cannot distinguish outliers, skipped");
        return (CandidateSet::from(sorted), false);
    }

    // Last position still at/above the threshold bounds the kept prefix.
    let last_dominant = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| (**s - mean) / std >= z_threshold)
        .map(|(i, _)| i)
        .next_back();

    match last_dominant {
        Some(last) => {
            sorted.truncate(last + 1);
            info!(
                "Dominance detected: keeping {} of {} candidates",
                sorted.len(),
                scores.len()
            );
            (CandidateSet::from(sorted), true)
        }
        None => {
            debug!("Dominance: no candidate reached z >= {}", z_threshold);
            (CandidateSet::from(sorted), false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunk, ChunkSource};

    fn set_with_scores(scores: &[f32]) -> CandidateSet {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                let mut c = Chunk::new(format!("chunk {i}"), "s", ChunkSource::Dense);
                c.scores.dominance_score = Some(s);
                c
            })
            .collect()
    }

    #[test]
    fn test_small_set_is_noop() {
        let set = set_with_scores(&[9.0, 1.0, 1.0, 1.0]);
        let (out, dominant) = dominance_filter(set, 3.0);
        assert!(!dominant);
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn test_flat_background_is_noop() {
        // Background (all but top) has zero spread
        let set = set_with_scores(&[5.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        let (out, dominant) = dominance_filter(set, 3.0);
        assert!(!dominant);
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_dominant_outlier_kept() {
        // One standout against a noisy-but-low background
        let set = set_with_scores(&[50.0, 1.2, 1.0, 0.8, 1.1, 0.9]);
        let (out, dominant) = dominance_filter(set, 3.0);
        assert!(dominant);
        assert_eq!(out.len(), 1);
        assert_eq!(out.as_slice()[0].dominance_score(), 50.0);
    }

    #[test]
    fn test_dominant_cluster_is_contiguous_prefix() {
        let set = set_with_scores(&[50.0, 48.0, 1.2, 1.0, 0.8, 1.1]);
        let (out, dominant) = dominance_filter(set, 1.9);
        assert!(dominant);
        assert_eq!(out.len(), 2);
        // Sorted descending, both dominant items survive
        assert!(out.as_slice()[0].dominance_score() >= out.as_slice()[1].dominance_score());
    }

    #[test]
    fn test_no_outlier_below_threshold() {
        let set = set_with_scores(&[2.0, 1.8, 1.6, 1.4, 1.2, 1.0]);
        let (out, dominant) = dominance_filter(set, 5.0);
        assert!(!dominant);
        assert_eq!(out.len(), 6);
    }

    #[test]
    fn test_empty_set() {
        let (out, dominant) = dominance_filter(CandidateSet::new(), 3.0);
        assert!(!dominant);
        assert!(out.is_empty());
    }
}
