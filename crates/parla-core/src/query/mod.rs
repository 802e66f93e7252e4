//! Query understanding: intent classification, rewriting, expansion.
//!
//! These stages run before retrieval and decide both *what* is searched
//! (the possibly rewritten/expanded query) and *how* (per-intent stage
//! flags).

mod classifier;
mod expand;
mod rewrite;

pub use classifier::QueryClassifier;
pub use expand::QueryExpander;
pub use rewrite::QueryRewriter;

use serde::{Deserialize, Serialize};

// ============================================================================
// QueryIntent
// ============================================================================

/// Closed set of query intent labels.
///
/// Wire values match the labels the classification model is asked to emit;
/// anything outside this set degrades to [`QueryIntent::Fuzzy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryIntent {
    /// Survey/overview asks ("summarize", "themes").
    #[serde(rename = "broad_query")]
    Broad,
    /// List-shaped asks ("enumerate the main risks").
    #[serde(rename = "enumeration_query")]
    Enumeration,
    /// Causal/explanatory asks ("why", "drivers").
    #[serde(rename = "analytical_query")]
    Analytical,
    /// Time-anchored asks ("since when", "timeline").
    #[serde(rename = "temporal_query")]
    Temporal,
    /// Short factual asks ("what is the Q3 margin?").
    #[serde(rename = "specific_query")]
    Specific,
    /// Anything unclassifiable.
    #[serde(rename = "fuzzy_query")]
    Fuzzy,
}

impl QueryIntent {
    /// All intents, in classification priority order.
    pub const ALL: [QueryIntent; 6] = [
        QueryIntent::Broad,
        QueryIntent::Enumeration,
        QueryIntent::Analytical,
        QueryIntent::Temporal,
        QueryIntent::Specific,
        QueryIntent::Fuzzy,
    ];

    /// Wire value of this intent.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Broad => "broad_query",
            Self::Enumeration => "enumeration_query",
            Self::Analytical => "analytical_query",
            Self::Temporal => "temporal_query",
            Self::Specific => "specific_query",
            Self::Fuzzy => "fuzzy_query",
        }
    }

    /// Parse a wire value; `None` for anything outside the known set.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value.trim() {
            "broad_query" => Some(Self::Broad),
            "enumeration_query" => Some(Self::Enumeration),
            "analytical_query" => Some(Self::Analytical),
            "temporal_query" => Some(Self::Temporal),
            "specific_query" => Some(Self::Specific),
            "fuzzy_query" => Some(Self::Fuzzy),
            _ => None,
        }
    }

    /// The per-intent stage flags (before global switches are applied).
    ///
    /// Enumeration queries skip query reshaping entirely: the user already
    /// named the thing to list, and reshaping list asks tends to drop the
    /// "list" shape. Span extraction only helps short factual asks.
    pub fn stage_flags(&self) -> StageFlags {
        match self {
            Self::Broad => StageFlags {
                rewrite: false,
                expand: true,
                ssi: false,
                rerank: false,
            },
            Self::Enumeration => StageFlags {
                rewrite: false,
                expand: false,
                ssi: false,
                rerank: true,
            },
            Self::Analytical => StageFlags {
                rewrite: true,
                expand: true,
                ssi: false,
                rerank: true,
            },
            Self::Temporal => StageFlags {
                rewrite: true,
                expand: false,
                ssi: false,
                rerank: true,
            },
            Self::Specific => StageFlags {
                rewrite: false,
                expand: false,
                ssi: true,
                rerank: true,
            },
            Self::Fuzzy => StageFlags {
                rewrite: true,
                expand: true,
                ssi: false,
                rerank: true,
            },
        }
    }
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// StageFlags
// ============================================================================

/// Which optional pipeline stages run for a given query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFlags {
    /// Run the query rewriter.
    pub rewrite: bool,
    /// Run the query expander.
    pub expand: bool,
    /// Run salient span extraction.
    pub ssi: bool,
    /// Run the cross-encoder reranker.
    pub rerank: bool,
}

impl StageFlags {
    /// All stages enabled.
    pub fn all() -> Self {
        Self {
            rewrite: true,
            expand: true,
            ssi: true,
            rerank: true,
        }
    }

    /// All stages disabled.
    pub fn none() -> Self {
        Self {
            rewrite: false,
            expand: false,
            ssi: false,
            rerank: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        for intent in QueryIntent::ALL {
            assert_eq!(QueryIntent::from_wire(intent.as_str()), Some(intent));
        }
        assert_eq!(QueryIntent::from_wire("something_else"), None);
        assert_eq!(QueryIntent::from_wire(" specific_query "), Some(QueryIntent::Specific));
    }

    #[test]
    fn test_enumeration_flags() {
        let flags = QueryIntent::Enumeration.stage_flags();
        assert!(!flags.rewrite);
        assert!(!flags.expand);
        assert!(!flags.ssi);
        assert!(flags.rerank);
    }

    #[test]
    fn test_specific_enables_ssi() {
        let flags = QueryIntent::Specific.stage_flags();
        assert!(flags.ssi);
        assert!(flags.rerank);
    }
}
