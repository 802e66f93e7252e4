//! Query intent classification.
//!
//! Heuristic keyword rules cover the overwhelming majority of traffic and
//! cost nothing; only queries no rule matches are sent to the chat model,
//! and its answer is accepted only when it is a member of the known label
//! set. The classifier never fails: any model error degrades to
//! [`QueryIntent::Fuzzy`].

use std::sync::Arc;

use tracing::{debug, info};

use parla_model::{ChatMessage, ChatModel};

use super::QueryIntent;

/// Broad/overview keywords, checked first.
const BROAD_KEYWORDS: &[&str] = &["summarize", "overview", "dominant", "narratives", "themes"];

/// Enumeration keywords.
const ENUMERATION_KEYWORDS: &[&str] = &["list", "enumerate", "main risks", "key drivers"];

/// Analytical keywords.
const ANALYTICAL_KEYWORDS: &[&str] = &["why", "drivers", "catalysts", "factors", "explain"];

/// Temporal keywords.
const TEMPORAL_KEYWORDS: &[&str] = &["when", "timeline", "since", "evolution"];

/// Interrogative lead-ins for the short-specific-question rule.
const SPECIFIC_LEADINS: &[&str] = &["what", "how much", "which", "is", "does"];

/// Maximum word count for the short-specific-question rule.
const SPECIFIC_MAX_WORDS: usize = 14;

/// Heuristic-first intent classifier with an optional chat-model fallback.
pub struct QueryClassifier {
    fallback: Option<Arc<dyn ChatModel>>,
}

impl std::fmt::Debug for QueryClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryClassifier")
            .field("llm_fallback", &self.fallback.is_some())
            .finish()
    }
}

impl QueryClassifier {
    /// Create a classifier with a chat-model fallback.
    pub fn new(fallback: Arc<dyn ChatModel>) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }

    /// Create a heuristics-only classifier.
    pub fn heuristic_only() -> Self {
        Self { fallback: None }
    }

    /// Classify a query. Never fails; unknown shapes become `Fuzzy`.
    pub fn classify(&self, query: &str) -> QueryIntent {
        let q = query.to_lowercase();
        let q = q.trim();

        // Fixed priority order: broad → enumeration → analytical →
        // temporal → short-specific.
        if contains_any(q, BROAD_KEYWORDS) {
            return self.log_and_return(query, QueryIntent::Broad);
        }
        if contains_any(q, ENUMERATION_KEYWORDS) {
            return self.log_and_return(query, QueryIntent::Enumeration);
        }
        if contains_any(q, ANALYTICAL_KEYWORDS) {
            return self.log_and_return(query, QueryIntent::Analytical);
        }
        if contains_any(q, TEMPORAL_KEYWORDS) {
            return self.log_and_return(query, QueryIntent::Temporal);
        }
        if q.split_whitespace().count() <= SPECIFIC_MAX_WORDS
            && SPECIFIC_LEADINS.iter().any(|lead| q.starts_with(lead))
        {
            return self.log_and_return(query, QueryIntent::Specific);
        }

        // LLM fallback: accept only known labels, degrade to Fuzzy on
        // anything else (including model failure).
        if let Some(ref model) = self.fallback {
            match model.complete(&self.fallback_prompt(query)) {
                Ok(reply) => {
                    if let Some(intent) = QueryIntent::from_wire(reply.trim()) {
                        return self.log_and_return(query, intent);
                    }
                    debug!("Classifier fallback returned unknown label: {}", reply.trim());
                }
                Err(e) => {
                    debug!("Classifier fallback error: {}", e);
                }
            }
        }

        self.log_and_return(query, QueryIntent::Fuzzy)
    }

    fn fallback_prompt(&self, query: &str) -> Vec<ChatMessage> {
        let labels: Vec<&str> = QueryIntent::ALL.iter().map(|i| i.as_str()).collect();
        vec![
            ChatMessage::system(format!(
                "Classify the user's query into exactly one of these labels: {}. \
                 Reply with the label only.",
                labels.join(", ")
            )),
            ChatMessage::user(query.to_string()),
        ]
    }

    fn log_and_return(&self, query: &str, intent: QueryIntent) -> QueryIntent {
        info!(
            intent = intent.as_str(),
            query = truncate(query, 200),
            "Query classified"
        );
        intent
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
