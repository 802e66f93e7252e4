//! Query expansion.
//!
//! Asks the chat model for five differently-angled reformulations of the
//! query, parses only numbered lines (`"<digit>. text"`), and switches to
//! an OR-combination of up to five of them - but only when at least three
//! lines parsed. Fewer than three means the model did not really follow
//! the format, and a half-expanded query retrieves worse than the
//! original. Model failure returns the original query unchanged.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use parla_model::{ChatMessage, ChatModel};

/// Number of reformulations requested from the model.
const REQUESTED_VARIANTS: usize = 5;

/// Minimum parsed lines required before the expansion is used.
const MIN_PARSED_VARIANTS: usize = 3;

/// Maximum variants combined into the final query.
const MAX_COMBINED_VARIANTS: usize = 5;

/// Chat-model-backed query expander with an identity fallback.
pub struct QueryExpander {
    model: Arc<dyn ChatModel>,
    line_pattern: Regex,
}

impl std::fmt::Debug for QueryExpander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryExpander")
            .field("model", &self.model.model_id())
            .finish()
    }
}

impl QueryExpander {
    /// Create an expander backed by the given chat model.
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self {
            model,
            line_pattern: Regex::new(r"^\s*\d+\.\s*(.+)$").expect("static regex"),
        }
    }

    /// Expand a query, or return it unchanged when parsing fails or the
    /// model call errors.
    pub fn expand(&self, query: &str) -> String {
        let messages = vec![
            ChatMessage::system(format!(
                "Generate {} differently-angled reformulations of the user's \
                 query for document retrieval. Number them 1. to {}., one per \
                 line, no other text.",
                REQUESTED_VARIANTS, REQUESTED_VARIANTS
            )),
            ChatMessage::user(query.to_string()),
        ];

        let raw = match self.model.complete(&messages) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("Expansion failed, keeping original query: {}", e);
                return query.to_string();
            }
        };

        let variants = self.parse_numbered_lines(&raw);

        if variants.len() < MIN_PARSED_VARIANTS {
            debug!(
                "Expansion rejected: only {} of {} required lines parsed",
                variants.len(),
                MIN_PARSED_VARIANTS
            );
            return query.to_string();
        }

        let combined = variants
            .iter()
            .take(MAX_COMBINED_VARIANTS)
            .cloned()
            .collect::<Vec<_>>()
            .join(" OR ");

        info!(
            original = query,
            variants = variants.len(),
            "Query expanded"
        );
        combined
    }

    /// Parse `"<digit>. text"` lines; everything else is ignored.
    fn parse_numbered_lines(&self, raw: &str) -> Vec<String> {
        raw.lines()
            .filter_map(|line| {
                self.line_pattern
                    .captures(line)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parla_model::{ModelError, ModelResult};

    #[derive(Debug)]
    struct ScriptedChat {
        reply: Result<String, ()>,
    }

    impl ChatModel for ScriptedChat {
        fn complete(&self, _messages: &[ChatMessage]) -> ModelResult<String> {
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(()) => Err(ModelError::chat_failed("scripted", "down")),
            }
        }

        fn model_id(&self) -> &str {
            "scripted"
        }
    }

    fn expander(reply: Result<&str, ()>) -> QueryExpander {
        QueryExpander::new(Arc::new(ScriptedChat {
            reply: reply.map(str::to_string),
        }))
    }

    #[test]
    fn test_expands_well_formed_reply() {
        let e = expander(Ok(
            "1. gold price drivers 2024\n2. why did gold rally\n3. gold rate cut sensitivity\n4. real yields and gold\n5. central bank gold buying",
        ));
        let out = e.expand("what moved gold?");
        assert!(out.contains(" OR "));
        assert_eq!(out.matches(" OR ").count(), 4);
        assert!(out.starts_with("gold price drivers 2024"));
    }

    #[test]
    fn test_requires_three_parsed_lines() {
        let e = expander(Ok("1. gold drivers\n2. gold rally\nsome chatter"));
        assert_eq!(e.expand("what moved gold?"), "what moved gold?");
    }

    #[test]
    fn test_ignores_unnumbered_lines() {
        let e = expander(Ok(
            "Here are some ideas:\n1. alpha\n2. beta\n- gamma\n3. delta\nclosing remarks",
        ));
        let out = e.expand("q");
        assert_eq!(out, "alpha OR beta OR delta");
    }

    #[test]
    fn test_caps_at_five_variants() {
        let e = expander(Ok(
            "1. a1\n2. a2\n3. a3\n4. a4\n5. a5\n6. a6\n7. a7",
        ));
        let out = e.expand("q");
        assert_eq!(out.matches(" OR ").count(), 4);
        assert!(!out.contains("a6"));
    }

    #[test]
    fn test_model_failure_is_identity() {
        let e = expander(Err(()));
        assert_eq!(e.expand("what moved gold?"), "what moved gold?");
    }

    #[test]
    fn test_empty_reply_is_identity() {
        let e = expander(Ok(""));
        assert_eq!(e.expand("what moved gold?"), "what moved gold?");
    }
}
