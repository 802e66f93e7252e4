//! Per-turn routing state machine.
//!
//! One [`Orchestrator::handle_turn`] call runs the states in order, first
//! match wins:
//!
//! 1. **Resume** - an in-flight action intent gets the turn first
//! 2. **Detect** - new-intent detection/execution
//! 3. **Retrieve** - the hybrid pipeline produces candidates + best score
//! 4. **Route** - no candidates or best score under the threshold →
//!    fallback (prompt-only); otherwise RAG
//! 5. **Respond** - call the responder with (or without) the retrieved
//!    context, parse a structured payload when present, append the turn to
//!    the session, record metrics
//!
//! Metrics are recorded on **every** path, and a turn never ends with an
//! unhandled error or an empty string: unexpected failures are caught once
//! here, assigned a short correlation id, logged with a state snapshot,
//! and surfaced as a short user-safe message carrying that id.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use parla_model::{ChatMessage, ChatModel};

use crate::chunk::CandidateSet;
use crate::intent::{IntentFlag, IntentRegistry};
use crate::pipeline::RetrievalPipeline;
use crate::session::{SessionStore, TurnRole};

/// Answer returned when the responder yields an empty string.
const EMPTY_ANSWER_FALLBACK: &str = "No strong evidence found in retrieved context.";

// ============================================================================
// RoutingDecision / TurnMetrics / TurnReply
// ============================================================================

/// Which branch answered the turn. Exactly one per turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingDecision {
    /// An action intent handled the turn.
    Intent,
    /// Retrieval-grounded answer.
    Rag,
    /// Prompt-only answer, no retrieved context.
    Fallback,
}

impl RoutingDecision {
    /// Wire value of this decision.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intent => "intent",
            Self::Rag => "rag",
            Self::Fallback => "fallback",
        }
    }
}

/// Per-turn routing metrics, recorded unconditionally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetrics {
    /// Routing mode ("intent" / "rag" / "fallback").
    pub mode: String,
    /// Candidates that survived the pipeline.
    pub docs_found: usize,
    /// Best similarity seen by routing, if retrieval ran.
    pub best_score: Option<f32>,
    /// Intent label (query intent, or action-intent name on that branch).
    pub intent: Option<String>,
    /// Intent progress flag or structured-payload flag.
    pub flag: Option<String>,
}

/// The orchestrator's reply for one turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    /// User-facing answer. Never empty.
    pub answer: String,
    /// Which branch fired.
    pub decision: RoutingDecision,
    /// The recorded metrics.
    pub metrics: TurnMetrics,
}

/// Structured payload some responder prompts emit.
#[derive(Debug, Deserialize)]
struct StructuredReply {
    answer: String,
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    specific_flag: Option<bool>,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// The hybrid routing orchestrator.
pub struct Orchestrator {
    pipeline: RetrievalPipeline,
    registry: IntentRegistry,
    sessions: Arc<SessionStore>,
    responder: Arc<dyn ChatModel>,
    retrieval_score_threshold: f32,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("threshold", &self.retrieval_score_threshold)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Orchestrator {
    /// Create an orchestrator.
    pub fn new(
        pipeline: RetrievalPipeline,
        registry: IntentRegistry,
        sessions: Arc<SessionStore>,
        responder: Arc<dyn ChatModel>,
        retrieval_score_threshold: f32,
    ) -> Self {
        Self {
            pipeline,
            registry,
            sessions,
            responder,
            retrieval_score_threshold,
        }
    }

    /// The session store backing this orchestrator.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Handle one user turn. Infallible: every failure path produces a
    /// user-safe answer and metrics.
    pub fn handle_turn(&self, session_id: &str, user_text: &str) -> TurnReply {
        let user_text = user_text.trim();

        // 1. Resume an in-flight action intent.
        if let Some(response) = self.registry.resume_any(session_id, user_text) {
            return self.finish_intent_turn(session_id, user_text, response);
        }

        // 2. Detect a new action intent.
        if let Some(response) = self.registry.detect_any(session_id, user_text) {
            return self.finish_intent_turn(session_id, user_text, response);
        }

        // 3. Retrieve.
        let history = self.sessions.history(session_id);
        let outcome = match self.pipeline.run(user_text, &history) {
            Ok(outcome) => outcome,
            Err(e) => {
                return self.fatal_turn(session_id, user_text, &e.to_string(), 0);
            }
        };

        // 4. Route.
        let docs_found = outcome.candidates.len();
        let best_score = outcome.best_score;
        let use_fallback =
            docs_found == 0 || best_score.unwrap_or(0.0) < self.retrieval_score_threshold;
        let decision = if use_fallback {
            RoutingDecision::Fallback
        } else {
            RoutingDecision::Rag
        };

        info!(
            mode = decision.as_str(),
            docs_found,
            best_score = best_score.unwrap_or(0.0),
            query = truncate(user_text, 200),
            "Routing decision"
        );

        // 5. Respond.
        let context = if decision == RoutingDecision::Rag {
            Some(&outcome.candidates)
        } else {
            None
        };

        let (answer, payload_intent, payload_flag) =
            match self.call_responder(user_text, &history, context) {
                Ok(parsed) => parsed,
                Err(e) => {
                    return self.fatal_turn(session_id, user_text, &e.to_string(), docs_found);
                }
            };

        self.sessions.append(session_id, TurnRole::User, user_text);
        self.sessions
            .append(session_id, TurnRole::Assistant, answer.clone());

        let metrics = TurnMetrics {
            mode: decision.as_str().to_string(),
            docs_found,
            best_score,
            intent: Some(
                payload_intent.unwrap_or_else(|| outcome.intent.as_str().to_string()),
            ),
            flag: payload_flag.map(|f| f.to_string()),
        };
        record_metrics(&metrics, user_text);

        TurnReply {
            answer,
            decision,
            metrics,
        }
    }

    /// Finish an intent-handled turn: bookkeeping + metrics.
    fn finish_intent_turn(
        &self,
        session_id: &str,
        user_text: &str,
        response: crate::intent::IntentResponse,
    ) -> TurnReply {
        self.sessions.append(session_id, TurnRole::User, user_text);
        self.sessions
            .append(session_id, TurnRole::Assistant, response.answer.clone());

        // A completed action closes the conversational episode.
        if response.flag == IntentFlag::Completed {
            self.sessions.reset(session_id);
        }

        let metrics = TurnMetrics {
            mode: RoutingDecision::Intent.as_str().to_string(),
            docs_found: 0,
            best_score: None,
            intent: Some(response.intent.as_str().to_string()),
            flag: Some(response.flag.as_str().to_string()),
        };
        record_metrics(&metrics, user_text);

        TurnReply {
            answer: response.answer,
            decision: RoutingDecision::Intent,
            metrics,
        }
    }

    /// Call the responder and parse its reply.
    ///
    /// Returns (answer, payload intent, payload flag).
    fn call_responder(
        &self,
        user_text: &str,
        history: &[(String, String)],
        context: Option<&CandidateSet>,
    ) -> Result<(String, Option<String>, Option<bool>), crate::ParlaError> {
        let mut messages = Vec::with_capacity(history.len() + 2);

        match context {
            Some(candidates) => {
                let joined = candidates
                    .iter()
                    .map(|c| c.text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n---\n\n");
                messages.push(ChatMessage::system(format!(
                    "Answer grounded in the following context.\n\nContext:\n{joined}"
                )));
            }
            None => {
                messages.push(ChatMessage::system(
                    "Answer from general knowledge; no document context is available.",
                ));
            }
        }

        for (role, text) in history {
            match role.as_str() {
                "assistant" => messages.push(ChatMessage::assistant(text.clone())),
                _ => messages.push(ChatMessage::user(text.clone())),
            }
        }
        messages.push(ChatMessage::user(user_text.to_string()));

        let raw = self
            .responder
            .complete(&messages)
            .map_err(|e| crate::ParlaError::ResponderFailed {
                reason: e.to_string(),
            })?;

        // Structured payload when present, plain text otherwise.
        let (answer, intent, flag) =
            match serde_json::from_str::<StructuredReply>(raw.trim()) {
                Ok(parsed) => (parsed.answer, parsed.intent, parsed.specific_flag),
                Err(_) => (raw.trim().to_string(), None, None),
            };

        let answer = if answer.trim().is_empty() {
            warn!("Responder returned empty answer; substituting default");
            EMPTY_ANSWER_FALLBACK.to_string()
        } else {
            answer
        };

        Ok((answer, intent, flag))
    }

    /// Terminal error path: correlation id, state snapshot, safe message.
    fn fatal_turn(
        &self,
        session_id: &str,
        user_text: &str,
        reason: &str,
        docs_found: usize,
    ) -> TurnReply {
        let correlation_id: String = uuid::Uuid::new_v4().to_string()[..8].to_string();

        error!(
            correlation_id = correlation_id.as_str(),
            session_id,
            query = truncate(user_text, 200),
            docs_found,
            "Turn failed: {}",
            reason
        );

        let answer = format!(
            "Something went wrong while answering. Please try again (ref {correlation_id})."
        );

        self.sessions.append(session_id, TurnRole::User, user_text);
        self.sessions
            .append(session_id, TurnRole::Assistant, answer.clone());

        let metrics = TurnMetrics {
            mode: RoutingDecision::Fallback.as_str().to_string(),
            docs_found,
            best_score: None,
            intent: None,
            flag: None,
        };
        record_metrics(&metrics, user_text);

        TurnReply {
            answer,
            decision: RoutingDecision::Fallback,
            metrics,
        }
    }
}

/// Emit the per-turn metrics record. One call per turn, every branch.
fn record_metrics(metrics: &TurnMetrics, user_text: &str) {
    info!(
        mode = metrics.mode.as_str(),
        docs_found = metrics.docs_found,
        best_score = metrics.best_score.unwrap_or(0.0),
        intent = metrics.intent.as_deref().unwrap_or(""),
        flag = metrics.flag.as_deref().unwrap_or(""),
        query = truncate(user_text, 200),
        "metric_query_handled"
    );
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_decision_wire_values() {
        assert_eq!(RoutingDecision::Intent.as_str(), "intent");
        assert_eq!(RoutingDecision::Rag.as_str(), "rag");
        assert_eq!(RoutingDecision::Fallback.as_str(), "fallback");
    }

    #[test]
    fn test_structured_reply_parses() {
        let parsed: StructuredReply = serde_json::from_str(
            r#"{"answer": "gold rallied", "intent": "specific_query", "specific_flag": true}"#,
        )
        .unwrap();
        assert_eq!(parsed.answer, "gold rallied");
        assert_eq!(parsed.intent.as_deref(), Some("specific_query"));
        assert_eq!(parsed.specific_flag, Some(true));
    }

    #[test]
    fn test_structured_reply_requires_answer() {
        let result = serde_json::from_str::<StructuredReply>(r#"{"intent": "x"}"#);
        assert!(result.is_err());
    }
}
