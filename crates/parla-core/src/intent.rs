//! Action intents: multi-turn business actions that short-circuit
//! retrieval.
//!
//! Some user turns are not questions at all - they start or continue an
//! action ("send the transfer", "download that listing"). The orchestrator
//! gives such intents the turn *before* retrieval: an in-flight intent
//! resumes first, then new-intent detection runs, and only unhandled turns
//! reach the pipeline.
//!
//! Executors themselves are deployment-specific and live outside this
//! crate; what ships here is the capability trait and a registry keyed by
//! a closed enumeration, resolved at startup so all wiring is statically
//! verifiable - no dynamic class loading by string name.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// ============================================================================
// IntentKind
// ============================================================================

/// Closed set of action intents a deployment may wire in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    /// Money transfer slot-filling flow.
    MoneyTransfer,
    /// Direct document/file lookup and injection.
    DocumentLookup,
    /// Portfolio rotation flow.
    PortfolioRotation,
}

impl IntentKind {
    /// Wire value of this intent kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MoneyTransfer => "money_transfer",
            Self::DocumentLookup => "document_lookup",
            Self::PortfolioRotation => "portfolio_rotation",
        }
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// IntentFlag / IntentResponse
// ============================================================================

/// Progress flag reported by an intent turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentFlag {
    /// The intent needs more slots; the reply asks for them.
    #[serde(rename = "ASK_MISSING")]
    AskMissing,
    /// The action executed; the conversational session may be reset.
    #[serde(rename = "COMPLETED")]
    Completed,
}

impl IntentFlag {
    /// Wire value of this flag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AskMissing => "ASK_MISSING",
            Self::Completed => "COMPLETED",
        }
    }
}

/// An intent's handled-turn reply.
#[derive(Debug, Clone)]
pub struct IntentResponse {
    /// The user-facing answer for this turn.
    pub answer: String,
    /// Which intent handled the turn.
    pub intent: IntentKind,
    /// Progress flag.
    pub flag: IntentFlag,
}

// ============================================================================
// ActionIntent trait
// ============================================================================

/// A multi-turn action intent.
///
/// Implementations own their per-session slot state. `resume` is only
/// consulted while `is_active` reports an in-flight session; `try_handle`
/// performs detection on fresh turns and may start a session.
pub trait ActionIntent: Send + Sync {
    /// Which closed-enum intent this executor implements.
    fn kind(&self) -> IntentKind;

    /// Whether this intent has an in-flight session for `session_id`.
    fn is_active(&self, session_id: &str) -> bool;

    /// Continue an in-flight session. `None` means the turn was not
    /// consumed and normal processing continues.
    fn resume(&self, session_id: &str, user_text: &str) -> Option<IntentResponse>;

    /// Detect and possibly start handling a new intent. `None` means not
    /// detected.
    fn try_handle(&self, session_id: &str, user_text: &str) -> Option<IntentResponse>;
}

// ============================================================================
// IntentRegistry
// ============================================================================

/// Startup-resolved registry of action intents.
///
/// Registration order is priority order for both resume and detection.
#[derive(Default)]
pub struct IntentRegistry {
    intents: Vec<Box<dyn ActionIntent>>,
}

impl std::fmt::Debug for IntentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds: Vec<&str> = self.intents.iter().map(|i| i.kind().as_str()).collect();
        f.debug_struct("IntentRegistry").field("intents", &kinds).finish()
    }
}

impl IntentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an intent executor. Duplicate kinds are rejected so wiring
    /// mistakes surface at startup.
    pub fn register(mut self, intent: Box<dyn ActionIntent>) -> Result<Self, crate::ParlaError> {
        if self.intents.iter().any(|i| i.kind() == intent.kind()) {
            return Err(crate::ParlaError::InvalidConfiguration {
                message: format!("intent `{}` registered twice", intent.kind()),
                hint: "Each IntentKind may have exactly one executor".to_string(),
            });
        }
        debug!(intent = intent.kind().as_str(), "Intent registered");
        self.intents.push(intent);
        Ok(self)
    }

    /// Number of registered intents.
    pub fn len(&self) -> usize {
        self.intents.len()
    }

    /// Whether no intents are registered.
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    /// Give the turn to an in-flight intent, if any.
    pub fn resume_any(&self, session_id: &str, user_text: &str) -> Option<IntentResponse> {
        for intent in &self.intents {
            if intent.is_active(session_id) {
                if let Some(response) = intent.resume(session_id, user_text) {
                    info!(
                        intent = response.intent.as_str(),
                        flag = response.flag.as_str(),
                        "Turn handled by in-flight intent"
                    );
                    return Some(response);
                }
            }
        }
        None
    }

    /// Run new-intent detection in registration order.
    pub fn detect_any(&self, session_id: &str, user_text: &str) -> Option<IntentResponse> {
        for intent in &self.intents {
            if let Some(response) = intent.try_handle(session_id, user_text) {
                info!(
                    intent = response.intent.as_str(),
                    flag = response.flag.as_str(),
                    "Turn handled by detected intent"
                );
                return Some(response);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted slot-filling intent for tests: first turn asks for the
    /// amount, second completes.
    #[derive(Debug, Default)]
    struct ScriptedTransfer {
        active: Mutex<Option<String>>,
    }

    impl ActionIntent for ScriptedTransfer {
        fn kind(&self) -> IntentKind {
            IntentKind::MoneyTransfer
        }

        fn is_active(&self, session_id: &str) -> bool {
            self.active.lock().unwrap().as_deref() == Some(session_id)
        }

        fn resume(&self, session_id: &str, _user_text: &str) -> Option<IntentResponse> {
            if !self.is_active(session_id) {
                return None;
            }
            *self.active.lock().unwrap() = None;
            Some(IntentResponse {
                answer: "Transfer sent.".to_string(),
                intent: IntentKind::MoneyTransfer,
                flag: IntentFlag::Completed,
            })
        }

        fn try_handle(&self, session_id: &str, user_text: &str) -> Option<IntentResponse> {
            if !user_text.contains("transfer") {
                return None;
            }
            *self.active.lock().unwrap() = Some(session_id.to_string());
            Some(IntentResponse {
                answer: "How much should I send?".to_string(),
                intent: IntentKind::MoneyTransfer,
                flag: IntentFlag::AskMissing,
            })
        }
    }

    #[test]
    fn test_detect_then_resume() {
        let registry = IntentRegistry::new()
            .register(Box::new(ScriptedTransfer::default()))
            .unwrap();

        // Nothing in flight yet
        assert!(registry.resume_any("s", "hello").is_none());

        // Detection starts the session
        let first = registry.detect_any("s", "please transfer money").unwrap();
        assert_eq!(first.flag, IntentFlag::AskMissing);

        // Resume completes it
        let second = registry.resume_any("s", "100 ARS").unwrap();
        assert_eq!(second.flag, IntentFlag::Completed);

        // Session is done
        assert!(registry.resume_any("s", "more").is_none());
    }

    #[test]
    fn test_unrelated_turn_not_handled() {
        let registry = IntentRegistry::new()
            .register(Box::new(ScriptedTransfer::default()))
            .unwrap();
        assert!(registry.detect_any("s", "what moved gold?").is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = IntentRegistry::new()
            .register(Box::new(ScriptedTransfer::default()))
            .unwrap()
            .register(Box::new(ScriptedTransfer::default()));
        assert!(result.is_err());
    }
}
