//! Session store: per-conversation turn history.
//!
//! An injected store with a defined lifetime, replacing the usual
//! module-global chat dict. Sessions are keyed by id, hold an ordered list
//! of (role, text) turns, grow append-only, and live for the process
//! lifetime unless an intent completing resets them explicitly.
//!
//! Concurrency: turns for *different* sessions are independent (the store
//! is `Send + Sync`). Concurrent turns for the *same* session require
//! external serialization - history appends are not transactional across
//! a turn.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Role of a turn in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// The end user.
    User,
    /// The assistant's reply.
    Assistant,
}

impl TurnRole {
    /// Wire value of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One conversation's state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    /// Ordered (role, text) turns, oldest first.
    turns: Vec<(TurnRole, String)>,
}

impl Session {
    /// Number of turns recorded.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the session has no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// The turns as (role-string, text) pairs, oldest first.
    pub fn history(&self) -> Vec<(String, String)> {
        self.turns
            .iter()
            .map(|(role, text)| (role.as_str().to_string(), text.clone()))
            .collect()
    }
}

/// Thread-safe session store.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a turn to a session, creating the session on first use.
    pub fn append(&self, session_id: &str, role: TurnRole, text: impl Into<String>) {
        let mut sessions = self.sessions.write().expect("session store poisoned");
        sessions
            .entry(session_id.to_string())
            .or_default()
            .turns
            .push((role, text.into()));
    }

    /// History of a session as (role, text) pairs; empty for unknown ids.
    pub fn history(&self, session_id: &str) -> Vec<(String, String)> {
        let sessions = self.sessions.read().expect("session store poisoned");
        sessions
            .get(session_id)
            .map(|s| s.history())
            .unwrap_or_default()
    }

    /// Number of turns in a session.
    pub fn turn_count(&self, session_id: &str) -> usize {
        let sessions = self.sessions.read().expect("session store poisoned");
        sessions.get(session_id).map(|s| s.len()).unwrap_or(0)
    }

    /// Reset a session's history (called when an action intent completes).
    pub fn reset(&self, session_id: &str) {
        let mut sessions = self.sessions.write().expect("session store poisoned");
        if sessions.remove(session_id).is_some() {
            debug!(session_id, "Session reset");
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.read().expect("session store poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_history() {
        let store = SessionStore::new();
        store.append("s1", TurnRole::User, "hello");
        store.append("s1", TurnRole::Assistant, "hi there");

        let history = store.history("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], ("user".to_string(), "hello".to_string()));
        assert_eq!(history[1].0, "assistant");
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::new();
        store.append("a", TurnRole::User, "question a");
        store.append("b", TurnRole::User, "question b");

        assert_eq!(store.turn_count("a"), 1);
        assert_eq!(store.turn_count("b"), 1);
        assert_eq!(store.session_count(), 2);
    }

    #[test]
    fn test_history_grows_monotonically() {
        let store = SessionStore::new();
        for i in 0..5 {
            store.append("s", TurnRole::User, format!("turn {i}"));
            assert_eq!(store.turn_count("s"), i + 1);
        }
    }

    #[test]
    fn test_reset() {
        let store = SessionStore::new();
        store.append("s", TurnRole::User, "hello");
        store.reset("s");
        assert_eq!(store.turn_count("s"), 0);
        assert!(store.history("s").is_empty());
    }

    #[test]
    fn test_unknown_session_is_empty() {
        let store = SessionStore::new();
        assert!(store.history("nope").is_empty());
        assert_eq!(store.turn_count("nope"), 0);
    }
}
