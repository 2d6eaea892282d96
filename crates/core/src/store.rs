//! Conversation store trait — the durable message log plus one context
//! configuration record per session.
//!
//! The store is pure storage: indexed retrieval, append, and the single
//! mutation summarization needs. All policy lives in the context manager.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use crate::error::StoreError;
use crate::message::{Message, SessionId};

/// A compact summary replacing a prefix of a session's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// The summary text
    pub content: String,

    /// IDs of every message this summary stands in for, oldest first
    pub covered_message_ids: Vec<String>,

    /// When this summary was produced
    pub created_at: DateTime<Utc>,
}

/// Per-session context state: the latest summary and the live message set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextConfiguration {
    pub session_id: SessionId,

    /// Latest summary, replacing any earlier one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<Summary>,

    /// Messages not yet folded into the summary, oldest first
    #[serde(default)]
    pub active_message_ids: Vec<String>,

    pub updated_at: DateTime<Utc>,
}

impl ContextConfiguration {
    /// An empty configuration for a freshly initialized session.
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            summary: None,
            active_message_ids: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// Record newly appended messages as active.
    pub fn activate<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        self.active_message_ids.extend(ids.into_iter().map(String::from));
        self.updated_at = Utc::now();
    }

    /// Install `summary` and drop the ids it covers from the active set.
    ///
    /// Ids appended after the summary was computed stay active, so the
    /// active set and the covered range keep partitioning the history.
    pub fn apply_summary(&mut self, summary: Summary) {
        let covered: HashSet<&str> = summary.covered_message_ids.iter().map(String::as_str).collect();
        self.active_message_ids.retain(|id| !covered.contains(id.as_str()));
        self.summary = Some(summary);
        self.updated_at = Utc::now();
    }
}

/// The core ConversationStore trait.
///
/// Implementations: SQLite (durable), in-memory (tests, ephemeral runs).
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Append messages to the session log and mark them active, as one write.
    ///
    /// Creates the session's context configuration if it does not exist yet.
    async fn append_messages(&self, session_id: &SessionId, messages: &[Message]) -> std::result::Result<(), StoreError>;

    /// Every message of the session, ordered by timestamp.
    async fn messages(&self, session_id: &SessionId) -> std::result::Result<Vec<Message>, StoreError>;

    /// The messages with the given ids, ordered by timestamp. Unknown ids are skipped.
    async fn messages_by_ids(&self, session_id: &SessionId, ids: &[String]) -> std::result::Result<Vec<Message>, StoreError>;

    /// The session's context configuration, if it was ever initialized.
    async fn context_configuration(&self, session_id: &SessionId) -> std::result::Result<Option<ContextConfiguration>, StoreError>;

    /// Fetch the configuration, creating an empty one if missing.
    async fn ensure_context_configuration(&self, session_id: &SessionId) -> std::result::Result<ContextConfiguration, StoreError>;

    /// Replace the session's summary and remove the covered ids from the active set.
    async fn commit_summary(&self, session_id: &SessionId, summary: Summary) -> std::result::Result<(), StoreError>;

    /// Health check — is the backing storage reachable?
    async fn health_check(&self) -> std::result::Result<bool, StoreError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(ids: &[&str]) -> Summary {
        Summary {
            content: "They talked about cats.".into(),
            covered_message_ids: ids.iter().map(|s| s.to_string()).collect(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn apply_summary_shrinks_active_set() {
        let mut config = ContextConfiguration::new(SessionId::from("s1"));
        config.activate(["a", "b", "c", "d"]);
        config.apply_summary(summary(&["a", "b"]));

        assert_eq!(config.active_message_ids, vec!["c", "d"]);
        assert_eq!(config.summary.unwrap().covered_message_ids, vec!["a", "b"]);
    }

    #[test]
    fn apply_summary_keeps_late_arrivals() {
        let mut config = ContextConfiguration::new(SessionId::from("s1"));
        config.activate(["a", "b", "c"]);
        // "d" was appended while the summary was being generated
        config.activate(["d"]);
        config.apply_summary(summary(&["a"]));
        assert_eq!(config.active_message_ids, vec!["b", "c", "d"]);
    }

    #[test]
    fn apply_summary_with_long_covered_history() {
        let covered: Vec<String> = (0..5000).map(|i| format!("old{i}")).collect();
        let mut config = ContextConfiguration::new(SessionId::from("s1"));
        config.activate(covered.iter().map(String::as_str));
        config.activate(["new1", "new2"]);
        config.apply_summary(Summary {
            covered_message_ids: covered,
            ..summary(&[])
        });
        assert_eq!(config.active_message_ids, vec!["new1", "new2"]);
    }

    #[test]
    fn configuration_serialization() {
        let mut config = ContextConfiguration::new(SessionId::from("s1"));
        config.activate(["m1"]);
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"session_id\":\"s1\""));
        assert!(json.contains("m1"));
        assert!(!json.contains("summary"));
    }
}
