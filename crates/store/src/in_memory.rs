//! In-memory store — useful for testing and ephemeral runs.

use async_trait::async_trait;
use parley_core::error::StoreError;
use parley_core::message::{Message, SessionId};
use parley_core::store::{ContextConfiguration, ConversationStore, Summary};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct SessionLog {
    /// Append order doubles as the tie-breaker for equal timestamps
    messages: Vec<Message>,
    config: Option<ContextConfiguration>,
}

/// A conversation store that keeps every session in a HashMap.
/// Nothing survives a restart.
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, SessionLog>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn ordered(mut messages: Vec<Message>) -> Vec<Message> {
    // Stable sort keeps append order for equal timestamps
    messages.sort_by_key(|m| m.timestamp);
    messages
}

#[async_trait]
impl ConversationStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn append_messages(&self, session_id: &SessionId, messages: &[Message]) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let log = sessions.entry(session_id.clone()).or_default();
        log.messages.extend_from_slice(messages);
        log.config
            .get_or_insert_with(|| ContextConfiguration::new(session_id.clone()))
            .activate(messages.iter().map(|m| m.id.as_str()));
        Ok(())
    }

    async fn messages(&self, session_id: &SessionId) -> Result<Vec<Message>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|log| ordered(log.messages.clone()))
            .unwrap_or_default())
    }

    async fn messages_by_ids(&self, session_id: &SessionId, ids: &[String]) -> Result<Vec<Message>, StoreError> {
        let sessions = self.sessions.read().await;
        let Some(log) = sessions.get(session_id) else {
            return Ok(vec![]);
        };
        let selected = log
            .messages
            .iter()
            .filter(|m| ids.contains(&m.id))
            .cloned()
            .collect();
        Ok(ordered(selected))
    }

    async fn context_configuration(&self, session_id: &SessionId) -> Result<Option<ContextConfiguration>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).and_then(|log| log.config.clone()))
    }

    async fn ensure_context_configuration(&self, session_id: &SessionId) -> Result<ContextConfiguration, StoreError> {
        let mut sessions = self.sessions.write().await;
        let log = sessions.entry(session_id.clone()).or_default();
        Ok(log
            .config
            .get_or_insert_with(|| ContextConfiguration::new(session_id.clone()))
            .clone())
    }

    async fn commit_summary(&self, session_id: &SessionId, summary: Summary) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let config = sessions
            .get_mut(session_id)
            .and_then(|log| log.config.as_mut())
            .ok_or_else(|| StoreError::MissingConfiguration(session_id.to_string()))?;
        config.apply_summary(summary);
        Ok(())
    }
}
