//! Domain event system — observation of turns without coupling to them.
//!
//! The orchestrator and context manager publish events as a turn moves
//! through its stages. Subscribers (logs, tests, diagnostics) filter for
//! what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A session became active in the registry
    SessionStarted {
        session_id: String,
        hydrated_messages: usize,
        timestamp: DateTime<Utc>,
    },

    /// A retrieval branch produced no value
    BranchFailed {
        session_id: String,
        branch: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Old messages were folded into a summary
    ConversationSummarized {
        session_id: String,
        folded_messages: usize,
        retained_messages: usize,
        timestamp: DateTime<Utc>,
    },

    /// A reply was generated and persisted
    ReplyGenerated {
        session_id: String,
        profile: String,
        model: String,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A turn hit the safety net and answered with the apology text
    TurnFailed {
        session_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
