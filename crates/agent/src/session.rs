//! Session registry — the process-local cache of active sessions.
//!
//! Bounded two ways: at most `max_sessions` entries (the least recently
//! active is evicted to make room) and an idle TTL (idle sessions are swept
//! on every insert and by `evict_idle`). An evicted session is re-seeded
//! from its stored context on its next turn.

use chrono::{DateTime, Utc};
use parley_config::SessionsConfig;
use parley_core::message::{Message, SessionId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// An active conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_active: Instant,
    pub welcome_message: String,
    /// Recent messages, oldest first
    pub messages: VecDeque<Message>,
}

impl Session {
    pub fn new(id: SessionId, welcome_message: impl Into<String>) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            last_active: Instant::now(),
            welcome_message: welcome_message.into(),
            messages: VecDeque::new(),
        }
    }

    fn push_capped(&mut self, message: Message, limit: usize) {
        self.messages.push_back(message);
        while self.messages.len() > limit {
            self.messages.pop_front();
        }
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
    max_sessions: usize,
    idle_ttl: Duration,
    mirror_limit: usize,
}

impl SessionRegistry {
    pub fn new(max_sessions: usize, idle_ttl: Duration, mirror_limit: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_sessions: max_sessions.max(1),
            idle_ttl,
            mirror_limit,
        }
    }

    pub async fn contains(&self, id: &SessionId) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    /// A snapshot of the session, if active.
    pub async fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Insert a session, seeding its mirror with `history` (oldest first).
    ///
    /// Returns the ids evicted to make room. An existing entry for the same
    /// id is kept as is.
    pub async fn insert(&self, mut session: Session, history: Vec<Message>) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Vec::new();
        }

        let mut evicted = Self::sweep(&mut sessions, self.idle_ttl);
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions
                .values()
                .min_by_key(|s| s.last_active)
                .map(|s| s.id.clone())
            else {
                break;
            };
            sessions.remove(&oldest);
            evicted.push(oldest);
        }

        for message in history {
            session.push_capped(message, self.mirror_limit);
        }
        session.last_active = Instant::now();
        sessions.insert(session.id.clone(), session);

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted sessions from registry");
        }
        evicted
    }

    /// Mark activity and mirror a completed exchange.
    pub async fn record_exchange(&self, id: &SessionId, user: Message, assistant: Message) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id) {
            session.push_capped(user, self.mirror_limit);
            session.push_capped(assistant, self.mirror_limit);
            session.last_active = Instant::now();
        }
    }

    /// Put `history` (oldest first) ahead of whatever the mirror already holds.
    ///
    /// Messages already mirrored are skipped. Returns how many were added.
    pub async fn seed(&self, id: &SessionId, history: Vec<Message>) -> usize {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return 0;
        };
        let mirrored: HashSet<&str> = session.messages.iter().map(|m| m.id.as_str()).collect();
        let fresh: Vec<Message> = history
            .into_iter()
            .filter(|m| !mirrored.contains(m.id.as_str()))
            .collect();
        let added = fresh.len();

        let existing = std::mem::take(&mut session.messages);
        for message in fresh.into_iter().chain(existing) {
            session.push_capped(message, self.mirror_limit);
        }
        added
    }

    /// Mark activity without changing the mirror.
    pub async fn touch(&self, id: &SessionId) {
        if let Some(session) = self.sessions.write().await.get_mut(id) {
            session.last_active = Instant::now();
        }
    }

    /// Drop every session idle for longer than the TTL.
    pub async fn evict_idle(&self) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        Self::sweep(&mut sessions, self.idle_ttl)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    fn sweep(sessions: &mut HashMap<SessionId, Session>, idle_ttl: Duration) -> Vec<SessionId> {
        let now = Instant::now();
        let expired: Vec<SessionId> = sessions
            .values()
            .filter(|s| now.duration_since(s.last_active) > idle_ttl)
            .map(|s| s.id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        expired
    }
}

impl From<&SessionsConfig> for SessionRegistry {
    fn from(config: &SessionsConfig) -> Self {
        Self::new(
            config.max_sessions,
            Duration::from_secs(config.idle_ttl_secs),
            config.mirror_limit,
        )
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::from(&SessionsConfig::default())
    }
}
