//! The context manager: retrieval, persistence and summarization policy.

use super::token;
use crate::profile::ModelRoute;
use chrono::Utc;
use parley_config::ContextConfig;
use parley_core::error::{Error, ProviderError, Result};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::message::{Message, Role, SessionId};
use parley_core::provider::Provider;
use parley_core::store::{ConversationStore, Summary};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Id of the summary pseudo-message in a combined context.
pub const SUMMARY_MESSAGE_ID: &str = "summary";

const SUMMARY_INSTRUCTIONS: &str = "Summarize the conversation below so it can replace the original messages. \
Preserve the topics discussed, every named person, pet, place, project and asset, \
and the emotional tone and relationship between the user and the assistant. \
Write in the third person and answer with the summary only.";

/// Budget and summarization settings.
#[derive(Debug, Clone)]
pub struct ContextPolicy {
    /// Estimated tokens above which a turn triggers summarization
    pub token_threshold: usize,
    /// Most recent active messages left out of a summary (K)
    pub retain_recent: usize,
    /// Active messages required before summarization does anything
    pub min_messages_to_summarize: usize,
    /// Upper bound on the summarizer call
    pub summarize_timeout: Duration,
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

impl From<&ContextConfig> for ContextPolicy {
    fn from(config: &ContextConfig) -> Self {
        Self {
            token_threshold: config.token_threshold,
            retain_recent: config.retain_recent,
            min_messages_to_summarize: config.min_messages_to_summarize,
            summarize_timeout: Duration::from_secs(60),
        }
    }
}

/// Owns the token-budget policy for every session.
pub struct ContextManager {
    store: Arc<dyn ConversationStore>,
    summarizer: Arc<dyn Provider>,
    route: ModelRoute,
    policy: ContextPolicy,
    event_bus: Option<Arc<EventBus>>,
    /// One async lock per session currently summarizing
    summarize_locks: StdMutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl ContextManager {
    pub fn new(store: Arc<dyn ConversationStore>, summarizer: Arc<dyn Provider>, route: ModelRoute) -> Self {
        Self {
            store,
            summarizer,
            route,
            policy: ContextPolicy::default(),
            event_bus: None,
            summarize_locks: StdMutex::new(HashMap::new()),
        }
    }

    pub fn with_policy(mut self, policy: ContextPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn policy(&self) -> &ContextPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// The summary (as a `System` message) followed by the active messages.
    ///
    /// `probe_message` is the incoming user text; it is accepted so a
    /// relevance-based retriever can slot in later, and is unused today.
    pub async fn get_combined_context(&self, session_id: &SessionId, _probe_message: &str) -> Result<Vec<Message>> {
        let config = self
            .store
            .context_configuration(session_id)
            .await?
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        let active = self
            .store
            .messages_by_ids(session_id, &config.active_message_ids)
            .await?;

        let mut context = Vec::with_capacity(active.len() + 1);
        if let Some(summary) = config.summary {
            context.push(Message {
                id: SUMMARY_MESSAGE_ID.into(),
                role: Role::System,
                content: summary.content,
                timestamp: summary.created_at,
            });
        }
        context.extend(active);
        Ok(context)
    }

    /// Create an empty context configuration if the session has none.
    pub async fn initialize_session(&self, session_id: &SessionId) -> Result<()> {
        self.store.ensure_context_configuration(session_id).await?;
        Ok(())
    }

    /// Persist one exchange: the user message then the reply, in one write.
    pub async fn store_interaction(
        &self,
        session_id: &SessionId,
        user_text: &str,
        assistant_text: &str,
    ) -> Result<(Message, Message)> {
        let user = Message::user(user_text);
        let mut assistant = Message::assistant(assistant_text);
        // Keep the pair ordered even if the clock did not advance
        if assistant.timestamp < user.timestamp {
            assistant.timestamp = user.timestamp;
        }

        self.store
            .append_messages(session_id, &[user.clone(), assistant.clone()])
            .await?;
        debug!(session_id = %session_id, "Stored interaction");
        Ok((user, assistant))
    }

    pub fn estimate_tokens(&self, text: &str) -> usize {
        token::estimate_tokens(text)
    }

    pub fn render(&self, context: &[Message]) -> String {
        token::render(context)
    }

    /// Whether the full render of `context` is over the token threshold.
    pub fn exceeds_threshold(&self, context: &[Message]) -> bool {
        self.estimate_tokens(&self.render(context)) > self.policy.token_threshold
    }

    /// Fold all but the most recent K active messages into the summary.
    ///
    /// Returns true when a new summary was committed. Every failure leaves
    /// the session untouched and returns false.
    pub async fn summarize_conversation_context(&self, session_id: &SessionId) -> bool {
        let lock = self.session_lock(session_id);
        let committed = {
            let _guard = lock.lock().await;
            match self.summarize_locked(session_id).await {
                Ok(committed) => committed,
                Err(e) => {
                    warn!(session_id = %session_id, "Summarization failed: {e}");
                    false
                }
            }
        };
        self.release_lock(session_id, lock);
        committed
    }

    async fn summarize_locked(&self, session_id: &SessionId) -> Result<bool> {
        // Re-read under the lock: a previous holder may already have shrunk the set
        let Some(config) = self.store.context_configuration(session_id).await? else {
            return Ok(false);
        };
        let active = self
            .store
            .messages_by_ids(session_id, &config.active_message_ids)
            .await?;

        if active.len() < self.policy.min_messages_to_summarize {
            debug!(
                session_id = %session_id,
                active = active.len(),
                min = self.policy.min_messages_to_summarize,
                "Not enough messages to summarize"
            );
            return Ok(false);
        }

        let fold_count = active.len().saturating_sub(self.policy.retain_recent);
        if fold_count == 0 {
            return Ok(false);
        }
        let folded = &active[..fold_count];

        let mut transcript = String::new();
        if let Some(prior) = &config.summary {
            transcript.push_str(&format!("[summary] {}\n", prior.content));
        }
        transcript.push_str(&token::render(folded));

        let prompt = format!("{SUMMARY_INSTRUCTIONS}\n\nCONVERSATION:\n{transcript}");
        let response = tokio::time::timeout(
            self.policy.summarize_timeout,
            self.summarizer.complete(self.route.request(prompt)),
        )
        .await
        .map_err(|_| ProviderError::Timeout("summarizer did not answer in time".into()))??;

        let content = response.message.content.trim().to_string();
        if content.is_empty() {
            return Err(ProviderError::MalformedOutput("summarizer returned no text".into()).into());
        }

        let mut covered = config
            .summary
            .map(|prior| prior.covered_message_ids)
            .unwrap_or_default();
        covered.extend(folded.iter().map(|m| m.id.clone()));

        self.store
            .commit_summary(
                session_id,
                Summary {
                    content,
                    covered_message_ids: covered,
                    created_at: Utc::now(),
                },
            )
            .await?;

        let retained = active.len() - fold_count;
        info!(session_id = %session_id, folded = fold_count, retained, "Conversation summarized");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ConversationSummarized {
                session_id: session_id.to_string(),
                folded_messages: fold_count,
                retained_messages: retained,
                timestamp: Utc::now(),
            });
        }
        Ok(true)
    }

    fn session_lock(&self, session_id: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self
            .summarize_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(session_id.clone()).or_default().clone()
    }

    /// Drop the session's lock entry once nobody else holds a handle to it.
    fn release_lock(&self, session_id: &SessionId, lock: Arc<Mutex<()>>) {
        let mut locks = self
            .summarize_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one here
        if Arc::strong_count(&lock) == 2 {
            locks.remove(session_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use parley_core::store::ContextConfiguration;
    use parley_store::InMemoryStore;
    use std::collections::HashSet;

    fn manager(store: Arc<InMemoryStore>, summarizer: Arc<ScriptedProvider>, policy: ContextPolicy) -> ContextManager {
        ContextManager::new(store, summarizer, ModelRoute::new("summarizer")).with_policy(policy)
    }

    fn policy(threshold: usize) -> ContextPolicy {
        ContextPolicy {
            token_threshold: threshold,
            ..ContextPolicy::default()
        }
    }

    /// A ~50 token message (200 characters).
    fn long_text(i: usize) -> String {
        format!("{i:03} {}", "x".repeat(196))
    }

    /// Store `pairs` exchanges, i.e. `2 * pairs` messages.
    async fn seed(cm: &ContextManager, sid: &SessionId, pairs: usize) {
        for i in 0..pairs {
            cm.store_interaction(sid, &long_text(2 * i), &long_text(2 * i + 1))
                .await
                .unwrap();
        }
    }

    async fn seed_messages(store: &InMemoryStore, sid: &SessionId, count: usize) -> Vec<Message> {
        let messages: Vec<Message> = (0..count)
            .map(|i| if i % 2 == 0 { Message::user(long_text(i)) } else { Message::assistant(long_text(i)) })
            .collect();
        store.append_messages(sid, &messages).await.unwrap();
        messages
    }

    fn config_ids(config: &ContextConfiguration) -> HashSet<String> {
        let mut ids: HashSet<String> = config.active_message_ids.iter().cloned().collect();
        if let Some(summary) = &config.summary {
            ids.extend(summary.covered_message_ids.iter().cloned());
        }
        ids
    }

    #[tokio::test]
    async fn uninitialized_session_is_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let cm = manager(store, Arc::new(ScriptedProvider::replying("s")), ContextPolicy::default());

        let err = cm.get_combined_context(&SessionId::from("ghost"), "hi").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn initialized_session_has_empty_context() {
        let store = Arc::new(InMemoryStore::new());
        let cm = manager(store, Arc::new(ScriptedProvider::replying("s")), ContextPolicy::default());
        let sid = SessionId::from("fresh");

        cm.initialize_session(&sid).await.unwrap();
        cm.initialize_session(&sid).await.unwrap();
        assert!(cm.get_combined_context(&sid, "hi").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_interaction_appends_pair_in_order() {
        let store = Arc::new(InMemoryStore::new());
        let cm = manager(store.clone(), Arc::new(ScriptedProvider::replying("s")), ContextPolicy::default());
        let sid = SessionId::from("s1");

        let (user, assistant) = cm.store_interaction(&sid, "I got a puppy!", "Sugoi~ What's their name?").await.unwrap();
        assert!(assistant.timestamp >= user.timestamp);

        let context = cm.get_combined_context(&sid, "").await.unwrap();
        assert_eq!(context, vec![user, assistant]);
    }

    #[tokio::test]
    async fn retrieval_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let cm = manager(store, Arc::new(ScriptedProvider::replying("Summary.")), policy(1000));
        let sid = SessionId::from("s1");
        seed(&cm, &sid, 13).await;
        assert!(cm.summarize_conversation_context(&sid).await);

        let first = cm.get_combined_context(&sid, "a").await.unwrap();
        let second = cm.get_combined_context(&sid, "b").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn twenty_five_message_scenario() {
        let store = Arc::new(InMemoryStore::new());
        let summarizer = Arc::new(ScriptedProvider::replying("They chatted about many numbered things."));
        let cm = manager(store.clone(), summarizer.clone(), policy(1000));
        let sid = SessionId::from("s25");
        let messages = seed_messages(&store, &sid, 25).await;

        let before = cm.get_combined_context(&sid, "").await.unwrap();
        assert!(cm.exceeds_threshold(&before));
        let tokens_before = cm.estimate_tokens(&cm.render(&before));

        assert!(cm.summarize_conversation_context(&sid).await);
        assert_eq!(summarizer.call_count(), 1);

        let config = store.context_configuration(&sid).await.unwrap().unwrap();
        assert_eq!(config.active_message_ids.len(), 20);
        let summary = config.summary.clone().unwrap();
        let oldest_five: Vec<String> = messages[..5].iter().map(|m| m.id.clone()).collect();
        assert_eq!(summary.covered_message_ids, oldest_five);

        // Partition: active and covered are disjoint and together cover everything
        let all: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(config_ids(&config), all);
        assert_eq!(config.active_message_ids.len() + summary.covered_message_ids.len(), all.len());

        let after = cm.get_combined_context(&sid, "").await.unwrap();
        assert!(cm.estimate_tokens(&cm.render(&after)) < tokens_before);
        assert_eq!(after[0].role, Role::System);
        assert_eq!(after.len(), 21);
    }

    #[tokio::test]
    async fn summarizer_prompt_contains_only_folded_messages() {
        let store = Arc::new(InMemoryStore::new());
        let summarizer = Arc::new(ScriptedProvider::replying("Short."));
        let cm = manager(store.clone(), summarizer.clone(), policy(1000));
        let sid = SessionId::from("s1");
        let messages = seed_messages(&store, &sid, 22).await;

        assert!(cm.summarize_conversation_context(&sid).await);
        let prompt = summarizer.last_prompt().unwrap();
        assert!(prompt.contains(&messages[0].content));
        assert!(prompt.contains(&messages[1].content));
        assert!(!prompt.contains(&messages[2].content));
        assert!(prompt.contains("emotional tone"));
    }

    #[tokio::test]
    async fn second_summary_absorbs_the_first() {
        let store = Arc::new(InMemoryStore::new());
        let summarizer = Arc::new(ScriptedProvider::new(vec![
            Ok("First summary.".into()),
            Ok("Second summary.".into()),
        ]));
        let cm = manager(store.clone(), summarizer.clone(), policy(1000));
        let sid = SessionId::from("s1");
        let mut messages = seed_messages(&store, &sid, 23).await;
        assert!(cm.summarize_conversation_context(&sid).await);

        messages.extend(seed_messages(&store, &sid, 4).await);
        assert!(cm.summarize_conversation_context(&sid).await);
        assert!(summarizer.last_prompt().unwrap().contains("[summary] First summary."));

        let config = store.context_configuration(&sid).await.unwrap().unwrap();
        let summary = config.summary.clone().unwrap();
        assert_eq!(summary.content, "Second summary.");
        assert_eq!(summary.covered_message_ids.len(), 7);
        assert_eq!(config.active_message_ids.len(), 20);
        let all: HashSet<String> = messages.iter().map(|m| m.id.clone()).collect();
        assert_eq!(config_ids(&config), all);
    }

    #[tokio::test]
    async fn below_minimum_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let summarizer = Arc::new(ScriptedProvider::replying("unused"));
        let cm = manager(store.clone(), summarizer.clone(), policy(1));
        let sid = SessionId::from("s1");
        seed_messages(&store, &sid, 20).await;

        assert!(!cm.summarize_conversation_context(&sid).await);
        assert_eq!(summarizer.call_count(), 0);
        assert!(!cm.summarize_conversation_context(&SessionId::from("ghost")).await);
    }

    #[tokio::test]
    async fn provider_failure_leaves_state_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        let cm = manager(store.clone(), Arc::new(ScriptedProvider::failing()), policy(1000));
        let sid = SessionId::from("s1");
        seed_messages(&store, &sid, 25).await;
        let before = store.context_configuration(&sid).await.unwrap();

        assert!(!cm.summarize_conversation_context(&sid).await);
        assert_eq!(store.context_configuration(&sid).await.unwrap(), before);
    }

    #[tokio::test]
    async fn blank_summary_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let cm = manager(store.clone(), Arc::new(ScriptedProvider::replying("   \n")), policy(1000));
        let sid = SessionId::from("s1");
        seed_messages(&store, &sid, 25).await;

        assert!(!cm.summarize_conversation_context(&sid).await);
        let config = store.context_configuration(&sid).await.unwrap().unwrap();
        assert!(config.summary.is_none());
        assert_eq!(config.active_message_ids.len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn summarizer_timeout_is_a_failure() {
        let store = Arc::new(InMemoryStore::new());
        let slow = Arc::new(ScriptedProvider::replying("late").with_delay(Duration::from_secs(120)));
        let cm = manager(store.clone(), slow, policy(1000));
        let sid = SessionId::from("s1");
        seed_messages(&store, &sid, 25).await;

        assert!(!cm.summarize_conversation_context(&sid).await);
        assert!(store.context_configuration(&sid).await.unwrap().unwrap().summary.is_none());
    }

    #[tokio::test]
    async fn concurrent_summarizations_are_single_flight() {
        let store = Arc::new(InMemoryStore::new());
        let summarizer = Arc::new(ScriptedProvider::replying("Once.").with_delay(Duration::from_millis(50)));
        let cm = Arc::new(manager(store.clone(), summarizer.clone(), policy(1000)));
        let sid = SessionId::from("s1");
        seed_messages(&store, &sid, 25).await;

        let (a, b) = tokio::join!(
            cm.summarize_conversation_context(&sid),
            cm.summarize_conversation_context(&sid)
        );
        assert!(a ^ b, "exactly one call should commit");
        assert_eq!(summarizer.call_count(), 1);
        assert!(cm.summarize_locks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publishes_summarized_event() {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let cm = manager(store.clone(), Arc::new(ScriptedProvider::replying("S.")), policy(1000))
            .with_event_bus(bus);
        let sid = SessionId::from("s1");
        seed_messages(&store, &sid, 25).await;

        assert!(cm.summarize_conversation_context(&sid).await);
        match rx.recv().await.unwrap().as_ref() {
            DomainEvent::ConversationSummarized { folded_messages, retained_messages, .. } => {
                assert_eq!(*folded_messages, 5);
                assert_eq!(*retained_messages, 20);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn threshold_uses_full_render() {
        let store = Arc::new(InMemoryStore::new());
        let cm = manager(store, Arc::new(ScriptedProvider::replying("s")), policy(10));
        let short = vec![Message::user("hi")];
        let long = vec![Message::user("a".repeat(60))];
        assert!(!cm.exceeds_threshold(&short));
        assert!(cm.exceeds_threshold(&long));
    }
}
