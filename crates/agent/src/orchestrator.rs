//! The response orchestrator — one user message in, one reply out.
//!
//! A turn runs in two phases:
//!
//! 1. **Gather**: context retrieval, knowledge enrichment and tool evaluation
//!    run as independent branches (see [`crate::fanout`]). A branch that
//!    fails, stalls or panics only leaves its slot empty.
//! 2. **Generate**: enforce the token budget, pick a generation profile,
//!    assemble the prompt, call the model, clean and persist the reply.
//!
//! [`ResponseOrchestrator::generate_reply`] never fails outward. Anything
//! that goes wrong in a turn is logged and answered with the apology text.

use crate::context::{ContextManager, ContextPolicy, SUMMARY_MESSAGE_ID, render_window};
use crate::fanout::{Branch, BranchOutcome};
use crate::profile::{GenerationProfile, ModelRoute, ModelRoutes};
use crate::prompt::{PromptPayload, clean_output};
use crate::session::{Session, SessionRegistry};
use chrono::Utc;
use parley_config::AppConfig;
use parley_core::error::{ProviderError, Result};
use parley_core::event::{DomainEvent, EventBus};
use parley_core::knowledge::KnowledgeEnricher;
use parley_core::message::{Message, SessionId};
use parley_core::persona::Persona;
use parley_core::provider::Provider;
use parley_core::store::ConversationStore;
use parley_core::tool::{ToolOrchestrator, ToolOutcome};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const DEFAULT_APOLOGY: &str = "Gomen ne~ I had a little technical difficulty! (⌒_⌒;)";

/// Timeouts and presentation settings for a turn.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub context_timeout: Duration,
    pub enrichment_timeout: Duration,
    pub tool_timeout: Duration,
    pub generation_timeout: Duration,
    /// Most recent messages shown in the transcript
    pub display_window: usize,
    pub apology: String,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for OrchestratorSettings {
    fn from(config: &AppConfig) -> Self {
        let orchestrator = &config.orchestrator;
        Self {
            context_timeout: Duration::from_millis(orchestrator.context_timeout_ms),
            enrichment_timeout: Duration::from_millis(orchestrator.enrichment_timeout_ms),
            tool_timeout: Duration::from_millis(orchestrator.tool_timeout_ms),
            generation_timeout: Duration::from_secs(config.generation.timeout_secs),
            display_window: config.context.display_window,
            apology: orchestrator.apology.clone(),
        }
    }
}

/// What the gather phase produced. Empty slots are failed or skipped branches.
#[derive(Debug, Clone, Default)]
pub struct OrchestrationResult {
    pub context: Option<Vec<Message>>,
    pub guidance: Option<String>,
    pub tool: Option<ToolOutcome>,
}

/// Liveness of the orchestrator's collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store_connected: bool,
    pub enricher_enabled: bool,
    pub agent_initialized: bool,
    pub active_sessions: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.store_connected && self.agent_initialized
    }
}

pub struct ResponseOrchestrator {
    context: Arc<ContextManager>,
    sessions: SessionRegistry,
    provider: Arc<dyn Provider>,
    enricher: Option<Arc<dyn KnowledgeEnricher>>,
    tools: Arc<dyn ToolOrchestrator>,
    persona: Persona,
    routes: ModelRoutes,
    settings: OrchestratorSettings,
    events: Arc<EventBus>,
}

impl ResponseOrchestrator {
    pub fn new(context: Arc<ContextManager>, provider: Arc<dyn Provider>, tools: Arc<dyn ToolOrchestrator>) -> Self {
        Self {
            context,
            sessions: SessionRegistry::default(),
            provider,
            enricher: None,
            tools,
            persona: Persona::default(),
            routes: ModelRoutes::default(),
            settings: OrchestratorSettings::default(),
            events: Arc::new(EventBus::default()),
        }
    }

    /// Wire every collaborator from configuration, sharing one event bus.
    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn ConversationStore>,
        provider: Arc<dyn Provider>,
        enricher: Option<Arc<dyn KnowledgeEnricher>>,
        tools: Arc<dyn ToolOrchestrator>,
        persona: Persona,
    ) -> Self {
        let events = Arc::new(EventBus::default());
        let policy = ContextPolicy {
            summarize_timeout: Duration::from_secs(config.generation.timeout_secs),
            ..ContextPolicy::from(&config.context)
        };
        let context = ContextManager::new(store, provider.clone(), ModelRoute::from(&config.generation.summarizer))
            .with_policy(policy)
            .with_event_bus(events.clone());

        Self::new(Arc::new(context), provider, tools)
            .with_enricher(enricher)
            .with_persona(persona)
            .with_routes(ModelRoutes::from(&config.generation))
            .with_settings(OrchestratorSettings::from(config))
            .with_sessions(SessionRegistry::from(&config.sessions))
            .with_event_bus(events)
    }

    pub fn with_enricher(mut self, enricher: Option<Arc<dyn KnowledgeEnricher>>) -> Self {
        self.enricher = enricher;
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    pub fn with_routes(mut self, routes: ModelRoutes) -> Self {
        self.routes = routes;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionRegistry) -> Self {
        self.sessions = sessions;
        self
    }

    /// Events published by the orchestrator itself. The context manager
    /// keeps whatever bus it was built with.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    pub fn context_manager(&self) -> &Arc<ContextManager> {
        &self.context
    }

    /// Produce a reply for `user_text`. Never fails: errors become the apology.
    pub async fn generate_reply(&self, session_id: &SessionId, user_text: &str) -> String {
        match self.run_turn(session_id, user_text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(session_id = %session_id, "Turn failed: {e}");
                self.events.publish(DomainEvent::TurnFailed {
                    session_id: session_id.to_string(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                self.settings.apology.clone()
            }
        }
    }

    async fn run_turn(&self, session_id: &SessionId, user_text: &str) -> Result<String> {
        let started = Instant::now();
        let activated = self.activate_session(session_id).await;

        let OrchestrationResult {
            mut context,
            guidance,
            tool,
        } = self.gather(session_id, user_text).await;

        if context.as_deref().is_some_and(|c| self.context.exceeds_threshold(c)) {
            info!(session_id = %session_id, "Context over token threshold, summarizing");
            // A concurrent turn may have won the summarization, so re-read either way
            self.context.summarize_conversation_context(session_id).await;
            context = match self.context.get_combined_context(session_id, user_text).await {
                Ok(context) => Some(context),
                Err(e) if e.is_not_found() => Some(Vec::new()),
                Err(e) => return Err(e),
            };
        }
        let context = context.unwrap_or_default();

        if activated {
            self.hydrate_session(session_id, &context).await;
        }

        let profile = GenerationProfile::select(tool.is_some());
        let route = self.routes.route(profile);
        let payload = PromptPayload::new(&self.persona, user_text)
            .with_guidance(guidance)
            .with_transcript(render_window(&context, self.settings.display_window))
            .with_tool_results(tool.map(|outcome| outcome.response));
        debug!(session_id = %session_id, profile = profile.as_str(), model = %route.model, "Generating reply");

        let response = tokio::time::timeout(
            self.settings.generation_timeout,
            self.provider.complete(route.request(payload.render())),
        )
        .await
        .map_err(|_| {
            ProviderError::Timeout(format!(
                "no reply within {}s",
                self.settings.generation_timeout.as_secs()
            ))
        })??;

        let reply = clean_output(&response.message.content);
        if reply.is_empty() {
            return Err(ProviderError::MalformedOutput("model returned no text".into()).into());
        }

        let (user, assistant) = self
            .context
            .store_interaction(session_id, user_text, &reply)
            .await?;
        self.sessions.record_exchange(session_id, user, assistant).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(
            session_id = %session_id,
            profile = profile.as_str(),
            model = %route.model,
            duration_ms,
            "Reply generated"
        );
        self.events.publish(DomainEvent::ReplyGenerated {
            session_id: session_id.to_string(),
            profile: profile.as_str().into(),
            model: route.model.clone(),
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(reply)
    }

    /// Run the three retrieval branches concurrently and collect what they produced.
    pub async fn gather(&self, session_id: &SessionId, user_text: &str) -> OrchestrationResult {
        let context_branch = {
            let manager = self.context.clone();
            let session_id = session_id.clone();
            let probe = user_text.to_string();
            Branch::spawn("context", self.settings.context_timeout, async move {
                match manager.get_combined_context(&session_id, &probe).await {
                    Err(e) if e.is_not_found() => Ok(Vec::new()),
                    other => other,
                }
            })
        };

        let enrichment_branch = match &self.enricher {
            Some(enricher) => {
                let enricher = enricher.clone();
                let text = user_text.to_string();
                Branch::spawn("enrichment", self.settings.enrichment_timeout, async move {
                    enricher.enrich(&text).await
                })
            }
            None => Branch::skipped("enrichment"),
        };

        let tool_branch = {
            let tools = self.tools.clone();
            let text = user_text.to_string();
            Branch::spawn("tools", self.settings.tool_timeout, async move { tools.evaluate(&text).await })
        };

        let (context, guidance, tool) = tokio::join!(context_branch.join(), enrichment_branch.join(), tool_branch.join());

        OrchestrationResult {
            context: self.settle(session_id, "context", context),
            guidance: self
                .settle(session_id, "enrichment", guidance)
                .filter(|g| !g.trim().is_empty()),
            tool: self
                .settle(session_id, "tools", tool)
                .flatten()
                .filter(ToolOutcome::has_response),
        }
    }

    fn settle<T>(&self, session_id: &SessionId, branch: &str, outcome: BranchOutcome<T>) -> Option<T> {
        if let Some(reason) = outcome.failure_reason() {
            warn!(session_id = %session_id, branch, "Branch produced no value: {reason}");
            self.events.publish(DomainEvent::BranchFailed {
                session_id: session_id.to_string(),
                branch: branch.to_string(),
                reason,
                timestamp: Utc::now(),
            });
        }
        outcome.into_value()
    }

    /// Make sure the session is in the registry. Returns true if it was not.
    ///
    /// The store is not read here; a turn seeds the mirror from its own
    /// context branch once that has settled.
    async fn activate_session(&self, session_id: &SessionId) -> bool {
        if self.sessions.contains(session_id).await {
            self.sessions.touch(session_id).await;
            return false;
        }
        let session = Session::new(session_id.clone(), self.persona.welcome_message.clone());
        self.sessions.insert(session, Vec::new()).await;
        true
    }

    /// Seed a freshly activated session's mirror from the turn's context.
    async fn hydrate_session(&self, session_id: &SessionId, context: &[Message]) {
        let history: Vec<Message> = context
            .iter()
            .filter(|m| m.id != SUMMARY_MESSAGE_ID)
            .cloned()
            .collect();
        let hydrated = self.sessions.seed(session_id, history).await;
        self.publish_started(session_id, hydrated);
    }

    fn publish_started(&self, session_id: &SessionId, hydrated: usize) {
        debug!(session_id = %session_id, hydrated, "Session activated");
        self.events.publish(DomainEvent::SessionStarted {
            session_id: session_id.to_string(),
            hydrated_messages: hydrated,
            timestamp: Utc::now(),
        });
    }

    /// Initialize a session server-side and return its id and welcome text.
    ///
    /// A new UUID is generated when no id is given. Starting an already
    /// active session returns its existing welcome text.
    pub async fn start_session(&self, requested: Option<SessionId>) -> Result<(SessionId, String)> {
        let session_id = requested.unwrap_or_default();
        self.context.initialize_session(&session_id).await?;
        if self.activate_session(&session_id).await {
            self.publish_started(&session_id, 0);
        }

        let welcome = self
            .sessions
            .get(&session_id)
            .await
            .map(|session| session.welcome_message)
            .unwrap_or_else(|| self.persona.welcome_message.clone());
        info!(session_id = %session_id, "Session initialized");
        Ok((session_id, welcome))
    }

    /// The combined context of a session. Errors propagate.
    pub async fn history(&self, session_id: &SessionId) -> Result<Vec<Message>> {
        self.context.get_combined_context(session_id, "").await
    }

    pub async fn health(&self) -> HealthReport {
        let store_connected = match self.context.store().health_check().await {
            Ok(connected) => connected,
            Err(e) => {
                warn!("Store health check failed: {e}");
                false
            }
        };
        HealthReport {
            store_connected,
            enricher_enabled: self.enricher.is_some(),
            agent_initialized: true,
            active_sessions: self.sessions.len().await,
        }
    }

    /// Sweep idle sessions out of the registry.
    pub async fn evict_idle(&self) -> usize {
        let evicted = self.sessions.evict_idle().await;
        if !evicted.is_empty() {
            info!(count = evicted.len(), "Evicted idle sessions");
        }
        evicted.len()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.len().await
    }
}
