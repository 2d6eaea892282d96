//! End-to-end integration tests for Parley.
//!
//! These wire the real store, tools, enricher, orchestrator and gateway
//! together from configuration; only the language model is mocked.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use parley_agent::ResponseOrchestrator;
use parley_config::AppConfig;
use parley_core::error::ProviderError;
use parley_core::event::DomainEvent;
use parley_core::knowledge::KnowledgeEnricher;
use parley_core::message::{Message, Role, SessionId};
use parley_core::persona::Persona;
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use parley_core::store::ConversationStore;
use parley_knowledge::StaticEnricher;
use parley_store::InMemoryStore;
use parley_tools::RuleBasedOrchestrator;
use tower::ServiceExt;

// ── Mock Provider ────────────────────────────────────────────────────────

/// Answers summarizer requests with a fixed summary and everything else
/// with a fixed reply, recording each request.
struct RoutingProvider {
    summarizer_model: String,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl RoutingProvider {
    fn new(config: &AppConfig) -> Self {
        Self {
            summarizer_model: config.generation.summarizer.model.clone(),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn summarizer_calls(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.model == self.summarizer_model)
            .count()
    }

    fn last_reply_request(&self) -> ProviderRequest {
        self.requests()
            .into_iter()
            .rev()
            .find(|r| r.model != self.summarizer_model)
            .expect("no reply request recorded")
    }
}

#[async_trait::async_trait]
impl Provider for RoutingProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        let text = if model == self.summarizer_model {
            "The user and Rin chatted about numbered topics; the mood was friendly."
        } else {
            "[INST] Ehehe~ got it! (＾▽＾) [/INST]"
        };
        self.requests.lock().unwrap().push(request);
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model,
        })
    }
}

fn in_memory_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.store.backend = "in_memory".into();
    config
}

fn orchestrator_with(
    config: &AppConfig,
    store: Arc<dyn ConversationStore>,
    provider: Arc<RoutingProvider>,
    enricher: Option<Arc<dyn KnowledgeEnricher>>,
) -> ResponseOrchestrator {
    ResponseOrchestrator::from_config(
        config,
        store,
        provider,
        enricher,
        Arc::new(RuleBasedOrchestrator::default()),
        Persona::default(),
    )
}

// ── Turn pipeline ────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_calculator_turn_uses_tool_aware_profile() {
    let config = in_memory_config();
    let provider = Arc::new(RoutingProvider::new(&config));
    let enricher: Arc<dyn KnowledgeEnricher> =
        Arc::new(StaticEnricher::new().with_entry("math", "The user is studying for a math exam"));
    let orchestrator = orchestrator_with(&config, Arc::new(InMemoryStore::new()), provider.clone(), Some(enricher));
    let sid = SessionId::from("calc");

    let reply = orchestrator.generate_reply(&sid, "math time! what is 6 * (3 + 4)?").await;
    assert_eq!(reply, "Ehehe~ got it! (＾▽＾)");

    let request = provider.last_reply_request();
    assert_eq!(request.model, config.generation.tool_aware.model);
    let prompt = &request.messages[0].content;
    assert!(prompt.contains("6 * (3 + 4) = 42"));
    assert!(prompt.contains("The user is studying for a math exam"));
}

#[tokio::test]
async fn e2e_plain_chat_uses_persona_profile() {
    let config = in_memory_config();
    let provider = Arc::new(RoutingProvider::new(&config));
    let orchestrator = orchestrator_with(&config, Arc::new(InMemoryStore::new()), provider.clone(), None);

    orchestrator
        .generate_reply(&SessionId::from("plain"), "I adopted a kitten named Mochi")
        .await;

    let request = provider.last_reply_request();
    assert_eq!(request.model, config.generation.persona_chat.model);
    assert_eq!(request.max_tokens, config.generation.persona_chat.max_tokens);
    let prompt = &request.messages[0].content;
    assert!(prompt.contains("No additional context available"));
    assert!(prompt.contains("No tool results available"));
    assert!(prompt.contains("RESPONSE GUIDELINES:"));
}

#[tokio::test]
async fn e2e_twenty_five_messages_fold_into_summary() {
    let mut config = in_memory_config();
    config.context.token_threshold = 1000;
    let store = Arc::new(InMemoryStore::new());
    let provider = Arc::new(RoutingProvider::new(&config));
    let orchestrator = orchestrator_with(&config, store.clone(), provider.clone(), None);
    let sid = SessionId::from("long-chat");

    // 25 stored messages of ~50 tokens each, well over the threshold
    let seeded: Vec<Message> = (0..25)
        .map(|i| {
            let text = format!("{i:03} {}", "z".repeat(196));
            if i % 2 == 0 { Message::user(text) } else { Message::assistant(text) }
        })
        .collect();
    store.append_messages(&sid, &seeded).await.unwrap();

    orchestrator.generate_reply(&sid, "hi again").await;
    assert_eq!(provider.summarizer_calls(), 1);

    let config_after = store.context_configuration(&sid).await.unwrap().unwrap();
    let summary = config_after.summary.clone().unwrap();
    let oldest: Vec<String> = seeded[..5].iter().map(|m| m.id.clone()).collect();
    assert_eq!(summary.covered_message_ids, oldest);
    // 20 retained plus the new exchange
    assert_eq!(config_after.active_message_ids.len(), 22);

    // Partition: every stored message is either active or covered, never both
    let active: HashSet<String> = config_after.active_message_ids.iter().cloned().collect();
    let covered: HashSet<String> = summary.covered_message_ids.iter().cloned().collect();
    assert!(active.is_disjoint(&covered));
    let all: HashSet<String> = store.messages(&sid).await.unwrap().into_iter().map(|m| m.id).collect();
    assert_eq!(active.union(&covered).cloned().collect::<HashSet<_>>(), all);

    let prompt = provider.last_reply_request().messages[0].content.clone();
    assert!(prompt.contains("[summary] The user and Rin chatted about numbered topics"));
}

#[tokio::test]
async fn e2e_events_trace_a_turn() {
    let config = in_memory_config();
    let provider = Arc::new(RoutingProvider::new(&config));
    let orchestrator = orchestrator_with(&config, Arc::new(InMemoryStore::new()), provider, None);
    let mut rx = orchestrator.event_bus().subscribe();

    orchestrator.generate_reply(&SessionId::from("evt"), "hello").await;

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(match event.as_ref() {
            DomainEvent::SessionStarted { .. } => "started",
            DomainEvent::BranchFailed { .. } => "branch_failed",
            DomainEvent::ConversationSummarized { .. } => "summarized",
            DomainEvent::ReplyGenerated { .. } => "reply",
            DomainEvent::TurnFailed { .. } => "failed",
        });
    }
    assert_eq!(kinds, vec!["started", "reply"]);
}

// ── Persistence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_sqlite_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = AppConfig::default();
    config.store.path = Some(dir.path().join("nested").join("parley.db").display().to_string());
    let sid = SessionId::from("durable");

    {
        let store = parley_store::build_from_config(&config).await.unwrap();
        let provider = Arc::new(RoutingProvider::new(&config));
        let orchestrator = orchestrator_with(&config, store, provider, None);
        orchestrator.start_session(Some(sid.clone())).await.unwrap();
        orchestrator.generate_reply(&sid, "Remember: my dog is Pochi").await;
    }

    let store = parley_store::build_from_config(&config).await.unwrap();
    let provider = Arc::new(RoutingProvider::new(&config));
    let orchestrator = orchestrator_with(&config, store, provider.clone(), None);

    let history = orchestrator.history(&sid).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].content, "Remember: my dog is Pochi");
    assert_eq!(history[1].role, Role::Assistant);

    orchestrator.generate_reply(&sid, "What is my dog called?").await;
    let prompt = provider.last_reply_request().messages[0].content.clone();
    assert!(prompt.contains("[user] Remember: my dog is Pochi"));
}

// ── Gateway ──────────────────────────────────────────────────────────────

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn e2e_gateway_init_chat_history() {
    let config = in_memory_config();
    let provider = Arc::new(RoutingProvider::new(&config));
    let orchestrator = Arc::new(orchestrator_with(&config, Arc::new(InMemoryStore::new()), provider, None));
    let app = parley_gateway::build_router(Arc::new(parley_gateway::GatewayState { orchestrator }));

    let init = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/session/init")
                .header("content-type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(init.status(), StatusCode::OK);
    let init = body_json(init).await;
    let session_id = init["session_id"].as_str().unwrap().to_string();
    assert_eq!(init["welcome_message"], Persona::default().welcome_message);

    let chat = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/chat")
                .header("content-type", "application/json")
                .body(Body::from(
                    serde_json::json!({"session_id": session_id, "message": "what time is it?"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(chat.status(), StatusCode::OK);
    assert_eq!(body_json(chat).await["response"], "Ehehe~ got it! (＾▽＾)");

    let history = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/api/history/{session_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(history.status(), StatusCode::OK);
    let history = body_json(history).await;
    assert_eq!(history["status"], "success");
    assert_eq!(history["history"].as_array().unwrap().len(), 2);
    assert_eq!(history["history"][0]["role"], "user");

    let health = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health = body_json(health).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["active_sessions"], 1);
}

// ── Configuration ────────────────────────────────────────────────────────

#[test]
fn e2e_default_toml_round_trips_through_loader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, AppConfig::default_toml()).unwrap();

    let loaded = AppConfig::load_from(&path).unwrap();
    let defaults = AppConfig::default();
    assert_eq!(loaded.context.token_threshold, defaults.context.token_threshold);
    assert_eq!(loaded.context.retain_recent, defaults.context.retain_recent);
    assert_eq!(loaded.generation.summarizer.model, defaults.generation.summarizer.model);
    assert_eq!(loaded.gateway.port, defaults.gateway.port);
}

#[test]
fn e2e_invalid_context_policy_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[context]\nretain_recent = 20\nmin_messages_to_summarize = 20\n").unwrap();

    assert!(AppConfig::load_from(&path).is_err());
}
