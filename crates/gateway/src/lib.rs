//! HTTP gateway for Parley.
//!
//! Exposes session initialization, chat, history and a health probe over
//! JSON. Every route is a thin adapter over [`ResponseOrchestrator`].
//!
//! Built on Axum; CORS is permissive and request bodies are capped at 1 MB.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path};
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use parley_agent::ResponseOrchestrator;
use parley_core::message::{Message, SessionId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<ResponseOrchestrator>,
}

type SharedState = Arc<GatewayState>;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// How often idle sessions are swept out of the registry.
const EVICTION_INTERVAL: Duration = Duration::from_secs(60);

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/session/init", post(init_handler))
        .route("/api/chat", post(chat_handler))
        .route("/api/history/{session_id}", get(history_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve the gateway until Ctrl-C.
///
/// Also runs the periodic idle-session sweep for as long as the server is up.
pub async fn start(
    orchestrator: Arc<ResponseOrchestrator>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");

    let sweeper = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EVICTION_INTERVAL);
            loop {
                interval.tick().await;
                orchestrator.evict_idle().await;
            }
        })
    };

    let app = build_router(Arc::new(GatewayState { orchestrator }));

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await;

    sweeper.abort();
    served?;
    Ok(())
}

// --- Payloads ---

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
}

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            status: "error".into(),
            error: message.into(),
        }),
    )
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store_connected: bool,
    pub enricher_enabled: bool,
    pub agent_initialized: bool,
    pub active_sessions: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InitRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InitResponse {
    pub session_id: String,
    pub welcome_message: String,
}

/// Both fields are optional at the wire level so a missing one is a 400
/// with a readable message rather than an extractor rejection.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub status: String,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub status: String,
    pub history: Vec<Message>,
}

// --- Handlers ---

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let report = state.orchestrator.health().await;
    Json(HealthResponse {
        status: if report.is_healthy() { "healthy" } else { "degraded" }.into(),
        store_connected: report.store_connected,
        enricher_enabled: report.enricher_enabled,
        agent_initialized: report.agent_initialized,
        active_sessions: report.active_sessions,
        timestamp: Utc::now(),
    })
}

async fn init_handler(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<Json<InitResponse>, ApiError> {
    // An empty body asks for a fresh session
    let request: InitRequest = if body.is_empty() {
        InitRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid request body: {e}")))?
    };
    let requested = request
        .session_id
        .filter(|id| !id.trim().is_empty())
        .map(|id| SessionId::from(id.as_str()));

    match state.orchestrator.start_session(requested).await {
        Ok((session_id, welcome_message)) => Ok(Json(InitResponse {
            session_id: session_id.to_string(),
            welcome_message,
        })),
        Err(e) => {
            error!("Session init failed: {e}");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = payload
        .session_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing required field: session_id"))?;
    let message = payload
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing required field: message"))?;

    info!(session_id = %session_id, message_len = message.len(), "Chat message received");
    let response = state
        .orchestrator
        .generate_reply(&SessionId::from(session_id.as_str()), &message)
        .await;

    Ok(Json(ChatResponse {
        status: "success".into(),
        response,
    }))
}

async fn history_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    match state.orchestrator.history(&SessionId::from(session_id.as_str())).await {
        Ok(history) => Ok(Json(HistoryResponse {
            status: "success".into(),
            history,
        })),
        Err(e) if e.is_not_found() => Err(api_error(StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => {
            error!(session_id = %session_id, "History lookup failed: {e}");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
