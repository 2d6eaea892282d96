//! Shared collaborator stubs for agent tests.

use async_trait::async_trait;
use parley_core::error::{KnowledgeError, ProviderError, ToolError};
use parley_core::knowledge::KnowledgeEnricher;
use parley_core::message::Message;
use parley_core::provider::{Provider, ProviderRequest, ProviderResponse};
use parley_core::tool::{ToolOrchestrator, ToolOutcome};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

/// A provider that answers from a script and records every request.
///
/// Once the script runs out, the last entry repeats.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    last: Mutex<Option<Result<String, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Always reply with `text`.
    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_string())])
    }

    /// Always fail.
    pub fn failing() -> Self {
        Self::new(vec![Err(ProviderError::ApiError {
            status_code: 500,
            message: "model exploded".into(),
        })])
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The prompt text of the most recent request.
    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .unwrap()
            .last()
            .and_then(|r| r.messages.last().map(|m| m.content.clone()))
    }

    fn next(&self) -> Result<String, ProviderError> {
        let mut script = self.script.lock().unwrap();
        let mut last = self.last.lock().unwrap();
        if let Some(entry) = script.pop_front() {
            *last = Some(entry);
        }
        last.clone().unwrap_or_else(|| Ok(String::new()))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let text = self.next()?;
        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: None,
            model,
        })
    }
}

/// An enricher with a fixed answer, an error, or a stall.
pub enum StubEnricher {
    Guidance(String),
    Failing,
    Stalled,
}

#[async_trait]
impl KnowledgeEnricher for StubEnricher {
    fn name(&self) -> &str {
        "stub"
    }

    async fn enrich(&self, _user_text: &str) -> Result<String, KnowledgeError> {
        match self {
            Self::Guidance(text) => Ok(text.clone()),
            Self::Failing => Err(KnowledgeError::Unavailable("graph offline".into())),
            Self::Stalled => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }
    }
}

/// A tool orchestrator with a fixed outcome.
pub enum StubTools {
    Nothing,
    Outcome(String),
    Failing,
    Panicking,
}

#[async_trait]
impl ToolOrchestrator for StubTools {
    async fn evaluate(&self, _user_text: &str) -> Result<Option<ToolOutcome>, ToolError> {
        match self {
            Self::Nothing => Ok(None),
            Self::Outcome(text) => Ok(Some(ToolOutcome {
                tool_name: "stub".into(),
                response: text.clone(),
                data: None,
            })),
            Self::Failing => Err(ToolError::ExecutionFailed {
                tool_name: "stub".into(),
                reason: "tool broke".into(),
            }),
            Self::Panicking => panic!("tool orchestrator panicked"),
        }
    }
}
