//! HTTP client for a graph-RAG knowledge service.
//!
//! Posts `{"query": "<user text>"}` to the configured endpoint and expects
//! `{"guidance": [...], "inspiration": [...]}` back. Both lists are optional.

use async_trait::async_trait;
use parley_core::error::KnowledgeError;
use parley_core::knowledge::KnowledgeEnricher;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct HttpKnowledgeEnricher {
    endpoint: String,
    min_words: usize,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EnrichmentResponse {
    #[serde(default, alias = "llm_guidance")]
    guidance: Vec<String>,
    #[serde(default)]
    inspiration: Vec<String>,
}

impl HttpKnowledgeEnricher {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, KnowledgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| KnowledgeError::Unavailable(format!("HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            min_words: 3,
            client,
        })
    }

    /// Messages with fewer words than this skip the service entirely.
    pub fn with_min_words(mut self, min_words: usize) -> Self {
        self.min_words = min_words;
        self
    }
}

#[async_trait]
impl KnowledgeEnricher for HttpKnowledgeEnricher {
    fn name(&self) -> &str {
        "graphrag"
    }

    async fn enrich(&self, user_text: &str) -> Result<String, KnowledgeError> {
        if user_text.split_whitespace().count() < self.min_words {
            debug!("Message too short for enrichment, skipping");
            return Ok(String::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "query": user_text }))
            .send()
            .await
            .map_err(|e| KnowledgeError::Unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(KnowledgeError::QueryFailed {
                status_code: status.as_u16(),
                message,
            });
        }

        let body: EnrichmentResponse = response
            .json()
            .await
            .map_err(|e| KnowledgeError::InvalidResponse(e.to_string()))?;

        debug!(
            guidance = body.guidance.len(),
            inspiration = body.inspiration.len(),
            "Knowledge service answered"
        );
        Ok(crate::format_guidance(&body.guidance, &body.inspiration))
    }

    async fn health_check(&self) -> Result<bool, KnowledgeError> {
        // Any HTTP answer means the service is up
        self.client
            .get(&self.endpoint)
            .send()
            .await
            .map(|_| true)
            .map_err(|e| KnowledgeError::Unavailable(e.to_string()))
    }
}
