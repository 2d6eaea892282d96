//! Knowledge enricher trait — short guidance text derived from a knowledge graph.
//!
//! Enrichment is always optional. A disabled enricher is modelled as the
//! absence of one (`Option<Arc<dyn KnowledgeEnricher>>`), and callers treat
//! absence exactly like a failed call.

use async_trait::async_trait;
use crate::error::KnowledgeError;

#[async_trait]
pub trait KnowledgeEnricher: Send + Sync {
    /// A human-readable name (e.g., "graphrag", "static").
    fn name(&self) -> &str;

    /// Produce guidance for the latest user message. Empty means "nothing relevant".
    async fn enrich(&self, user_text: &str) -> std::result::Result<String, KnowledgeError>;

    /// Health check — is the knowledge service reachable?
    async fn health_check(&self) -> std::result::Result<bool, KnowledgeError> {
        Ok(true)
    }
}
