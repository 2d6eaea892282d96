//! Knowledge enricher implementations for Parley.
//!
//! All enrichers implement `parley_core::KnowledgeEnricher`. Enrichment is
//! optional; `build_from_config` returns `None` when it is disabled.

pub mod http;
pub mod static_enricher;

pub use http::HttpKnowledgeEnricher;
pub use static_enricher::StaticEnricher;

use parley_core::error::KnowledgeError;
use parley_core::knowledge::KnowledgeEnricher;
use std::sync::Arc;
use tracing::info;

/// Build the configured enricher, or `None` when enrichment is disabled.
pub fn build_from_config(
    config: &parley_config::AppConfig,
) -> Result<Option<Arc<dyn KnowledgeEnricher>>, KnowledgeError> {
    if !config.knowledge.enabled {
        info!("Knowledge enrichment disabled");
        return Ok(None);
    }

    let enricher = HttpKnowledgeEnricher::new(&config.knowledge.endpoint)?
        .with_min_words(config.knowledge.min_words);
    info!(endpoint = %config.knowledge.endpoint, "Knowledge enrichment enabled");
    Ok(Some(Arc::new(enricher)))
}

/// Render guidance and inspiration lines into prompt sections.
///
/// Empty lists produce no section; two empty lists produce an empty string.
pub fn format_guidance(guidance: &[String], inspiration: &[String]) -> String {
    let mut sections = Vec::new();
    for (title, lines) in [("RAG Guidance", guidance), ("Inspiration", inspiration)] {
        let lines: Vec<String> = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .map(|l| format!("- {l}"))
            .collect();
        if !lines.is_empty() {
            sections.push(format!("{title}:\n{}", lines.join("\n")));
        }
    }
    sections.join("\n\n")
}
