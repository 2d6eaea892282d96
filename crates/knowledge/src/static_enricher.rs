//! Static enricher — fixed guidance keyed by keyword.
//!
//! Useful for demos and tests where no graph service is running.

use async_trait::async_trait;
use parley_core::error::KnowledgeError;
use parley_core::knowledge::KnowledgeEnricher;

pub struct StaticEnricher {
    entries: Vec<(String, String)>,
}

impl StaticEnricher {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Emit `guidance` whenever `keyword` appears in the message (case-insensitive).
    pub fn with_entry(mut self, keyword: impl Into<String>, guidance: impl Into<String>) -> Self {
        self.entries.push((keyword.into().to_lowercase(), guidance.into()));
        self
    }
}

impl Default for StaticEnricher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KnowledgeEnricher for StaticEnricher {
    fn name(&self) -> &str {
        "static"
    }

    async fn enrich(&self, user_text: &str) -> Result<String, KnowledgeError> {
        let lower = user_text.to_lowercase();
        let guidance: Vec<String> = self
            .entries
            .iter()
            .filter(|(keyword, _)| lower.contains(keyword.as_str()))
            .map(|(_, guidance)| guidance.clone())
            .collect();
        Ok(crate::format_guidance(&guidance, &[]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn matches_keywords_case_insensitively() {
        let enricher = StaticEnricher::new()
            .with_entry("Mochi", "Mochi is the user's cat")
            .with_entry("bitcoin", "User holds BTC");
        let text = enricher.enrich("how is mochi doing?").await.unwrap();
        assert_eq!(text, "RAG Guidance:\n- Mochi is the user's cat");
    }

    #[tokio::test]
    async fn no_match_is_empty() {
        let enricher = StaticEnricher::new().with_entry("mochi", "cat");
        assert!(enricher.enrich("hello there friend").await.unwrap().is_empty());
    }
}
