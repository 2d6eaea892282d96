//! LLM provider implementations for Parley.
//!
//! All providers implement the `parley_core::Provider` trait.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;

use parley_core::error::ProviderError;
use parley_core::provider::Provider;
use std::sync::Arc;
use tracing::warn;

/// Build the configured provider.
///
/// A missing API key is not fatal here: the provider is built anyway and
/// every call fails with an authentication error, which turns into the
/// apology reply instead of a startup failure.
pub fn build_from_config(config: &parley_config::AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let api_key = config.api_key.clone().unwrap_or_else(|| {
        warn!(provider = %config.provider.name, "No API key configured");
        String::new()
    });

    let provider = OpenAiCompatProvider::new(&config.provider.name, &config.provider.api_url, api_key)?;
    Ok(Arc::new(provider))
}
