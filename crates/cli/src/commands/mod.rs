//! Subcommand implementations and the wiring they share.

pub mod chat;
pub mod doctor;
pub mod history;
pub mod onboard;
pub mod serve;

use parley_agent::ResponseOrchestrator;
use parley_config::AppConfig;
use parley_core::persona::Persona;
use parley_tools::RuleBasedOrchestrator;
use std::sync::Arc;

/// Load the config, failing with a readable message.
pub fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}

/// Build the orchestrator and every collaborator behind it.
///
/// The store connects through its retry policy; running out of attempts is
/// fatal for the calling command.
pub async fn build_orchestrator(config: &AppConfig) -> Result<ResponseOrchestrator, Box<dyn std::error::Error>> {
    let store = parley_store::build_from_config(config).await?;
    let provider = parley_providers::build_from_config(config)?;
    let enricher = parley_knowledge::build_from_config(config)?;
    let tools = Arc::new(RuleBasedOrchestrator::default());
    let persona = Persona::load(&config.persona_source());

    Ok(ResponseOrchestrator::from_config(
        config, store, provider, enricher, tools, persona,
    ))
}
