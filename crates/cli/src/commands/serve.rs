//! `parley serve` — Start the HTTP gateway.

use super::{build_orchestrator, load_config};
use std::sync::Arc;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config()?;
    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        eprintln!("  ⚠️  No API key configured; every chat turn will answer with the apology text.");
    }

    let orchestrator = Arc::new(build_orchestrator(&config).await?);

    println!("💬 Parley Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Persona:   {}", orchestrator.persona().name);
    println!("   Model:     {}", config.generation.persona_chat.model);

    parley_gateway::start(orchestrator, &config.gateway.host, config.gateway.port).await?;

    Ok(())
}
