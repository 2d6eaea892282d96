//! `parley chat` — Interactive or single-message chat mode.

use super::{build_orchestrator, load_config};
use parley_config::AppConfig;
use parley_core::message::SessionId;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(session: Option<String>, message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENROUTER_API_KEY = 'sk-or-v1-...'   (recommended)");
        eprintln!("    OPENAI_API_KEY     = 'sk-...'         (OpenAI-compatible endpoint)");
        eprintln!("    PARLEY_API_KEY     = 'sk-...'         (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let orchestrator = build_orchestrator(&config).await?;
    let (session_id, welcome) = orchestrator
        .start_session(session.as_deref().map(SessionId::from))
        .await?;

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let reply = orchestrator.generate_reply(&session_id, &msg).await;
        eprint!("\r              \r");
        println!("{reply}");
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║          Parley — Interactive Chat           ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Persona:   {}", orchestrator.persona().name);
    println!("  Model:     {}", config.generation.persona_chat.model);
    println!("  Session:   {session_id}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();
    for line in welcome.lines() {
        println!("  {} > {line}", orchestrator.persona().name);
    }
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if matches!(text, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let reply = orchestrator.generate_reply(&session_id, text).await;
        eprint!("\r     \r");
        println!();
        for line in reply.lines() {
            println!("  {} > {line}", orchestrator.persona().name);
        }
        println!();
    }

    println!();
    println!("  Mata ne! Resume later with: parley chat --session {session_id}");
    println!();
    Ok(())
}
