//! `parley history` — Print the stored context of a session.

use super::{build_orchestrator, load_config};
use parley_agent::context::token::render_message;
use parley_core::message::SessionId;

pub async fn run(session_id: String) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let orchestrator = build_orchestrator(&config).await?;
    let session_id = SessionId::from(session_id.as_str());

    match orchestrator.history(&session_id).await {
        Ok(history) if history.is_empty() => println!("  (no messages yet)"),
        Ok(history) => {
            for message in &history {
                println!(
                    "  {} {}",
                    message.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    render_message(message)
                );
            }
        }
        Err(e) if e.is_not_found() => {
            return Err(format!("Unknown session: {session_id}").into());
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
