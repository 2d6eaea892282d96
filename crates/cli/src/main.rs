//! Parley CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write the default config and persona files
//! - `serve`    — Start the HTTP gateway
//! - `chat`     — Interactive or single-message chat
//! - `history`  — Print a session's stored context
//! - `doctor`   — Diagnose configuration and collaborators

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley — a persona chat agent with bounded, summarized memory",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default configuration and persona files
    Onboard,

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with the persona
    Chat {
        /// Resume an existing session instead of starting a new one
        #[arg(short, long)]
        session: Option<String>,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Print the stored context of a session
    History {
        /// The session to inspect
        session_id: String,
    },

    /// Diagnose configuration and collaborator health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Onboard => commands::onboard::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat { session, message } => commands::chat::run(session, message).await?,
        Commands::History { session_id } => commands::history::run(session_id).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
