//! Main entry point for Rusty Agent.
//!
//! Loads `.env`, initializes logging and configuration, then runs the REPL.

use anyhow::Result;
use rusty_agent::utils;
use rusty_agent::{AgentConfig, App};

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv_path = dotenvy::dotenv();

    // Held until exit so the log writer flushes.
    let _log_guard = utils::logger::init_logging();

    match dotenv_path {
        Ok(path) => tracing::info!("Loaded environment from {}", path.display()),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => tracing::warn!("Failed to load .env: {}", e),
    }

    let config = AgentConfig::from_env()?;
    App::new(&config)?.run().await
}
