//! Application state and the interactive loop.
//!
//! The App owns the console and the agent session. Confirmation requests
//! raised while a turn runs are answered by a background task that shares
//! the same console.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::ai::AgentSession;
use crate::config::AgentConfig;
use crate::security::ConfirmationGate;
use crate::shell::ProcessExecutor;
use crate::tool::{RunCommandTool, SideChannel};
use crate::ui::{Console, serve_confirmations};

pub const READY_MESSAGE: &str = "Terminal Agent ready. Type your request, or 'exit' to quit.";
pub const INPUT_PROMPT: &str = "> ";

/// What to do with one line typed at the REPL prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Skip,
    Exit,
    Request(String),
}

impl Input {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            Input::Skip
        } else if line.eq_ignore_ascii_case("exit") {
            Input::Exit
        } else {
            Input::Request(line.to_string())
        }
    }
}

pub struct App {
    console: Arc<Console>,
    session: AgentSession,
}

impl App {
    /// Build the app on top of stdin. Must be called inside a tokio runtime.
    pub fn new(config: &AgentConfig) -> Result<Self> {
        Self::with_console(config, Arc::new(Console::stdin()))
    }

    pub fn with_console(config: &AgentConfig, console: Arc<Console>) -> Result<Self> {
        let (gate, requests) = ConfirmationGate::channel();
        tokio::spawn(serve_confirmations(Arc::clone(&console), requests));

        let tool = RunCommandTool::new(gate, ProcessExecutor::default(), SideChannel::stderr());
        let session = AgentSession::new(config, Arc::new(tool))
            .context("Failed to create agent session")?;

        info!(model = %config.model, "Agent initialized");
        Ok(Self { console, session })
    }

    pub async fn run(&mut self) -> Result<()> {
        println!("{READY_MESSAGE}");

        loop {
            let Some(line) = self.console.read_line(INPUT_PROMPT).await? else {
                println!();
                break;
            };

            let request = match Input::parse(&line) {
                Input::Skip => continue,
                Input::Exit => break,
                Input::Request(request) => request,
            };

            let mut stdout = std::io::stdout();
            match self.session.run_turn(&request, &mut stdout).await {
                Ok(()) => writeln!(stdout)?,
                Err(e) => {
                    error!("Turn failed: {:#}", e);
                    eprintln!("Error: {e:#}");
                }
            }
        }

        info!("Agent exiting");
        Ok(())
    }
}
