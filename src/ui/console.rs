//! Line-oriented console shared by the REPL and the confirmation operator.

use std::io::Result as IoResult;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::execute;
use crossterm::style::{Print, Stylize};
use tokio::sync::Mutex;
use tokio::sync::mpsc::Receiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{debug, error};

use crate::event::init_line_input;
use crate::security::ConfirmationRequest;

/// Interactive console. Whoever holds the line lock owns the prompt until
/// the answer arrives, so a confirmation question and the REPL prompt never
/// compete for the same line.
pub struct Console {
    lines: Mutex<Receiver<IoResult<String>>>,
}

impl Console {
    /// Console backed by the process's stdin.
    pub fn stdin() -> Self {
        Self::new(init_line_input())
    }

    pub fn new(lines: Receiver<IoResult<String>>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }

    /// Print `prompt` and wait for the next line. `Ok(None)` means EOF.
    pub async fn read_line(&self, prompt: &str) -> Result<Option<String>> {
        let mut lines = self.lines.lock().await;
        Self::prompt_and_read(&mut lines, prompt).await
    }

    /// Like [`Console::read_line`], but first discards lines typed before the
    /// prompt was shown, so the answer is always typed in response to it.
    pub async fn read_fresh_line(&self, prompt: &str) -> Result<Option<String>> {
        let mut lines = self.lines.lock().await;
        let mut discarded = 0usize;
        loop {
            match lines.try_recv() {
                Ok(_) => discarded += 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return Ok(None),
            }
        }
        if discarded > 0 {
            debug!(discarded, "Dropped input typed before the prompt");
        }
        Self::prompt_and_read(&mut lines, prompt).await
    }

    async fn prompt_and_read(
        lines: &mut Receiver<IoResult<String>>,
        prompt: &str,
    ) -> Result<Option<String>> {
        execute!(std::io::stdout(), Print(prompt)).context("Failed to write prompt")?;
        match lines.recv().await {
            Some(line) => line.map(Some).context("Failed to read from stdin"),
            None => Ok(None),
        }
    }
}

/// Answer confirmation requests from the console until the gate goes away.
///
/// Only a line typed after the question is printed counts as the answer.
/// EOF and read errors count as an empty answer, which the gate treats as
/// a rejection.
pub async fn serve_confirmations(console: Arc<Console>, mut requests: Receiver<ConfirmationRequest>) {
    while let Some(request) = requests.recv().await {
        let prompt = format!("\n{}", request.prompt.as_str().yellow().bold());
        match console.read_fresh_line(&prompt).await {
            Ok(Some(answer)) => request.respond(answer),
            Ok(None) => request.respond(""),
            Err(e) => {
                error!("Failed to read confirmation answer: {:#}", e);
                request.respond("");
            }
        }
    }
}
