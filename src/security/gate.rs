//! Human confirmation gate for flagged commands.
//!
//! The gate never reads input itself. It hands a [`ConfirmationRequest`] to an
//! operator task over a channel and waits for the one-line answer to come back
//! on the request's reply channel. Only one request can be outstanding at a
//! time; the slot is released on every path out of [`ConfirmationGate::authorize`].

use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{info, warn};

use super::classifier::SafetyVerdict;
use crate::tool::CommandRequest;

/// Commands longer than this are shortened in the prompt.
pub const PROMPT_DISPLAY_CHARS: usize = 120;

/// Operator channel buffer. One pending request is all the gate ever sends.
const OPERATOR_CHANNEL_BUFFER: usize = 1;

/// A yes/no question for the human operator.
#[derive(Debug)]
pub struct ConfirmationRequest {
    /// Full prompt text, ready to print.
    pub prompt: String,
    respond_to: oneshot::Sender<String>,
}

impl ConfirmationRequest {
    /// Send the operator's raw answer back to the waiting gate.
    pub fn respond(self, answer: impl Into<String>) {
        if self.respond_to.send(answer.into()).is_err() {
            warn!("Confirmation answer dropped: the gate is no longer waiting");
        }
    }
}

/// Outcome of a confirmation round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Rejected,
}

/// Blocks flagged commands until a human operator approves them.
pub struct ConfirmationGate {
    operator: mpsc::Sender<ConfirmationRequest>,
    slot: Mutex<()>,
}

impl ConfirmationGate {
    /// Create a gate together with the receiving end the operator task reads from.
    pub fn channel() -> (Self, mpsc::Receiver<ConfirmationRequest>) {
        let (operator, requests) = mpsc::channel(OPERATOR_CHANNEL_BUFFER);
        let gate = Self {
            operator,
            slot: Mutex::new(()),
        };
        (gate, requests)
    }

    /// Ask the operator whether a flagged request may run.
    ///
    /// Answers starting with `y` (any case, surrounding whitespace ignored)
    /// approve; anything else rejects, as does an operator that has gone away.
    pub async fn authorize(&self, request: &CommandRequest, verdict: &SafetyVerdict) -> Decision {
        let _slot = self.slot.lock().await;

        let (respond_to, answer) = oneshot::channel();
        let confirmation = ConfirmationRequest {
            prompt: confirmation_prompt(request.command(), verdict),
            respond_to,
        };

        if self.operator.send(confirmation).await.is_err() {
            warn!(command = request.command(), "No operator available, rejecting command");
            return Decision::Rejected;
        }

        let decision = match answer.await {
            Ok(text) if is_affirmative(&text) => Decision::Approved,
            Ok(_) => Decision::Rejected,
            Err(_) => {
                warn!(command = request.command(), "Operator closed without answering");
                Decision::Rejected
            }
        };
        info!(command = request.command(), ?decision, "Confirmation finished");
        decision
    }
}

/// Shorten a command for display: first 117 characters plus `...`.
pub fn summarize_command(command: &str) -> String {
    if command.chars().count() <= PROMPT_DISPLAY_CHARS {
        return command.to_string();
    }
    let mut out: String = command.chars().take(PROMPT_DISPLAY_CHARS - 3).collect();
    out.push_str("...");
    out
}

pub fn is_affirmative(answer: &str) -> bool {
    answer.trim().to_lowercase().starts_with('y')
}

fn confirmation_prompt(command: &str, verdict: &SafetyVerdict) -> String {
    let reason = verdict
        .rule
        .map(|rule| format!(" ({})", rule.description()))
        .unwrap_or_default();
    format!(
        "Potentially destructive command detected{reason}:\n  {}\nProceed? [y/N] ",
        summarize_command(command)
    )
}
