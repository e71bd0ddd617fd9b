//! Security module for command analysis and confirmation.
//!
//! Flags potentially destructive commands and routes them through a human
//! confirmation gate before they are allowed to run.

mod classifier;
mod gate;

pub use classifier::{MAX_SCAN_CHARS, Rule, SafetyClassifier, SafetyVerdict, is_possibly_destructive};
pub use gate::{
    ConfirmationGate, ConfirmationRequest, Decision, PROMPT_DISPLAY_CHARS, is_affirmative,
    summarize_command,
};
