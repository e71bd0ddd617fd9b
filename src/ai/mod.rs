//! AI module for the model conversation.
//!
//! Holds the system prompt and the session that streams replies and
//! drives `run_command` tool calls.

pub mod prompt;
pub mod session;

pub use session::AgentSession;
