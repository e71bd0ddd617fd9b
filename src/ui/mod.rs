//! Terminal-facing input and output.
//!
//! The agent talks to its human through a plain line console: the REPL
//! prompt, confirmation questions, and streamed assistant text.

pub mod console;

pub use console::{Console, serve_confirmations};
