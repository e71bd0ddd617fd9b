//! Rusty Agent - a terminal assistant that runs shell commands for a model
//!
//! The model reaches the host only through the `run_command` tool:
//! - `security`: destructive-command classifier and human confirmation gate
//! - `shell`: bounded, timed execution of one command through the shell
//! - `tool`: argument validation, result formatting and the tool itself
//! - `ai`: the streaming chat session that dispatches tool calls
//! - `ui` / `event`: the line console shared by the REPL and confirmations

pub mod ai;
pub mod app;
pub mod config;
pub mod event;
pub mod security;
pub mod shell;
pub mod tool;
pub mod ui;
pub mod utils;

// Re-export commonly used types
pub use ai::AgentSession;
pub use app::App;
pub use config::AgentConfig;
pub use security::{ConfirmationGate, SafetyClassifier, is_possibly_destructive};
pub use shell::{ExecutionResult, ProcessExecutor};
pub use tool::{RunCommandTool, ToolOutcome};
