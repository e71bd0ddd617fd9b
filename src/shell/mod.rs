//! Shell execution and process management module.
//!
//! Runs single commands in a fresh shell subprocess with a deadline and
//! captures everything they print.

mod executor;
pub use executor::{ExecError, ExecutionResult, ExecutorConfig, ProcessExecutor};
