//! Validated input for a single `run_command` invocation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
pub const MAX_TIMEOUT_MS: u64 = 5 * 60_000;

/// Raw tool arguments as sent by the model.
///
/// `timeoutMs` and `cwd` may be missing or `null`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCommandArgs {
    pub command: String,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestError {
    #[error("command must not be empty")]
    EmptyCommand,
    #[error("timeoutMs must be between 1 and {MAX_TIMEOUT_MS}, got {0}")]
    TimeoutOutOfRange(u64),
}

/// An accepted command request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    command: String,
    timeout: Duration,
    cwd: Option<PathBuf>,
}

impl CommandRequest {
    pub fn new(
        command: impl Into<String>,
        timeout_ms: Option<u64>,
        cwd: Option<PathBuf>,
    ) -> Result<Self, RequestError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(RequestError::EmptyCommand);
        }

        let timeout_ms = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        if !(1..=MAX_TIMEOUT_MS).contains(&timeout_ms) {
            return Err(RequestError::TimeoutOutOfRange(timeout_ms));
        }

        Ok(Self {
            command,
            timeout: Duration::from_millis(timeout_ms),
            cwd,
        })
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }
}

impl TryFrom<RunCommandArgs> for CommandRequest {
    type Error = RequestError;

    fn try_from(args: RunCommandArgs) -> Result<Self, Self::Error> {
        // An empty cwd means "not given".
        let cwd = args.cwd.filter(|dir| !dir.is_empty()).map(PathBuf::from);
        Self::new(args.command, args.timeout_ms, cwd)
    }
}
