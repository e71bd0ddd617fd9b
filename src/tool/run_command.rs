//! The `run_command` tool: classify, confirm, execute, report.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use super::format::{CommandReport, FormatLimits, SideChannel, format_result};
use super::request::{
    CommandRequest, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS, RequestError, RunCommandArgs,
};
use crate::security::{ConfirmationGate, Decision, SafetyClassifier};
use crate::shell::{ExecError, ProcessExecutor};

pub const TOOL_NAME: &str = "run_command";
pub const TOOL_DESCRIPTION: &str = "Execute a shell command and return stdout/stderr. \
     Use carefully; ask for confirmation for destructive operations.";
pub const CANCELLED_MESSAGE: &str = "Execution cancelled by user.";

/// Result of one tool call, as handed back to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ToolOutcome {
    Completed(CommandReport),
    Cancelled(Cancellation),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cancellation {
    pub cancelled: bool,
    pub message: String,
}

impl ToolOutcome {
    pub fn cancelled() -> Self {
        ToolOutcome::Cancelled(Cancellation {
            cancelled: true,
            message: CANCELLED_MESSAGE.to_string(),
        })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolOutcome::Cancelled(_))
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid run_command arguments: {0}")]
    MalformedArguments(#[from] serde_json::Error),
    #[error("invalid run_command arguments: {0}")]
    InvalidArguments(#[from] RequestError),
    /// The command never ran because the executor itself failed.
    #[error(transparent)]
    Execution(#[from] ExecError),
}

impl ToolError {
    /// Argument problems are the model's to fix; execution failures are not.
    pub fn is_argument_error(&self) -> bool {
        matches!(self, ToolError::MalformedArguments(_) | ToolError::InvalidArguments(_))
    }
}

/// JSON schema for the tool's parameters (strict mode: every field listed
/// as required, optional ones nullable). Ranges are enforced by
/// [`CommandRequest`], not by the schema.
pub fn parameters_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "command": {
                "type": "string",
                "description": "The shell command to execute"
            },
            "timeoutMs": {
                "type": ["integer", "null"],
                "description": format!(
                    "Timeout in milliseconds, 1 to {MAX_TIMEOUT_MS} (default {DEFAULT_TIMEOUT_MS})"
                )
            },
            "cwd": {
                "type": ["string", "null"],
                "description": "Working directory for the command"
            }
        },
        "required": ["command", "timeoutMs", "cwd"],
        "additionalProperties": false
    })
}

pub struct RunCommandTool {
    classifier: SafetyClassifier,
    gate: ConfirmationGate,
    executor: ProcessExecutor,
    side_channel: SideChannel,
    limits: FormatLimits,
}

impl RunCommandTool {
    pub fn new(gate: ConfirmationGate, executor: ProcessExecutor, side_channel: SideChannel) -> Self {
        Self {
            classifier: SafetyClassifier::default(),
            gate,
            executor,
            side_channel,
            limits: FormatLimits::default(),
        }
    }

    pub fn with_classifier(mut self, classifier: SafetyClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_limits(mut self, limits: FormatLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Handle a raw tool call whose arguments are a JSON string.
    pub async fn call(&self, arguments: &str) -> Result<ToolOutcome, ToolError> {
        let args: RunCommandArgs = serde_json::from_str(arguments)?;
        let request = CommandRequest::try_from(args)?;
        Ok(self.run(request).await?)
    }

    /// Run a validated request.
    ///
    /// A flagged command only reaches the executor after the operator
    /// approves it; a rejection returns [`ToolOutcome::Cancelled`].
    pub async fn run(&self, request: CommandRequest) -> Result<ToolOutcome, ExecError> {
        let verdict = self.classifier.classify(request.command());
        if verdict.flagged() {
            info!(command = request.command(), rule = ?verdict.rule, "Command flagged as destructive");
            if self.gate.authorize(&request, &verdict).await == Decision::Rejected {
                return Ok(ToolOutcome::cancelled());
            }
        }

        let result = self
            .executor
            .execute(request.command(), request.cwd(), request.timeout())
            .await?;

        let (report, preview) = format_result(&request, result, &self.limits);
        self.side_channel.emit(&preview);
        Ok(ToolOutcome::Completed(report))
    }
}
