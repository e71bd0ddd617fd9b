//! The command-execution tool exposed to the agent.
//!
//! Ties together request validation, the safety classifier, the
//! confirmation gate, the process executor and result formatting.

mod format;
mod request;
mod run_command;

pub use format::{
    CommandReport, FormatLimits, HumanPreview, SIDE_CHANNEL_MARKER, SideChannel, format_result,
    head_chars, tail_chars,
};
pub use request::{
    CommandRequest, DEFAULT_TIMEOUT_MS, MAX_TIMEOUT_MS, RequestError, RunCommandArgs,
};
pub use run_command::{
    CANCELLED_MESSAGE, Cancellation, RunCommandTool, TOOL_DESCRIPTION, TOOL_NAME, ToolError,
    ToolOutcome, parameters_schema,
};
