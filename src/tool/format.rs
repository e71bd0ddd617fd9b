//! Result formatting for the two audiences of a command run.
//!
//! The agent gets the full result with each stream cut to its tail. The human
//! operator gets a short preview on a separate channel (stderr by default),
//! framed by marker lines so it stands apart from the agent's own output.

use std::io::Write;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::warn;

use super::request::CommandRequest;
use crate::shell::ExecutionResult;

/// Marker line framing the operator preview.
pub const SIDE_CHANNEL_MARKER: &str = "-----run_command------";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatLimits {
    /// Characters kept from the end of stdout and of stderr.
    pub payload_chars: usize,
    /// Characters of output shown to the operator.
    pub preview_chars: usize,
}

impl Default for FormatLimits {
    fn default() -> Self {
        Self {
            payload_chars: 8000,
            preview_chars: 100,
        }
    }
}

/// What the agent receives for a command that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReport {
    pub command: String,
    pub cwd: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Short excerpt of a run for the human watching the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanPreview {
    pub command: String,
    pub snippet: String,
}

impl HumanPreview {
    pub fn render(&self) -> String {
        format!(
            "\n{SIDE_CHANNEL_MARKER}\n$ {}\n{}\n{SIDE_CHANNEL_MARKER}\n",
            self.command, self.snippet
        )
    }
}

/// Split an execution result into the agent payload and the operator preview.
pub fn format_result(
    request: &CommandRequest,
    result: ExecutionResult,
    limits: &FormatLimits,
) -> (CommandReport, HumanPreview) {
    let primary = if result.stdout.trim().is_empty() {
        &result.stderr
    } else {
        &result.stdout
    };
    let preview = HumanPreview {
        command: request.command().to_string(),
        snippet: head_chars(primary, limits.preview_chars),
    };

    let cwd = match request.cwd() {
        Some(dir) => dir.display().to_string(),
        None => std::env::current_dir()
            .map(|dir| dir.display().to_string())
            .unwrap_or_else(|_| ".".to_string()),
    };

    let report = CommandReport {
        command: request.command().to_string(),
        cwd,
        exit_code: result.exit_code,
        timed_out: result.timed_out,
        stdout: tail_chars(&result.stdout, limits.payload_chars).to_string(),
        stderr: tail_chars(&result.stderr, limits.payload_chars).to_string(),
    };

    (report, preview)
}

/// Last `max` characters of `s`.
pub fn tail_chars(s: &str, max: usize) -> &str {
    if max == 0 {
        return "";
    }
    match s.char_indices().rev().nth(max - 1) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// First `max` characters of `s`, with `…` appended when anything was cut.
pub fn head_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

/// Writer for operator previews, shared by every tool call.
#[derive(Clone)]
pub struct SideChannel {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl SideChannel {
    pub fn new(sink: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(sink))),
        }
    }

    pub fn stderr() -> Self {
        Self::new(std::io::stderr())
    }

    /// Write a preview block. Failures are logged and otherwise ignored.
    pub fn emit(&self, preview: &HumanPreview) {
        let mut sink = match self.sink.lock() {
            Ok(sink) => sink,
            Err(poisoned) => poisoned.into_inner(),
        };
        let written = sink
            .write_all(preview.render().as_bytes())
            .and_then(|()| sink.flush());
        if let Err(e) = written {
            warn!("Failed to write command preview: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::test_support::SharedBuffer;

    fn request(command: &str) -> CommandRequest {
        CommandRequest::new(command, None, None).unwrap()
    }

    fn result(stdout: &str, stderr: &str) -> ExecutionResult {
        ExecutionResult {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            timed_out: false,
        }
    }

    #[test]
    fn test_payload_keeps_exact_tail() {
        let stdout = format!("{}{}", "a".repeat(1000), "b".repeat(8000));
        let (report, preview) = format_result(&request("gen"), result(&stdout, ""), &FormatLimits::default());

        assert_eq!(report.stdout.chars().count(), 8000);
        assert!(report.stdout.chars().all(|c| c == 'b'));
        assert_eq!(preview.snippet, format!("{}…", "a".repeat(100)));
    }

    #[test]
    fn test_short_output_untouched() {
        let (report, preview) = format_result(&request("echo hi"), result("hi\n", ""), &FormatLimits::default());
        assert_eq!(report.stdout, "hi\n");
        assert_eq!(report.stderr, "");
        assert_eq!(preview.snippet, "hi\n");
    }

    #[test]
    fn test_preview_falls_back_to_stderr() {
        let (_, preview) = format_result(
            &request("ls nope"),
            result("  \n", "ls: cannot access 'nope'"),
            &FormatLimits::default(),
        );
        assert_eq!(preview.snippet, "ls: cannot access 'nope'");
    }

    #[test]
    fn test_stderr_tail_bounded_too() {
        let stderr = "e".repeat(9000);
        let (report, _) = format_result(&request("x"), result("", &stderr), &FormatLimits::default());
        assert_eq!(report.stderr.len(), 8000);
    }

    #[test]
    fn test_report_fields() {
        let request = CommandRequest::new("sleep 9", Some(10), Some("/srv".into())).unwrap();
        let result = ExecutionResult {
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            timed_out: true,
        };
        let (report, _) = format_result(&request, result, &FormatLimits::default());
        assert_eq!(report.cwd, "/srv");
        assert_eq!(report.exit_code, None);
        assert!(report.timed_out);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "command": "sleep 9",
                "cwd": "/srv",
                "exitCode": null,
                "timedOut": true,
                "stdout": "",
                "stderr": "",
            })
        );
    }

    #[test]
    fn test_missing_cwd_reports_process_dir() {
        let (report, _) = format_result(&request("true"), result("", ""), &FormatLimits::default());
        let here = std::env::current_dir().unwrap();
        assert_eq!(report.cwd, here.display().to_string());
    }

    #[test]
    fn test_char_helpers_respect_utf8() {
        assert_eq!(tail_chars("héllo wörld", 5), "wörld");
        assert_eq!(tail_chars("abc", 10), "abc");
        assert_eq!(tail_chars("abc", 0), "");
        assert_eq!(head_chars("日本語テキスト", 3), "日本語…");
        assert_eq!(head_chars("abc", 3), "abc");
    }

    #[test]
    fn test_side_channel_block() {
        let buffer = SharedBuffer::default();
        let channel = SideChannel::new(buffer.clone());
        channel.emit(&HumanPreview {
            command: "git status".to_string(),
            snippet: "On branch main".to_string(),
        });

        assert_eq!(
            buffer.contents(),
            "\n-----run_command------\n$ git status\nOn branch main\n-----run_command------\n"
        );
    }
}
