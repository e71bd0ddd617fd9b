//! Event sources for the agent.
//!
//! Two channels feed the application:
//!
//! - **Line input**: raw lines typed by the human, read on a dedicated thread
//!   so blocking stdin reads never stall the async runtime.
//! - **AI stream data**: chunks and tool calls coming back from a streaming
//!   chat completion, produced by a spawned request task.

use std::io::{BufRead, Result};
use std::thread;

use tokio::sync::mpsc::{self, Receiver};

/// Buffered lines not yet consumed by the REPL or the confirmation prompt.
const LINE_INPUT_BUFFER: usize = 64;

/// Initializes the line input stream.
///
/// Spawns a thread that reads stdin line by line (without the trailing
/// newline) and forwards each line. The channel closes on EOF, after a read
/// error has been forwarded, or when the receiver is dropped.
pub fn init_line_input() -> Receiver<Result<String>> {
    let (tx, rx) = mpsc::channel(LINE_INPUT_BUFFER);
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });
    rx
}

// =============================================================================
// AI Stream Data (Dedicated Channel)
// =============================================================================

/// Data transmitted from a streaming chat completion task.
///
/// End-of-stream travels on the same channel as the chunks so ordering with
/// the text is preserved.
#[derive(Debug, Clone)]
pub enum AiStreamData {
    /// A chunk of assistant text
    Chunk { text: String },
    /// Tool calls assembled from the stream, in index order: (id, name, arguments)
    ToolCalls { tool_calls: Vec<(String, String, String)> },
    /// The streaming response has completed
    End,
    /// The request or the stream failed
    Error { error: String },
}
