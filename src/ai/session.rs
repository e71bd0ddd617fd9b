//! Agent conversation and tool-calling loop.
//!
//! A single conversation with the model. Each user turn streams the model's
//! reply to the console; when the model asks for `run_command`, the call is
//! executed through [`RunCommandTool`] and its JSON outcome is sent back as a
//! tool message, until the model answers without tool calls.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionTool, ChatCompletionToolType, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObject,
};
use futures::StreamExt;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::prompt;
use crate::config::AgentConfig;
use crate::event::AiStreamData;
use crate::tool::{RunCommandTool, TOOL_DESCRIPTION, TOOL_NAME, parameters_schema};

const MAX_HISTORY_MESSAGES: usize = 50;

/// Upper bound on model round-trips within one user turn.
const MAX_TOOL_ROUNDS: usize = 16;

/// Channel buffer size for AI streaming data
const STREAM_CHANNEL_BUFFER: usize = 256;

// =============================================================================
// Tool Definitions
// =============================================================================

fn create_run_command_tool() -> ChatCompletionTool {
    ChatCompletionTool {
        r#type: ChatCompletionToolType::Function,
        function: FunctionObject {
            name: TOOL_NAME.to_string(),
            description: Some(TOOL_DESCRIPTION.to_string()),
            parameters: Some(parameters_schema()),
            strict: Some(true),
        },
    }
}

// =============================================================================
// Agent Session
// =============================================================================

pub struct AgentSession {
    /// Full conversation history for the API (system, user, assistant, tool messages)
    conversation_history: Vec<ChatCompletionRequestMessage>,
    client: Client<OpenAIConfig>,
    model: String,
    tool: Arc<RunCommandTool>,
}

impl AgentSession {
    pub fn new(config: &AgentConfig, tool: Arc<RunCommandTool>) -> Result<Self, OpenAIError> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(prompt::SYSTEM_PROMPT)
            .build()?
            .into();

        Ok(Self {
            conversation_history: vec![system_msg],
            client: Client::with_config(config.openai_config()),
            model: config.model.clone(),
            tool,
        })
    }

    pub fn history(&self) -> &[ChatCompletionRequestMessage] {
        &self.conversation_history
    }

    /// Run one user turn, streaming assistant text into `out`.
    ///
    /// On error the turn is rolled back out of the history, so the next
    /// request never carries a tool call without its reply.
    pub async fn run_turn(&mut self, user_input: &str, out: &mut impl Write) -> Result<()> {
        let checkpoint = self.conversation_history.len();
        let result = self.run_rounds(user_input, out).await;
        if result.is_err() {
            self.conversation_history.truncate(checkpoint);
        }
        trim_history(&mut self.conversation_history, MAX_HISTORY_MESSAGES);
        result
    }

    async fn run_rounds(&mut self, user_input: &str, out: &mut impl Write) -> Result<()> {
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_input)
            .build()?
            .into();
        self.conversation_history.push(user_msg);

        for round in 0..MAX_TOOL_ROUNDS {
            let request = CreateChatCompletionRequestArgs::default()
                .model(&self.model)
                .messages(self.conversation_history.clone())
                .tools(vec![create_run_command_tool()])
                .build()
                .context("Failed to build chat request")?;

            let mut stream_rx = self.spawn_stream(request);
            let mut text = String::new();
            let mut tool_calls = Vec::new();

            while let Some(data) = stream_rx.recv().await {
                match data {
                    AiStreamData::Chunk { text: chunk } => {
                        out.write_all(chunk.as_bytes())?;
                        out.flush()?;
                        text.push_str(&chunk);
                    }
                    AiStreamData::ToolCalls { tool_calls: calls } => tool_calls = calls,
                    AiStreamData::End => break,
                    AiStreamData::Error { error } => bail!(error),
                }
            }

            if tool_calls.is_empty() {
                if !text.is_empty() {
                    let assistant_msg = ChatCompletionRequestAssistantMessageArgs::default()
                        .content(text)
                        .build()?;
                    self.conversation_history.push(assistant_msg.into());
                }
                return Ok(());
            }

            debug!(round, count = tool_calls.len(), "Model requested tool calls");
            self.push_tool_call_message(text, &tool_calls)?;

            // Sequential on purpose: the confirmation prompt is a single slot.
            for (id, name, arguments) in tool_calls {
                let content = self.dispatch(&name, &arguments).await?;
                let tool_msg = ChatCompletionRequestToolMessageArgs::default()
                    .tool_call_id(id)
                    .content(content)
                    .build()?;
                self.conversation_history.push(tool_msg.into());
            }
        }

        bail!("Stopped after {MAX_TOOL_ROUNDS} tool rounds without a final answer")
    }

    /// Record the assistant message that carries the tool calls.
    fn push_tool_call_message(
        &mut self,
        text: String,
        tool_calls: &[(String, String, String)],
    ) -> Result<(), OpenAIError> {
        let tc_objects: Vec<ChatCompletionMessageToolCall> = tool_calls
            .iter()
            .map(|(id, name, args)| ChatCompletionMessageToolCall {
                id: id.clone(),
                r#type: ChatCompletionToolType::Function,
                function: FunctionCall {
                    name: name.clone(),
                    arguments: args.clone(),
                },
            })
            .collect();

        let mut assistant_builder = ChatCompletionRequestAssistantMessageArgs::default();
        if !text.is_empty() {
            assistant_builder.content(text);
        }
        assistant_builder.tool_calls(tc_objects);

        let assistant_msg = assistant_builder.build()?;
        self.conversation_history.push(assistant_msg.into());
        Ok(())
    }

    /// Execute one tool call and return the tool message content.
    ///
    /// Unknown tools and bad arguments are reported back to the model as
    /// `{"error": ...}`. A tool that cannot execute at all aborts the turn.
    async fn dispatch(&self, name: &str, arguments: &str) -> Result<String> {
        if name != TOOL_NAME {
            warn!(name, "Model called an unknown tool");
            return Ok(serde_json::json!({ "error": format!("Unknown tool: {name}") }).to_string());
        }

        match self.tool.call(arguments).await {
            Ok(outcome) => {
                if outcome.is_cancelled() {
                    info!("run_command cancelled by the operator");
                }
                Ok(serde_json::to_string(&outcome)?)
            }
            Err(e) if e.is_argument_error() => {
                warn!("Rejected run_command arguments: {}", e);
                Ok(serde_json::json!({ "error": e.to_string() }).to_string())
            }
            Err(e) => Err(e).context("run_command could not execute"),
        }
    }

    fn spawn_stream(&self, request: CreateChatCompletionRequest) -> Receiver<AiStreamData> {
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_CHANNEL_BUFFER);
        let client = self.client.clone();
        tokio::spawn(stream_completion(client, request, stream_tx));
        stream_rx
    }
}

/// Stream one completion into `stream_tx`.
///
/// Tool calls arrive in fragments keyed by index and are forwarded once the
/// stream completes, followed by `End`.
async fn stream_completion(
    client: Client<OpenAIConfig>,
    request: CreateChatCompletionRequest,
    stream_tx: Sender<AiStreamData>,
) {
    let mut stream = match client.chat().create_stream(request).await {
        Ok(stream) => stream,
        Err(e) => {
            forward(&stream_tx, AiStreamData::Error {
                error: format!("API error: {}", e),
            })
            .await;
            return;
        }
    };

    // index -> (id, name, arguments)
    let mut tool_call_map: BTreeMap<u32, (String, String, String)> = BTreeMap::new();

    while let Some(result) = stream.next().await {
        let response = match result {
            Ok(response) => response,
            Err(e) => {
                forward(&stream_tx, AiStreamData::Error {
                    error: format!("Stream error: {}", e),
                })
                .await;
                return;
            }
        };

        for choice in response.choices {
            if let Some(content) = choice.delta.content {
                forward(&stream_tx, AiStreamData::Chunk { text: content }).await;
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for tc_chunk in tool_calls {
                    let entry = tool_call_map.entry(tc_chunk.index).or_default();
                    if let Some(id) = tc_chunk.id {
                        entry.0 = id;
                    }
                    if let Some(func) = tc_chunk.function {
                        if let Some(name) = func.name {
                            entry.1 = name;
                        }
                        if let Some(args) = func.arguments {
                            entry.2.push_str(&args);
                        }
                    }
                }
            }
        }
    }

    if !tool_call_map.is_empty() {
        let tool_calls = tool_call_map.into_values().collect();
        forward(&stream_tx, AiStreamData::ToolCalls { tool_calls }).await;
    }
    forward(&stream_tx, AiStreamData::End).await;
}

async fn forward(stream_tx: &Sender<AiStreamData>, data: AiStreamData) {
    if let Err(e) = stream_tx.send(data).await {
        error!("Failed to forward stream data: {:?}", e);
    }
}

/// Keep the system prompt plus the most recent messages.
///
/// The kept window never starts with a tool reply whose assistant message
/// was cut off.
fn trim_history(history: &mut Vec<ChatCompletionRequestMessage>, max: usize) {
    if history.len() <= max {
        return;
    }

    let mut start = history.len() - max.saturating_sub(1);
    while start < history.len() && matches!(history[start], ChatCompletionRequestMessage::Tool(_)) {
        start += 1;
    }
    history.drain(1..start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::ConfirmationGate;
    use crate::shell::ProcessExecutor;
    use crate::tool::SideChannel;
    use crate::tool::test_support::SharedBuffer;

    fn user(text: &str) -> ChatCompletionRequestMessage {
        ChatCompletionRequestUserMessageArgs::default()
            .content(text)
            .build()
            .unwrap()
            .into()
    }

    fn tool_reply(id: &str) -> ChatCompletionRequestMessage {
        ChatCompletionRequestToolMessageArgs::default()
            .tool_call_id(id)
            .content("{}")
            .build()
            .unwrap()
            .into()
    }

    fn system() -> ChatCompletionRequestMessage {
        ChatCompletionRequestSystemMessageArgs::default()
            .content("sys")
            .build()
            .unwrap()
            .into()
    }

    fn session(operator_answer: &'static str) -> AgentSession {
        let (gate, mut requests) = ConfirmationGate::channel();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                request.respond(operator_answer);
            }
        });
        let tool = RunCommandTool::new(
            gate,
            ProcessExecutor::default(),
            SideChannel::new(SharedBuffer::default()),
        );
        let config = AgentConfig {
            api_key: "sk-test".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_base: None,
        };
        AgentSession::new(&config, Arc::new(tool)).unwrap()
    }

    #[test]
    fn test_trim_keeps_system_prompt_and_tail() {
        let mut history = vec![system()];
        history.extend((0..60).map(|i| user(&format!("msg {i}"))));

        trim_history(&mut history, 50);

        assert_eq!(history.len(), 50);
        assert!(matches!(history[0], ChatCompletionRequestMessage::System(_)));
        assert_eq!(history[1], user("msg 11"));
        assert_eq!(history[49], user("msg 59"));
    }

    #[test]
    fn test_trim_skips_orphaned_tool_replies() {
        let mut history = vec![system()];
        history.extend((0..8).map(|i| user(&format!("msg {i}"))));
        history.push(tool_reply("call_1"));
        history.push(tool_reply("call_2"));
        history.push(user("latest"));

        // Window of 4 would start at the first tool reply.
        trim_history(&mut history, 4);

        assert_eq!(history.len(), 2);
        assert_eq!(history[1], user("latest"));
    }

    #[test]
    fn test_short_history_untouched() {
        let mut history = vec![system(), user("hi")];
        trim_history(&mut history, 50);
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn test_tool_definition() {
        let tool = create_run_command_tool();
        assert_eq!(tool.function.name, "run_command");
        assert_eq!(tool.function.strict, Some(true));
        assert!(tool.function.parameters.is_some());
    }

    #[tokio::test]
    async fn test_new_session_starts_with_system_prompt() {
        let session = session("n");
        assert_eq!(session.history().len(), 1);
        assert!(matches!(session.history()[0], ChatCompletionRequestMessage::System(_)));
    }

    #[tokio::test]
    async fn test_dispatch_runs_command() {
        let session = session("n");
        let content = session
            .dispatch("run_command", r#"{"command": "echo hello", "timeoutMs": null, "cwd": null}"#)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(json["stdout"].as_str().unwrap().ends_with("hello\n"));
        assert_eq!(json["exitCode"], 0);
        assert_eq!(json["timedOut"], false);
    }

    #[tokio::test]
    async fn test_dispatch_reports_cancellation() {
        let session = session("n");
        let content = session
            .dispatch("run_command", r#"{"command": "rm -rf /tmp/does-not-matter"}"#)
            .await
            .unwrap();

        let json: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(json, serde_json::json!({ "cancelled": true, "message": "Execution cancelled by user." }));
    }

    #[tokio::test]
    async fn test_dispatch_reports_argument_errors_to_model() {
        let session = session("n");

        let content = session.dispatch("run_command", r#"{"command": ""}"#).await.unwrap();
        assert!(content.contains("\"error\""));

        let content = session.dispatch("delete_everything", "{}").await.unwrap();
        assert!(content.contains("Unknown tool: delete_everything"));
    }
}
