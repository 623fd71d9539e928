//! Agent loop - bounded tool-calling between the model and the tool runner

use std::sync::Arc;

use chrono::Local;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::auth::AuthPrompt;
use crate::Result;
use crate::error::Error;
use crate::tools::{ToolOutput, ToolRunner};
use super::llm::LlmClient;
use super::message::{Message, ToolCallRequest};
use super::prompts;
use super::session::Conversation;

/// What the loop gathered for one request
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// The model's final answer, exactly as returned.
    Context(String),
    /// A tool needs the user to sign in first.
    AuthPending(AuthPrompt),
}

/// Why a turn's remaining tool calls were not executed
enum Halt {
    AuthPending(AuthPrompt),
    Fatal(Error),
}

/// The agent loop processes a request through the LLM and tool execution
pub struct AgentLoop {
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRunner>,
    system_prompt: String,
    max_iterations: usize,
}

impl AgentLoop {
    /// Create a new agent loop
    pub fn new(client: Arc<dyn LlmClient>, tools: Arc<ToolRunner>, max_iterations: usize) -> Self {
        Self {
            client,
            tools,
            system_prompt: prompts::executor_prompt(Local::now().date_naive()),
            max_iterations,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Run the loop for one user input, appending every exchange to `conversation`
    pub async fn run(&self, conversation: &mut Conversation, input: &str) -> Result<Fetched> {
        if conversation.is_empty() {
            conversation.push(Message::system(&self.system_prompt));
        }
        conversation.push(Message::user(input));

        info!("Starting agent loop ({} chars of input)", input.len());
        let tools = self.tools.definitions();

        for iteration in 0..self.max_iterations {
            debug!("Iteration {}/{}", iteration + 1, self.max_iterations);

            let response = self.client.chat(conversation.messages(), &tools).await?;

            if !response.has_tool_calls() {
                let content = response.content.unwrap_or_default();
                conversation.push(Message::assistant(content.clone()));
                info!("Agent completed with response: {} chars", content.len());
                return Ok(Fetched::Context(content));
            }

            conversation.push(Message::assistant_with_tools(
                response.content.clone().unwrap_or_default(),
                response.tool_calls.clone(),
            ));

            let mut halt = None;
            for tool_call in &response.tool_calls {
                let skip_reason = halt.as_ref().map(|h| match h {
                    Halt::AuthPending(_) => "authentication pending",
                    Halt::Fatal(_) => "request aborted",
                });
                let content = match skip_reason {
                    Some(reason) => skipped(reason),
                    None => match self.execute_tool(tool_call).await {
                        Ok(ToolOutput::Value(value)) => render(value),
                        Ok(ToolOutput::AuthPending(prompt)) => {
                            info!("Tool {} is waiting on sign-in", tool_call.name);
                            let content = prompt.to_json().to_string();
                            halt = Some(Halt::AuthPending(prompt));
                            content
                        }
                        Err(e) => {
                            warn!("Tool {} failed fatally: {}", tool_call.name, e);
                            let content = error_result(&e);
                            halt = Some(Halt::Fatal(e));
                            content
                        }
                    },
                };
                conversation.push(Message::tool_result(&tool_call.id, content));
            }

            match halt {
                Some(Halt::AuthPending(prompt)) => return Ok(Fetched::AuthPending(prompt)),
                Some(Halt::Fatal(e)) => return Err(e),
                None => {}
            }
        }

        warn!("Agent loop exceeded {} iterations", self.max_iterations);
        Err(Error::LoopExceeded(self.max_iterations))
    }

    /// Execute one call. Recoverable failures become a structured error result.
    async fn execute_tool(&self, tool_call: &ToolCallRequest) -> Result<ToolOutput> {
        debug!("Executing tool: {} with args: {}", tool_call.name, tool_call.arguments);

        match self.tools.execute(&tool_call.name, tool_call.arguments.clone()).await {
            Ok(output) => Ok(output),
            Err(e) if e.is_recoverable_in_loop() => {
                debug!("Tool {} failed: {}", tool_call.name, e);
                Ok(ToolOutput::Value(json!({"status": "error", "error": e.to_string()})))
            }
            Err(e) => Err(e),
        }
    }
}

fn render(value: Value) -> String {
    match value {
        Value::String(s) => s,
        other => other.to_string(),
    }
}

fn skipped(reason: &str) -> String {
    json!({"status": "skipped", "reason": reason}).to_string()
}

fn error_result(e: &Error) -> String {
    json!({"status": "error", "error": e.to_string()}).to_string()
}
