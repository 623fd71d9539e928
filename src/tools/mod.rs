//! Tools module - mailbox and calendar capabilities exposed to the model
//!
//! Each tool routes through the Graph services. A tool either produces a JSON
//! value or, when the user still has to sign in, the sign-in prompt itself.

mod calendar;
mod mail;
mod runner;

pub use calendar::ListEventsTool;
pub use mail::{
    CreateMailFolderTool, FlagEmailTool, ForwardEmailTool, ListEmailsTool, MarkEmailTool,
    ReplyAllEmailTool, ReplyEmailTool, ReplyToRecipientTool,
};
pub use runner::{ToolDefinition, ToolRunner};

use async_trait::async_trait;
use serde_json::Value;

use crate::auth::AuthPrompt;
use crate::error::Error;
use crate::graph::Authorized;
use crate::Result;

/// What a tool hands back to the agent loop
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Value(Value),
    /// The call could not be made until the user signs in.
    AuthPending(AuthPrompt),
}

impl From<Authorized<Value>> for ToolOutput {
    fn from(result: Authorized<Value>) -> Self {
        match result {
            Authorized::Done(value) => ToolOutput::Value(value),
            Authorized::Pending(prompt) => ToolOutput::AuthPending(prompt),
        }
    }
}

/// Tool trait - interface for all agent tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name used in function calls
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters(&self) -> Value;

    /// Execute the tool with given parameters
    async fn execute(&self, params: Value) -> Result<ToolOutput>;

    /// Convert to tool definition for LLM
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Tool(format!("Missing '{}' parameter", key)))
}

fn optional_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str()).filter(|s| !s.is_empty())
}

/// Integer parameter clamped to `min..=max`. Models sometimes send numbers as strings.
fn int_or(params: &Value, key: &str, default: i64, min: i64, max: i64) -> i64 {
    params
        .get(key)
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .unwrap_or(default)
        .clamp(min, max)
}

/// A list of strings; a single string is accepted as a one-element list.
fn string_list(params: &Value, key: &str) -> Result<Vec<String>> {
    match params.get(key) {
        Some(Value::Array(items)) => Ok(items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect()),
        Some(Value::String(s)) if !s.is_empty() => Ok(vec![s.clone()]),
        _ => Err(Error::Tool(format!("Missing '{}' parameter", key))),
    }
}

/// Dummy tool for testing
#[cfg(test)]
pub struct DummyTool {
    pub name: String,
    pub output: ToolOutput,
}

#[cfg(test)]
#[async_trait]
impl Tool for DummyTool {
    fn name(&self) -> &str { &self.name }
    fn description(&self) -> &str { "Dummy tool for testing" }
    fn parameters(&self) -> Value { serde_json::json!({"type": "object"}) }

    async fn execute(&self, _params: Value) -> Result<ToolOutput> {
        Ok(self.output.clone())
    }
}
