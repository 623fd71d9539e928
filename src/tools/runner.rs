//! Tool runner - manages and executes tools

use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::Result;
use crate::error::Error;
use crate::graph::{CalendarService, MailService};
use super::{
    CreateMailFolderTool, FlagEmailTool, ForwardEmailTool, ListEmailsTool, ListEventsTool,
    MarkEmailTool, ReplyAllEmailTool, ReplyEmailTool, ReplyToRecipientTool, Tool, ToolOutput,
};

/// Tool definition for LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool runner manages registered tools and executes them
pub struct ToolRunner {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRunner {
    /// Create an empty tool runner
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Create a tool runner with the mailbox and calendar tools
    pub fn new_with_defaults(mail: MailService, calendar: CalendarService, mail_lookback_days: i64) -> Self {
        let mut runner = Self::new();

        // Mail tools
        runner.register(ListEmailsTool::new(mail.clone(), mail_lookback_days));
        runner.register(ForwardEmailTool::new(mail.clone()));
        runner.register(ReplyEmailTool::new(mail.clone()));
        runner.register(ReplyAllEmailTool::new(mail.clone()));
        runner.register(ReplyToRecipientTool::new(mail.clone()));
        runner.register(FlagEmailTool::new(mail.clone()));
        runner.register(MarkEmailTool::read(mail.clone()));
        runner.register(MarkEmailTool::unread(mail.clone()));
        runner.register(CreateMailFolderTool::new(mail));

        // Calendar tools
        runner.register(ListEventsTool::upcoming(calendar.clone()));
        runner.register(ListEventsTool::calendar(calendar));

        runner
    }

    /// Register a tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.tools.insert(tool.name().to_string(), Box::new(tool));
    }

    /// Get tool definitions for LLM, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut definitions: Vec<ToolDefinition> = self.tools.values()
            .map(|t| t.to_definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        definitions
    }

    /// Execute a tool by exact name
    pub async fn execute(&self, name: &str, params: Value) -> Result<ToolOutput> {
        let tool = self.tools.get(name)
            .ok_or_else(|| Error::UnknownTool(name.to_string()))?;

        tool.execute(params).await
    }

    /// Check if a tool exists
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// List registered tool names
    pub fn tool_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for ToolRunner {
    fn default() -> Self {
        Self::new()
    }
}
