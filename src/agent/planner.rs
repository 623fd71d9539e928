//! Planner - turns fetched context into the final schedule

use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::error::Error;
use crate::Result;
use super::llm::LlmClient;
use super::message::Message;
use super::prompts::PLANNER_PROMPT;

/// Final human-readable schedule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleArtifact(String);

impl ScheduleArtifact {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScheduleArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Single request/response stage, no tools and no loop.
pub struct Planner {
    client: Arc<dyn LlmClient>,
}

impl Planner {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub async fn plan(&self, fetched_context: &str) -> Result<ScheduleArtifact> {
        let messages = [Message::system(PLANNER_PROMPT), Message::user(fetched_context)];
        let response = self.client.chat(&messages, &[]).await?;

        match response.content.filter(|c| !c.trim().is_empty()) {
            Some(content) => {
                info!("Planner produced {} chars", content.len());
                Ok(ScheduleArtifact(content))
            }
            None => Err(Error::Llm("Planner returned an empty response".to_string())),
        }
    }
}
