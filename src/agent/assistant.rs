//! Assistant - one request from user input to schedule

use std::sync::Arc;

use tracing::info;

use crate::auth::{AuthCoordinator, AuthPrompt};
use crate::config::Config;
use crate::graph::{CalendarService, GraphClient, MailService};
use crate::tools::ToolRunner;
use crate::Result;
use super::llm::ProviderRegistry;
use super::loop_impl::{AgentLoop, Fetched};
use super::planner::{Planner, ScheduleArtifact};
use super::session::Session;

/// Outcome of one assistant request
#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Schedule(ScheduleArtifact),
    /// Nothing could be fetched until the user signs in.
    AuthPending(AuthPrompt),
}

pub struct Assistant {
    agent: AgentLoop,
    planner: Planner,
}

impl Assistant {
    pub fn new(agent: AgentLoop, planner: Planner) -> Self {
        Self { agent, planner }
    }

    /// Wire the Graph services, tools and both model clients from configuration.
    pub fn from_config(config: &Config, auth: Arc<AuthCoordinator>) -> Result<Self> {
        let graph = GraphClient::new(auth, &config.graph_base_url)?;
        let tools = ToolRunner::new_with_defaults(
            MailService::new(graph.clone()),
            CalendarService::new(graph),
            config.mail_lookback_days,
        );

        let agent = AgentLoop::new(
            ProviderRegistry::executor(&config.llm)?,
            Arc::new(tools),
            config.max_iterations,
        );
        let planner = Planner::new(ProviderRegistry::planner(&config.llm)?);

        Ok(Self::new(agent, planner))
    }

    pub async fn run(&self, session: &mut Session, input: &str) -> Result<Plan> {
        match self.agent.run(&mut session.conversation, input).await? {
            Fetched::AuthPending(prompt) => {
                info!("Session {} waiting on sign-in", session.id);
                Ok(Plan::AuthPending(prompt))
            }
            Fetched::Context(context) => {
                let schedule = self.planner.plan(&context).await?;
                Ok(Plan::Schedule(schedule))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::llm::{FakeLlmClient, LlmResponse};
    use crate::agent::message::ToolCallRequest;
    use crate::graph::test_support::graph_client;
    use serde_json::json;

    fn assistant(
        executor: Arc<FakeLlmClient>,
        planner: Arc<FakeLlmClient>,
        signed_in: bool,
    ) -> (Assistant, tempfile::TempDir) {
        let (graph, dir) = graph_client("http://127.0.0.1:1", signed_in);
        let tools = ToolRunner::new_with_defaults(
            MailService::new(graph.clone()),
            CalendarService::new(graph),
            5,
        );
        let agent = AgentLoop::new(executor, Arc::new(tools), 10);
        (Assistant::new(agent, Planner::new(planner)), dir)
    }

    #[tokio::test]
    async fn test_context_flows_into_planner() {
        let executor = Arc::new(FakeLlmClient::new(vec![r#"{"meetings": []}"#]));
        let planner = Arc::new(FakeLlmClient::new(vec!["09:00 Focus time"]));
        let (assistant, _dir) = assistant(executor, planner.clone(), true);

        let mut session = Session::new();
        let plan = assistant.run(&mut session, "plan my day").await.unwrap();

        match plan {
            Plan::Schedule(schedule) => assert_eq!(schedule.as_str(), "09:00 Focus time"),
            other => panic!("expected a schedule, got {:?}", other),
        }
        assert_eq!(planner.requests()[0][1].content, r#"{"meetings": []}"#);
    }

    #[tokio::test]
    async fn test_auth_pending_skips_planner() {
        let executor = Arc::new(FakeLlmClient::scripted(vec![LlmResponse::tool_calls(vec![
            ToolCallRequest::new("c1", "list_emails", json!({})),
        ])]));
        let planner = Arc::new(FakeLlmClient::new(vec![]));
        let (assistant, _dir) = assistant(executor, planner.clone(), false);

        let mut session = Session::new();
        let plan = assistant.run(&mut session, "plan my day").await.unwrap();

        assert!(matches!(plan, Plan::AuthPending(ref p) if p.user_code == "ABC-123"));
        assert!(planner.requests().is_empty());
    }
}
