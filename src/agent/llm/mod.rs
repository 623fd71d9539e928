//! LLM client abstraction layer.
//!
//! This module provides:
//! - [`LlmClient`] trait for swappable LLM providers
//! - [`ProviderRegistry`] for creating the executor and planner clients
//! - [`OpenAiClient`] for any OpenAI-compatible chat completions endpoint
//!
//! # Adding a New Provider
//!
//! 1. Add its default endpoint to `ProviderRegistry::base_url`
//! 2. If it does not speak the chat completions format, implement `LlmClient`
//! 3. Add to `ProviderRegistry::create()`

mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::Error;
use crate::tools::ToolDefinition;
use crate::Result;

pub mod openai;

pub use openai::OpenAiClient;

use super::message::{Message, ToolCallRequest};

const GROQ_API_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Response from an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Text content of the response.
    pub content: Option<String>,

    /// Tool calls requested by the LLM.
    pub tool_calls: Vec<ToolCallRequest>,

    /// Reason the response finished.
    pub finish_reason: String,

    /// Token usage statistics.
    pub usage: Usage,
}

impl LlmResponse {
    /// Create a simple text response.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: vec![],
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Create a response that only requests tool calls.
    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }

    /// Check if response has tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token usage information.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// LLM client trait - swappable provider abstraction.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send messages and get response.
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<LlmResponse>;

    /// Get the model this client talks to.
    fn default_model(&self) -> &str;
}

/// Provider registry - creates LLM clients from configuration.
///
/// # Example
///
/// ```ignore
/// let executor = ProviderRegistry::executor(&config.llm)?;
/// let response = executor.chat(&messages, &tools).await?;
/// ```
pub struct ProviderRegistry;

impl ProviderRegistry {
    /// Create an LLM client for one model.
    ///
    /// Supported providers:
    /// - `"groq"`: Groq's OpenAI-compatible API
    /// - `"openai"`: OpenAI chat completions
    pub fn create(config: &LlmConfig, model: &str, temperature: f32) -> Result<Arc<dyn LlmClient>> {
        if config.api_key.is_empty() {
            return Err(Error::Config(format!(
                "No API key configured for provider '{}'",
                config.provider
            )));
        }

        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Self::base_url(&config.provider)?.to_string(),
        };

        let client = OpenAiClient::new(&base_url, &config.api_key, model, temperature);
        Ok(Arc::new(client))
    }

    /// Client for the tool-calling loop.
    pub fn executor(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
        Self::create(config, &config.executor_model, config.executor_temperature)
    }

    /// Client for the schedule writer.
    pub fn planner(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
        Self::create(config, &config.planner_model, config.planner_temperature)
    }

    fn base_url(provider: &str) -> Result<&'static str> {
        match provider {
            "groq" => Ok(GROQ_API_URL),
            "openai" => Ok(OPENAI_API_URL),
            other => Err(Error::Config(format!("Unknown provider: {other}"))),
        }
    }

    /// List available provider names.
    pub fn available() -> &'static [&'static str] {
        &["groq", "openai"]
    }
}

/// Fake LLM client for testing.
///
/// Replays scripted responses and records every message list it was sent.
#[cfg(test)]
pub struct FakeLlmClient {
    responses: std::sync::Mutex<std::collections::VecDeque<Result<LlmResponse>>>,
    requests: std::sync::Mutex<Vec<Vec<Message>>>,
}

#[cfg(test)]
impl FakeLlmClient {
    /// Create with predefined text responses.
    pub fn new(responses: Vec<&str>) -> Self {
        Self::scripted(responses.into_iter().map(LlmResponse::text).collect())
    }

    /// Create with arbitrary responses, returned in order.
    pub fn scripted(responses: Vec<LlmResponse>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create a client whose only call fails.
    pub fn failing(message: &str) -> Self {
        Self {
            responses: std::sync::Mutex::new(vec![Err(Error::Llm(message.to_string()))].into()),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    /// Create with a single tool call followed by a text response.
    pub fn with_tool_call(name: &str, args: serde_json::Value, final_response: &str) -> Self {
        Self::scripted(vec![
            LlmResponse::tool_calls(vec![ToolCallRequest::new("tc_1", name, args)]),
            LlmResponse::text(final_response),
        ])
    }

    /// Message lists received so far, one per `chat` call.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn chat(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<LlmResponse> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let mut responses = self.responses.lock().unwrap();
        responses
            .pop_front()
            .unwrap_or_else(|| Err(Error::Llm("No more fake responses".to_string())))
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}
