//! Agent module - the tool-calling loop and the schedule planner.
//!
//! This module contains:
//! - Message and conversation types
//! - LLM client trait and the OpenAI-compatible implementation
//! - Agent loop that gathers mailbox and calendar context
//! - Planner that turns that context into a schedule
//!
//! # Adding a New LLM Provider
//!
//! See [`llm::ProviderRegistry`] for instructions.

mod assistant;
mod loop_impl;
mod message;
mod planner;
mod prompts;
mod session;

// LLM providers in submodule
pub mod llm;

// Re-exports for convenience
pub use assistant::{Assistant, Plan};
pub use llm::{LlmClient, LlmResponse, OpenAiClient, ProviderRegistry, Usage};
pub use loop_impl::{AgentLoop, Fetched};
pub use message::{Message, Role, ToolCallRequest};
pub use planner::{Planner, ScheduleArtifact};
pub use prompts::{executor_prompt, PLANNER_PROMPT};
pub use session::{Conversation, Session};
