//! Chat completions wire types.
//!
//! Only the response side is typed; requests are built with `json!`.

use serde::Deserialize;

/// Top-level chat completions response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<Choice>,
    pub usage: Option<CompletionUsage>,
}

/// A single response choice.
#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
    pub finish_reason: Option<String>,
}

/// The assistant message inside a choice.
#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: Option<String>,
    /// Absent or `null` on a final answer.
    #[serde(default)]
    pub tool_calls: Option<Vec<ApiToolCall>>,
}

/// Tool call requested by the model.
#[derive(Debug, Deserialize)]
pub struct ApiToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: ApiFunctionCall,
}

/// Function name plus arguments encoded as a JSON string.
#[derive(Debug, Deserialize)]
pub struct ApiFunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Token usage block.
#[derive(Debug, Deserialize)]
pub struct CompletionUsage {
    #[serde(default)]
    pub prompt_tokens: usize,
    #[serde(default)]
    pub completion_tokens: usize,
    #[serde(default)]
    pub total_tokens: usize,
}
