//! Conversation state for one user session.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::message::{Message, Role};

/// Append-only, ordered message log.
///
/// Messages can be added but never removed or reordered, so a tool result
/// always follows the assistant message that requested it.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Ids of tool calls that have no result yet. Empty between model turns.
    pub fn unanswered_calls(&self) -> Vec<&str> {
        let mut open: Vec<&str> = Vec::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    for call in message.tool_calls.iter().flatten() {
                        open.push(&call.id);
                    }
                }
                Role::Tool => {
                    if let Some(id) = message.tool_call_id.as_deref() {
                        open.retain(|open_id| *open_id != id);
                    }
                }
                _ => {}
            }
        }
        open
    }
}

/// A multi-turn session. Each session owns its own conversation.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub conversation: Conversation,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            conversation: Conversation::new(),
        }
    }

    /// Number of user turns so far
    pub fn turns(&self) -> usize {
        self.conversation
            .messages()
            .iter()
            .filter(|m| m.role == Role::User)
            .count()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
