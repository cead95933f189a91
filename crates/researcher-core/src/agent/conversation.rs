//! Append-only message history for one agent

use thiserror::Error;

use crate::ai::types::{Message, Role};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversationError {
    #[error("tool result '{tool_call_id}' does not answer a pending tool call")]
    OrphanToolResult { tool_call_id: String },

    #[error("{role} message carries tool calls")]
    ToolCallsOnNonAssistant { role: &'static str },
}

/// Message history seeded with the system prompt.
///
/// Messages are only ever appended. A `tool` message must answer a call made
/// by the latest assistant turn, with only other tool results in between.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: Message) -> Result<(), ConversationError> {
        if !message.tool_calls.is_empty() && message.role != Role::Assistant {
            return Err(ConversationError::ToolCallsOnNonAssistant {
                role: message.role.as_str(),
            });
        }

        if message.role == Role::Tool {
            let id = message.tool_call_id.as_deref().unwrap_or_default();
            if !self.is_pending(id) {
                return Err(ConversationError::OrphanToolResult {
                    tool_call_id: id.to_string(),
                });
            }
        }

        self.messages.push(message);
        Ok(())
    }

    /// Whether `id` was requested by the latest assistant turn and not yet answered
    fn is_pending(&self, id: &str) -> bool {
        let mut answered = false;
        for message in self.messages.iter().rev() {
            match message.role {
                Role::Tool => {
                    if message.tool_call_id.as_deref() == Some(id) {
                        answered = true;
                    }
                }
                Role::Assistant => {
                    return !answered && message.tool_calls.iter().any(|c| c.id == id);
                }
                Role::System | Role::User => return false,
            }
        }
        false
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

    pub fn system_prompt(&self) -> &Message {
        &self.messages[0]
    }

    /// Drop everything after the system message
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }
}
